use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::warn;

use crate::{
    auth::{
        jwt::JwtKeys,
        memory::InMemoryUserRepository,
        password::Hasher,
        repo::{PgUserRepository, UserRepository},
        store::UserStore,
    },
    config::AppConfig,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: UserStore,
    pub keys: JwtKeys,
    pub db: Option<PgPool>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let (repo, db) = match &config.database_url {
            Some(url) => {
                let db = PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connect to database")?;
                (
                    Arc::new(PgUserRepository::new(db.clone())) as Arc<dyn UserRepository>,
                    Some(db),
                )
            }
            None => {
                warn!("DATABASE_URL not set; users are kept in memory and lost on restart");
                (
                    Arc::new(InMemoryUserRepository::new()) as Arc<dyn UserRepository>,
                    None,
                )
            }
        };

        Self::from_parts(config, repo, db)
    }

    pub fn from_parts(
        config: AppConfig,
        repo: Arc<dyn UserRepository>,
        db: Option<PgPool>,
    ) -> anyhow::Result<Self> {
        let keys = JwtKeys::new(&config.jwt)?;
        let hasher = Hasher::new(&config.hashing)?;
        Ok(Self {
            config: Arc::new(config),
            users: UserStore::new(repo, hasher),
            keys,
            db,
        })
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        Self::fake_with_repo(Arc::new(InMemoryUserRepository::new()))
    }

    #[cfg(test)]
    pub fn fake_with_repo(repo: Arc<InMemoryUserRepository>) -> Self {
        let config = AppConfig {
            database_url: None,
            jwt: crate::auth::jwt::test_jwt_config(),
            hashing: crate::config::HashingConfig {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
            frontend_url: None,
            host: "127.0.0.1".into(),
            port: 0,
        };
        Self::from_parts(config, repo, None).expect("test config is valid")
    }
}
