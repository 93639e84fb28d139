use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::repo_types::{NewUserRecord, PasswordField, StoreError, User, UserChanges};

/// Persistence backend for user records.
///
/// Implementations only ever see hashed passwords; hashing lives in
/// [`crate::auth::store::UserStore`]. Email uniqueness must be enforced here,
/// atomically with the insert.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_email(
        &self,
        email: &str,
        field: PasswordField,
    ) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: Uuid, field: PasswordField) -> Result<Option<User>, StoreError>;

    /// Fails with `StoreError::DuplicateEmail` if the email is taken.
    async fn insert(&self, record: NewUserRecord) -> Result<User, StoreError>;

    /// Applies the `Some` fields and bumps `updated_at`.
    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<User, StoreError>;
}

const UNIQUE_VIOLATION: &str = "23505";

fn map_insert_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StoreError::DuplicateEmail
        }
        _ => StoreError::Database(e),
    }
}

#[derive(Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_email(
        &self,
        email: &str,
        field: PasswordField,
    ) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email,
                   CASE WHEN $2 THEN password_hash END AS password_hash,
                   avatar, role, is_active, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .bind(field.included())
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid, field: PasswordField) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email,
                   CASE WHEN $2 THEN password_hash END AS password_hash,
                   avatar, role, is_active, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(field.included())
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn insert(&self, record: NewUserRecord) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, name, email, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, email, NULL::text AS password_hash,
                      avatar, role, is_active, created_at, updated_at
            "#,
        )
        .bind(record.id)
        .bind(&record.name)
        .bind(&record.email)
        .bind(&record.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(map_insert_error)
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
               SET name = COALESCE($2, name),
                   avatar = COALESCE($3, avatar),
                   password_hash = COALESCE($4, password_hash),
                   updated_at = now()
             WHERE id = $1
            RETURNING id, name, email, NULL::text AS password_hash,
                      avatar, role, is_active, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(changes.name)
        .bind(changes.avatar)
        .bind(changes.password_hash)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound)
    }
}
