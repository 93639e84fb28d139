use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::{
    repo::UserRepository,
    repo_types::{NewUserRecord, PasswordField, Role, StoreError, User, UserChanges},
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    by_email: HashMap<String, Uuid>,
}

/// Process-local user repository, used when no database is configured and in tests.
#[derive(Default)]
pub struct InMemoryUserRepository {
    tables: RwLock<Tables>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.tables.read().await.users.len()
    }

    #[cfg(test)]
    pub async fn set_active(&self, id: Uuid, active: bool) {
        if let Some(user) = self.tables.write().await.users.get_mut(&id) {
            user.is_active = active;
        }
    }
}

fn project(user: &User, field: PasswordField) -> User {
    let mut user = user.clone();
    if !field.included() {
        user.password_hash = None;
    }
    user
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_email(
        &self,
        email: &str,
        field: PasswordField,
    ) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_email
            .get(email)
            .and_then(|id| tables.users.get(id))
            .map(|u| project(u, field)))
    }

    async fn find_by_id(&self, id: Uuid, field: PasswordField) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(&id).map(|u| project(u, field)))
    }

    async fn insert(&self, record: NewUserRecord) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.by_email.contains_key(&record.email) {
            return Err(StoreError::DuplicateEmail);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: record.id,
            name: record.name,
            email: record.email,
            password_hash: Some(record.password_hash),
            avatar: String::new(),
            role: Role::User,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        tables.by_email.insert(user.email.clone(), user.id);
        tables.users.insert(user.id, user.clone());
        Ok(project(&user, PasswordField::Omit))
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        let user = tables.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(avatar) = changes.avatar {
            user.avatar = avatar;
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = Some(hash);
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(project(user, PasswordField::Omit))
    }
}
