use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::auth::{
    password::Hasher,
    repo::UserRepository,
    repo_types::{
        NewUser, NewUserRecord, PasswordField, StoreError, User, UserChanges, UserUpdate,
    },
    validation::{check_email, check_name, check_password, normalize_email},
};

/// Credential store used by the handlers.
///
/// Every write that carries a plaintext password goes through the hasher here
/// before it reaches the repository; repositories never see plaintext.
#[derive(Clone)]
pub struct UserStore {
    repo: Arc<dyn UserRepository>,
    hasher: Hasher,
}

impl UserStore {
    pub fn new(repo: Arc<dyn UserRepository>, hasher: Hasher) -> Self {
        Self { repo, hasher }
    }

    pub fn hasher(&self) -> &Hasher {
        &self.hasher
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.repo
            .find_by_email(&normalize_email(email), PasswordField::Omit)
            .await
    }

    pub async fn find_by_email_with_password(
        &self,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        self.repo
            .find_by_email(&normalize_email(email), PasswordField::Include)
            .await
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.repo.find_by_id(id, PasswordField::Omit).await
    }

    pub async fn find_by_id_with_password(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.repo.find_by_id(id, PasswordField::Include).await
    }

    pub async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let name = check_name(&new.name)?;
        let email = check_email(&new.email)?;
        check_password(&new.password, "Password")?;

        let password_hash = self.hasher.hash_async(new.password).await?;
        let user = self
            .repo
            .insert(NewUserRecord {
                id: Uuid::new_v4(),
                name,
                email,
                password_hash,
            })
            .await?;
        debug!(user_id = %user.id, "user record created");
        Ok(user)
    }

    /// Partial update of name, avatar and password. Email and role are immutable here.
    pub async fn update_by_id(&self, id: Uuid, update: UserUpdate) -> Result<User, StoreError> {
        let name = update.name.as_deref().map(check_name).transpose()?;
        let password_hash = match update.password {
            Some(password) => {
                check_password(&password, "Password")?;
                Some(self.hasher.hash_async(password).await?)
            }
            None => None,
        };
        let changes = UserChanges {
            name,
            avatar: update.avatar,
            password_hash,
        };
        if changes.is_empty() {
            return self.find_by_id(id).await?.ok_or(StoreError::NotFound);
        }
        let rehashed = changes.password_hash.is_some();
        let user = self.repo.update(id, changes).await?;
        debug!(user_id = %user.id, rehashed, "user record updated");
        Ok(user)
    }
}

#[cfg(test)]
pub(crate) fn test_store() -> (UserStore, Arc<crate::auth::memory::InMemoryUserRepository>) {
    let repo = Arc::new(crate::auth::memory::InMemoryUserRepository::new());
    let store = UserStore::new(
        repo.clone() as Arc<dyn UserRepository>,
        crate::auth::password::test_hasher(),
    );
    (store, repo)
}
