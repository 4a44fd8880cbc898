use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::User;
use super::RepositoryError;

#[derive(Clone, Default)]
pub struct UserRepository {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl UserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_user(&self, user: &User) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(RepositoryError::DuplicateEmail(user.email.clone()));
        }
        log::info!("Creating user {}: {}", user.id, user.email);
        users.insert(user.id, user.clone());
        Ok(())
    }

    pub async fn get_user_by_email(&self, email: &str) -> Option<User> {
        self.users
            .read()
            .await
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
    }

    pub async fn get_user_by_id(&self, id: Uuid) -> Option<User> {
        self.users.read().await.get(&id).cloned()
    }
}
