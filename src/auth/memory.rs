use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::repo::{UserRepo, DUPLICATE_USERNAME};
use crate::auth::repo_types::{NewUser, User};
use crate::error::{AppError, AppResult};

/// In-process user store backing `AppState::fake()` and the router tests.
#[derive(Default)]
pub struct MemoryUserRepo {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip `is_active`; returns false when no such user exists.
    pub async fn set_active(&self, username: &str, active: bool) -> bool {
        let mut users = self.users.write().await;
        match users.values_mut().find(|u| u.username == username) {
            Some(user) => {
                user.is_active = active;
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, id: Uuid) -> Option<User> {
        self.users.write().await.remove(&id)
    }
}

#[async_trait]
impl UserRepo for MemoryUserRepo {
    async fn create(&self, new_user: NewUser) -> AppResult<User> {
        // Check and insert under one write lock so racing signups cannot both win.
        let mut users = self.users.write().await;
        if users.values().any(|u| u.username == new_user.username) {
            return Err(AppError::field("username", DUPLICATE_USERNAME));
        }
        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            is_active: true,
            date_joined: OffsetDateTime::now_utc(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.users.read().await.len() as i64)
    }
}
