use std::collections::HashMap;
use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;
use carpool_core::identity::{UserDirectory, UserProfile};
use carpool_shared::UserId;

#[derive(Default)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<UserId, UserProfile>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user and return its internal id
    pub fn add(&self, open_id: &str, nickname: &str, phone: &str) -> UserId {
        let id = Uuid::new_v4();
        self.users.write().insert(
            id,
            UserProfile {
                id,
                open_id: open_id.to_string(),
                nickname: nickname.to_string(),
                phone: phone.to_string(),
            },
        );
        id
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn resolve_open_id(&self, open_id: &str) -> Result<Option<UserId>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self
            .users
            .read()
            .values()
            .find(|u| u.open_id == open_id)
            .map(|u| u.id))
    }

    async fn profile(&self, user_id: UserId) -> Result<Option<UserProfile>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.users.read().get(&user_id).cloned())
    }
}
