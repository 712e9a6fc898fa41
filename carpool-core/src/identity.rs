use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use carpool_shared::UserId;
use crate::BoxError;

/// What the core needs to know about a user owned by the user-management service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub open_id: String,
    pub nickname: String,
    pub phone: String,
}

/// Maps public-facing ids to internal user ids and exposes contact details
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn resolve_open_id(&self, open_id: &str) -> Result<Option<UserId>, BoxError>;

    async fn profile(&self, user_id: UserId) -> Result<Option<UserProfile>, BoxError>;
}
