use async_trait::async_trait;
use uuid::Uuid;
use sqlx::PgPool;
use carpool_core::identity::{UserDirectory, UserProfile};
use carpool_shared::UserId;

/// Reads the `users` table maintained by the user-management service
pub struct StoreUserDirectory {
    pool: PgPool,
}

impl StoreUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    open_id: String,
    nickname: String,
    phone: String,
}

#[async_trait]
impl UserDirectory for StoreUserDirectory {
    async fn resolve_open_id(
        &self,
        open_id: &str,
    ) -> Result<Option<UserId>, Box<dyn std::error::Error + Send + Sync>> {
        let id: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE open_id = $1")
            .bind(open_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(id)
    }

    async fn profile(
        &self,
        user_id: UserId,
    ) -> Result<Option<UserProfile>, Box<dyn std::error::Error + Send + Sync>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT id, open_id, nickname, phone FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| UserProfile {
            id: row.id,
            open_id: row.open_id,
            nickname: row.nickname,
            phone: row.phone,
        }))
    }
}
