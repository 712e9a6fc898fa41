use std::time::Duration;
use async_trait::async_trait;
use uuid::Uuid;
use carpool_core::cache::{trip_key, TripCache, TRIP_LIST_KEY_PREFIX};
use carpool_shared::{Trip, TripPage};
use crate::RedisClient;

/// Redis-backed trip cache. Trips and list pages are stored as JSON strings.
#[derive(Clone)]
pub struct RedisTripCache {
    redis: RedisClient,
}

impl RedisTripCache {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl TripCache for RedisTripCache {
    async fn get(&self, trip_id: Uuid) -> Result<Option<Trip>, Box<dyn std::error::Error + Send + Sync>> {
        self.redis.get_json(&trip_key(trip_id)).await
    }

    async fn put(&self, trip: &Trip, ttl: Duration) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.redis.set_json(&trip_key(trip.id), trip, ttl.as_secs()).await
    }

    async fn invalidate(&self, trip_id: Uuid) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.redis.del(&trip_key(trip_id)).await?;
        Ok(())
    }

    async fn get_list(&self, key: &str) -> Result<Option<TripPage>, Box<dyn std::error::Error + Send + Sync>> {
        self.redis.get_json(key).await
    }

    async fn put_list(
        &self,
        key: &str,
        page: &TripPage,
        ttl: Duration,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.redis.set_json(key, page, ttl.as_secs()).await
    }

    async fn invalidate_all_lists(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.redis.del_matching(&format!("{}*", TRIP_LIST_KEY_PREFIX)).await?;
        Ok(())
    }
}
