use std::time::Duration;
use async_trait::async_trait;
use uuid::Uuid;
use carpool_shared::{Trip, TripPage};
use crate::BoxError;

/// Advisory trip cache. Never authoritative: callers treat every error as a miss.
#[async_trait]
pub trait TripCache: Send + Sync {
    async fn get(&self, trip_id: Uuid) -> Result<Option<Trip>, BoxError>;

    async fn put(&self, trip: &Trip, ttl: Duration) -> Result<(), BoxError>;

    async fn invalidate(&self, trip_id: Uuid) -> Result<(), BoxError>;

    /// `key` comes from [`crate::TripListQuery::cache_key`]
    async fn get_list(&self, key: &str) -> Result<Option<TripPage>, BoxError>;

    async fn put_list(&self, key: &str, page: &TripPage, ttl: Duration) -> Result<(), BoxError>;

    /// Drop every cached list result
    async fn invalidate_all_lists(&self) -> Result<(), BoxError>;
}

pub const TRIP_KEY_PREFIX: &str = "trip:";
pub const TRIP_LIST_KEY_PREFIX: &str = "trip_list:";

pub fn trip_key(trip_id: Uuid) -> String {
    format!("{}{}", TRIP_KEY_PREFIX, trip_id)
}
