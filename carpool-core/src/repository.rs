use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use carpool_shared::{
    Decision, Match, Notification, NotificationPage, Side, Trip, TripFieldPatch,
    TripGrab, TripStatus, TripUpdate, UserId,
};
use crate::search::TripListQuery;

/// Repository trait for trip data access
#[async_trait]
pub trait TripRepository: Send + Sync {
    async fn create_trip(
        &self,
        trip: &Trip,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn get_trip(
        &self,
        id: Uuid,
    ) -> Result<Option<Trip>, Box<dyn std::error::Error + Send + Sync>>;

    /// Pending trips matching the filter, one page, plus the total match count.
    /// The query must already be normalized.
    async fn list_trips(
        &self,
        query: &TripListQuery,
    ) -> Result<(Vec<Trip>, i64), Box<dyn std::error::Error + Send + Sync>>;

    async fn list_user_trips(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Trip>, Box<dyn std::error::Error + Send + Sync>>;

    /// Move a trip to `to`, but only while its current status is one of
    /// `from`. Returns false if the trip is missing or in another status.
    async fn update_trip_status(
        &self,
        id: Uuid,
        from: &[TripStatus],
        to: TripStatus,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;

    /// Pending trips of the opposite role on the same city pair whose
    /// departure lies within `window` of `trip`, owned by other users,
    /// nearest departure first.
    async fn list_opposite_candidates(
        &self,
        trip: &Trip,
        window: chrono::Duration,
        limit: i64,
    ) -> Result<Vec<Trip>, Box<dyn std::error::Error + Send + Sync>>;

    async fn count_active_trips(
        &self,
        user_id: UserId,
    ) -> Result<i64, Box<dyn std::error::Error + Send + Sync>>;

    async fn count_trips_created_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<i64, Box<dyn std::error::Error + Send + Sync>>;

    async fn increment_view_count(
        &self,
        id: Uuid,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Deletes only if `user_id` owns the trip. Returns whether a row went away.
    async fn delete_trip(
        &self,
        id: Uuid,
        user_id: UserId,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;

    async fn patch_trip(
        &self,
        id: Uuid,
        patch: &TripFieldPatch,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Returns false if this user already grabbed this trip
    async fn create_grab(
        &self,
        grab: &TripGrab,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;

    async fn list_grabs(
        &self,
        trip_id: Uuid,
    ) -> Result<Vec<TripGrab>, Box<dyn std::error::Error + Send + Sync>>;

    async fn create_update_request(
        &self,
        update: &TripUpdate,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Repository trait for match data access
#[async_trait]
pub trait MatchRepository: Send + Sync {
    /// Returns false if a match for this trip pair already exists
    async fn create_match(
        &self,
        m: &Match,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;

    async fn get_match(
        &self,
        id: Uuid,
    ) -> Result<Option<Match>, Box<dyn std::error::Error + Send + Sync>>;

    /// Lookup in either trip order
    async fn get_match_by_trips(
        &self,
        trip_a: Uuid,
        trip_b: Uuid,
    ) -> Result<Option<Match>, Box<dyn std::error::Error + Send + Sync>>;

    async fn list_user_matches(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Match>, Box<dyn std::error::Error + Send + Sync>>;

    /// Record one side's answer and resolve the overall status in the same
    /// write. Applies only while the match is pending and that side has not
    /// answered yet; returns `None` when the condition did not hold.
    ///
    /// Once both sides have accepted, both trips must still be pending or
    /// matched. They then become `MATCHED` together with the match turning
    /// `SUCCESS`. A side whose trip is no longer live is recorded as
    /// rejected instead, and the match fails.
    ///
    /// The returned match carries the resolved status, so the single caller
    /// that sees a terminal status is the one that closed the match.
    async fn record_decision(
        &self,
        id: Uuid,
        side: Side,
        decision: Decision,
    ) -> Result<Option<Match>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Repository trait for notification data access
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create_notification(
        &self,
        notification: &Notification,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn list_notifications(
        &self,
        user_id: UserId,
        page: i64,
        page_size: i64,
    ) -> Result<NotificationPage, Box<dyn std::error::Error + Send + Sync>>;

    /// Returns false if the notification does not exist or belongs to someone else
    async fn mark_read(
        &self,
        id: Uuid,
        user_id: UserId,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;

    async fn mark_all_read(
        &self,
        user_id: UserId,
    ) -> Result<u64, Box<dyn std::error::Error + Send + Sync>>;
}
