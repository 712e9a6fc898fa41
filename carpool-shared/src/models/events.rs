use uuid::Uuid;

use super::matching::ContactInfo;
use super::notification::Notification;

pub const MATCH_FOUND: &str = "match_found";
pub const MATCH_REJECTED: &str = "match_rejected";
pub const MATCH_SUCCESS: &str = "match_success";
pub const TRIP_GRABBED: &str = "trip_grabbed";

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct MatchFoundEvent {
    pub match_id: Uuid,
    pub score: f64,
    pub notification: Notification,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct MatchRejectedEvent {
    pub match_id: Uuid,
    pub notification: Notification,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct MatchSuccessEvent {
    pub match_id: Uuid,
    pub contact: ContactInfo,
    pub notification: Notification,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct TripGrabbedEvent {
    pub trip_id: Uuid,
    /// Public id of the grabbing user
    pub grabber_id: Option<String>,
    pub grabber_name: String,
    pub notification: Notification,
}
