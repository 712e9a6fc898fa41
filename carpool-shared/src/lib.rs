pub mod models;
pub mod pii;

pub use models::matching::{ContactInfo, Decision, Match, MatchStatus, Side};
pub use models::notification::{Notification, NotificationPage};
pub use models::trip::{
    GeoPoint, ReviewStatus, Trip, TripDraft, TripFieldPatch, TripGrab, TripPage, TripPatch,
    TripRole, TripStatus, TripUpdate, TripUpdateKind,
};

/// Internal user identity, issued by the user-management service.
pub type UserId = uuid::Uuid;
