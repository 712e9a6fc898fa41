use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use super::wire_enum;
use crate::UserId;

/// Which side of a ride a posting offers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripRole {
    Driver,
    Passenger,
}

wire_enum!(TripRole {
    Driver => "DRIVER",
    Passenger => "PASSENGER",
});

impl TripRole {
    pub fn opposite(&self) -> Self {
        match self {
            TripRole::Driver => TripRole::Passenger,
            TripRole::Passenger => TripRole::Driver,
        }
    }
}

/// Trip status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Pending,
    Matched,
    Completed,
    Cancelled,
    Banned,
}

wire_enum!(TripStatus {
    Pending => "PENDING",
    Matched => "MATCHED",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
    Banned => "BANNED",
});

impl TripStatus {
    /// Counts against the per-user active trip limit
    pub fn is_active(&self) -> bool {
        matches!(self, TripStatus::Pending | TripStatus::Matched)
    }

    /// Owner may still patch fields or mark the trip completed
    pub fn is_editable(&self) -> bool {
        self.is_active()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// A posted offer or request to share a ride
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trip {
    pub id: Uuid,
    pub user_id: UserId,
    pub role: TripRole,
    pub departure_city: String,
    pub departure_province: String,
    pub departure_address: String,
    pub departure_lat: f64,
    pub departure_lng: f64,
    pub destination_city: String,
    pub destination_province: String,
    pub destination_address: String,
    pub destination_lat: f64,
    pub destination_lng: f64,
    pub departure_time: DateTime<Utc>,
    pub seats: i32,
    pub price: f64,
    pub remark: String,
    /// JSON array of image URLs, opaque to the core
    pub images: String,
    pub status: TripStatus,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    /// Build a pending trip from a validated draft
    pub fn new(user_id: UserId, draft: TripDraft, departure_time: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            role: draft.role,
            departure_city: draft.departure_city,
            departure_province: draft.departure_province,
            departure_address: draft.departure_address,
            departure_lat: draft.departure_lat,
            departure_lng: draft.departure_lng,
            destination_city: draft.destination_city,
            destination_province: draft.destination_province,
            destination_address: draft.destination_address,
            destination_lat: draft.destination_lat,
            destination_lng: draft.destination_lng,
            departure_time,
            seats: draft.seats,
            price: draft.price,
            remark: draft.remark,
            images: draft.images,
            status: TripStatus::Pending,
            view_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn departure_point(&self) -> GeoPoint {
        GeoPoint { lat: self.departure_lat, lng: self.departure_lng }
    }

    pub fn destination_point(&self) -> GeoPoint {
        GeoPoint { lat: self.destination_lat, lng: self.destination_lng }
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }
}

/// Client input for a new trip; departure time is still the raw
/// `YYYY-MM-DD HH:MM` string until the trip service parses it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TripDraft {
    pub role: TripRole,
    pub departure_city: String,
    #[serde(default)]
    pub departure_province: String,
    pub departure_address: String,
    #[serde(default)]
    pub departure_lat: f64,
    #[serde(default)]
    pub departure_lng: f64,
    pub destination_city: String,
    #[serde(default)]
    pub destination_province: String,
    pub destination_address: String,
    #[serde(default)]
    pub destination_lat: f64,
    #[serde(default)]
    pub destination_lng: f64,
    pub departure_time: String,
    pub seats: i32,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub remark: String,
    #[serde(default)]
    pub images: String,
}

/// Owner edit request. Images, remark, seats and price apply directly;
/// route and time changes go to review.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TripPatch {
    pub images: Option<String>,
    pub remark: Option<String>,
    pub seats: Option<i32>,
    pub price: Option<f64>,
    pub departure_city: Option<String>,
    pub departure_address: Option<String>,
    pub destination_city: Option<String>,
    pub destination_address: Option<String>,
    pub departure_time: Option<String>,
}

/// The directly-applied subset of a [`TripPatch`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripFieldPatch {
    pub images: Option<String>,
    pub remark: Option<String>,
    pub seats: Option<i32>,
    pub price: Option<f64>,
}

/// A page of trips, as returned by list queries and held in the list cache
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TripPage {
    pub list: Vec<Trip>,
    pub total: i64,
}

/// A user who asked to join (or pick up) someone else's trip
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TripGrab {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub user_id: UserId,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl TripGrab {
    pub fn new(trip_id: Uuid, user_id: UserId, message: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            trip_id,
            user_id,
            message,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripUpdateKind {
    Location,
    Time,
}

wire_enum!(TripUpdateKind {
    Location => "LOCATION",
    Time => "TIME",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

wire_enum!(ReviewStatus {
    Pending => "PENDING",
    Approved => "APPROVED",
    Rejected => "REJECTED",
});

/// A route or time change waiting for moderator review
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TripUpdate {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub user_id: UserId,
    pub kind: TripUpdateKind,
    pub old_value: serde_json::Value,
    pub new_value: serde_json::Value,
    pub status: ReviewStatus,
    pub created_at: DateTime<Utc>,
}

impl TripUpdate {
    pub fn new(
        trip_id: Uuid,
        user_id: UserId,
        kind: TripUpdateKind,
        old_value: serde_json::Value,
        new_value: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            trip_id,
            user_id,
            kind,
            old_value,
            new_value,
            status: ReviewStatus::Pending,
            created_at: Utc::now(),
        }
    }
}
