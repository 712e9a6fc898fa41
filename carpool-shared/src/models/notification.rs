use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::UserId;

/// An append-only message addressed to one user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: UserId,
    pub match_id: Option<Uuid>,
    pub trip_id: Option<Uuid>,
    pub title: String,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    fn new(user_id: UserId, title: String, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            match_id: None,
            trip_id: None,
            title,
            content,
            is_read: false,
            created_at: Utc::now(),
        }
    }

    pub fn about_match(user_id: UserId, match_id: Uuid, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            match_id: Some(match_id),
            ..Self::new(user_id, title.into(), content.into())
        }
    }

    pub fn about_trip(user_id: UserId, trip_id: Uuid, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            trip_id: Some(trip_id),
            ..Self::new(user_id, title.into(), content.into())
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationPage {
    pub list: Vec<Notification>,
    pub total: i64,
    pub unread: i64,
}
