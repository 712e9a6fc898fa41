use std::sync::Arc;
use serde::Serialize;
use tracing::{error, warn};
use carpool_core::repository::NotificationRepository;
use carpool_shared::Notification;

use crate::event::Event;
use crate::hub::Hub;

/// Persist-then-push helper shared by matching, confirmation and trip grabs.
/// A push only happens for a notification that was stored.
#[derive(Clone)]
pub struct Notifier {
    repo: Arc<dyn NotificationRepository>,
    hub: Arc<Hub>,
}

impl Notifier {
    pub fn new(repo: Arc<dyn NotificationRepository>, hub: Arc<Hub>) -> Self {
        Self { repo, hub }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Store `notification`, then push a `kind` event built around it to its
    /// recipient. Returns whether the notification was stored.
    pub async fn emit<P, F>(&self, notification: Notification, kind: &str, payload: F) -> bool
    where
        P: Serialize,
        F: FnOnce(Notification) -> P,
    {
        // 1. Persist
        if let Err(e) = self.repo.create_notification(&notification).await {
            error!(
                user_id = %notification.user_id,
                kind = %kind,
                "Failed to store notification, skipping push: {}",
                e
            );
            return false;
        }

        // 2. Push
        let user_id = notification.user_id;
        match Event::new(kind, &payload(notification)) {
            Ok(event) => {
                self.hub.send_to_user(user_id, &event);
            }
            Err(e) => warn!(user_id = %user_id, kind = %kind, "Failed to encode push payload: {}", e),
        }
        true
    }
}
