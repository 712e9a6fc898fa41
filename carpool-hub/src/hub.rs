use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use carpool_shared::UserId;

use crate::event::Event;
use crate::session::{Delivery, Session};

#[derive(Default)]
struct Registry {
    by_user: HashMap<UserId, Arc<Session>>,
    by_open_id: HashMap<String, Arc<Session>>,
}

impl Registry {
    fn insert(&mut self, session: &Arc<Session>) {
        self.by_user.insert(session.user_id(), session.clone());
        if let Some(open_id) = session.open_id() {
            self.by_open_id.insert(open_id.to_string(), session.clone());
        }
    }

    /// Drop index entries that still point at `session`
    fn remove(&mut self, session: &Arc<Session>) -> bool {
        let removed = match self.by_user.get(&session.user_id()) {
            Some(current) if Arc::ptr_eq(current, session) => {
                self.by_user.remove(&session.user_id());
                true
            }
            _ => false,
        };
        if let Some(open_id) = session.open_id() {
            if self
                .by_open_id
                .get(open_id)
                .is_some_and(|current| Arc::ptr_eq(current, session))
            {
                self.by_open_id.remove(open_id);
            }
        }
        removed
    }
}

/// Directory of live sessions, at most one per user.
///
/// The registry lock only guards bookkeeping. Delivery resolves the target
/// session under the lock, releases it, then enqueues without blocking.
pub struct Hub {
    registry: Mutex<Registry>,
    mailbox_capacity: usize,
}

impl Hub {
    pub fn new(mailbox_capacity: usize) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            mailbox_capacity,
        }
    }

    /// Open and register a session for an authenticated user. The receiver
    /// is the session's outbound mailbox for the transport's writer loop.
    pub fn connect(&self, user_id: UserId, open_id: Option<String>) -> (Arc<Session>, mpsc::Receiver<String>) {
        let (session, rx) = Session::open(user_id, open_id, self.mailbox_capacity);
        self.register(session.clone());
        (session, rx)
    }

    /// Install `session`, superseding any earlier session of the same user
    pub fn register(&self, session: Arc<Session>) {
        let superseded = {
            let mut registry = self.registry.lock();
            let previous = registry.by_user.get(&session.user_id()).cloned();
            if let Some(previous) = &previous {
                registry.remove(previous);
            }
            registry.insert(&session);
            previous
        };

        info!(user_id = %session.user_id(), session_id = session.id(), "Session registered");

        if let Some(previous) = superseded.filter(|p| !Arc::ptr_eq(p, &session)) {
            if previous.close() {
                info!(user_id = %previous.user_id(), session_id = previous.id(), "Superseded session closed");
            }
        }
    }

    /// Remove `session` if it is still the one on record, and close it.
    /// Returns whether the registry entry was removed.
    pub fn unregister(&self, session: &Arc<Session>) -> bool {
        let removed = self.registry.lock().remove(session);
        session.close();
        if removed {
            info!(user_id = %session.user_id(), session_id = session.id(), "Session unregistered");
        }
        removed
    }

    /// Best-effort push. Returns whether the frame was queued.
    pub fn send_to_user(&self, user_id: UserId, event: &Event) -> bool {
        let session = self.registry.lock().by_user.get(&user_id).cloned();
        match session {
            Some(session) => self.deliver(&session, event),
            None => {
                debug!(user_id = %user_id, kind = %event.kind, "User not connected, dropping event");
                false
            }
        }
    }

    /// Best-effort push addressed by public id
    pub fn send_to_open_id(&self, open_id: &str, event: &Event) -> bool {
        let session = self.registry.lock().by_open_id.get(open_id).cloned();
        match session {
            Some(session) => self.deliver(&session, event),
            None => {
                debug!(open_id = %open_id, kind = %event.kind, "User not connected, dropping event");
                false
            }
        }
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.registry.lock().by_user.contains_key(&user_id)
    }

    pub fn session_count(&self) -> usize {
        self.registry.lock().by_user.len()
    }

    fn deliver(&self, session: &Arc<Session>, event: &Event) -> bool {
        let frame = match serde_json::to_string(event) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(kind = %event.kind, "Failed to encode event: {}", e);
                return false;
            }
        };

        match session.offer(frame) {
            Delivery::Queued => {
                debug!(user_id = %session.user_id(), kind = %event.kind, "Event queued");
                true
            }
            Delivery::Full => {
                warn!(user_id = %session.user_id(), session_id = session.id(), "Mailbox full, disconnecting session");
                self.unregister(session);
                false
            }
            Delivery::Closed => {
                self.unregister(session);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn event(kind: &str) -> Event {
        Event::new(kind, &serde_json::json!({})).unwrap()
    }

    #[tokio::test]
    async fn test_send_to_registered_user() {
        let hub = Hub::new(8);
        let user = Uuid::new_v4();
        let (_session, mut rx) = hub.connect(user, Some("open-1".to_string()));

        assert!(hub.send_to_user(user, &event("match_found")));
        let frame = rx.recv().await.unwrap();
        let decoded: Event = serde_json::from_str(&frame).unwrap();
        assert_eq!(decoded.kind, "match_found");

        assert!(hub.send_to_open_id("open-1", &event("call_end")));
        assert!(rx.recv().await.is_some());
    }

    #[test]
    fn test_send_to_unknown_user_is_silent() {
        let hub = Hub::new(8);
        assert!(!hub.send_to_user(Uuid::new_v4(), &event("match_found")));
        assert!(!hub.send_to_open_id("nobody", &event("call_end")));
        assert_eq!(hub.session_count(), 0);
    }

    #[tokio::test]
    async fn test_register_supersedes_prior_session() {
        let hub = Hub::new(8);
        let user = Uuid::new_v4();
        let (first, mut first_rx) = hub.connect(user, Some("old".to_string()));
        let (second, _second_rx) = hub.connect(user, Some("new".to_string()));

        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert_eq!(first_rx.recv().await, None);
        assert_eq!(hub.session_count(), 1);
        assert!(!hub.send_to_open_id("old", &event("x")));

        // Late teardown of the old connection leaves the new one in place
        assert!(!hub.unregister(&first));
        assert!(hub.is_online(user));
        assert!(hub.send_to_open_id("new", &event("x")));
    }

    #[test]
    fn test_full_mailbox_disconnects() {
        let hub = Hub::new(2);
        let user = Uuid::new_v4();
        let (session, _rx) = hub.connect(user, None);

        assert!(hub.send_to_user(user, &event("a")));
        assert!(hub.send_to_user(user, &event("b")));
        assert!(!hub.send_to_user(user, &event("c")));

        assert!(session.is_closed());
        assert!(!hub.is_online(user));
        assert!(!hub.send_to_user(user, &event("d")));
    }

    #[test]
    fn test_dropped_reader_unregisters_on_send() {
        let hub = Hub::new(2);
        let user = Uuid::new_v4();
        let (_session, rx) = hub.connect(user, None);
        drop(rx);

        assert!(!hub.send_to_user(user, &event("a")));
        assert!(!hub.is_online(user));
    }

    #[tokio::test]
    async fn test_concurrent_senders_never_block() {
        let hub = Arc::new(Hub::new(16));
        let user = Uuid::new_v4();
        let (_session, _rx) = hub.connect(user, None);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let hub = hub.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..10 {
                    hub.send_to_user(user, &event("tick"));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // 80 frames into a 16-slot mailbox nobody drains
        assert!(!hub.is_online(user));
    }
}
