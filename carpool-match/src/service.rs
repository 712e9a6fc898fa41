use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use carpool_core::{CoreError, CoreResult, MatchRepository, UserDirectory};
use carpool_hub::Notifier;
use carpool_shared::models::events::{MatchRejectedEvent, MatchSuccessEvent, MATCH_REJECTED, MATCH_SUCCESS};
use carpool_shared::pii::Masked;
use carpool_shared::{ContactInfo, Decision, Match, MatchStatus, Notification, Side, UserId};
use carpool_trip::TripCacheAside;

/// Both parties' confirmations and what happens once a match resolves.
///
/// A side's decision, the resolved status and the trip flip land in one
/// conditional write. Only the caller whose write closed the match runs the
/// side effects, so concurrent confirmations never notify twice.
#[derive(Clone)]
pub struct MatchService {
    matches: Arc<dyn MatchRepository>,
    trips: TripCacheAside,
    users: Arc<dyn UserDirectory>,
    notifier: Notifier,
}

impl MatchService {
    pub fn new(
        matches: Arc<dyn MatchRepository>,
        trips: TripCacheAside,
        users: Arc<dyn UserDirectory>,
        notifier: Notifier,
    ) -> Self {
        Self { matches, trips, users, notifier }
    }

    async fn load(&self, match_id: Uuid) -> CoreResult<Match> {
        self.matches
            .get_match(match_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("match {}", match_id)))
    }

    /// A match as seen by one of its participants
    pub async fn get(&self, match_id: Uuid, user_id: UserId) -> CoreResult<Match> {
        let m = self.load(match_id).await?;
        if !m.involves(user_id) {
            return Err(CoreError::Forbidden("not a participant of this match".to_string()));
        }
        Ok(m)
    }

    pub async fn get_my_matches(&self, user_id: UserId) -> CoreResult<Vec<Match>> {
        Ok(self.matches.list_user_matches(user_id).await?)
    }

    /// Record `user_id`'s answer and resolve the match if both sides are in
    pub async fn confirm(&self, match_id: Uuid, user_id: UserId, accept: bool) -> CoreResult<Match> {
        let m = self.load(match_id).await?;
        if m.status != MatchStatus::Pending {
            return Err(CoreError::InvalidState(format!("match is already {}", m.status)));
        }
        let side = m
            .side_of(user_id)
            .ok_or_else(|| CoreError::Forbidden("not a participant of this match".to_string()))?;
        if m.decision(side) != Decision::Pending {
            return Err(CoreError::AlreadyDone("you have already answered this match".to_string()));
        }

        // 1. Record this side's decision, resolving the match in the same write
        let decision = Decision::from_accept(accept);
        let updated = match self.matches.record_decision(match_id, side, decision).await? {
            Some(updated) => updated,
            None => return Err(self.explain_lost_decision(match_id, side).await),
        };
        info!(match_id = %match_id, user_id = %user_id, side = ?side, decision = %decision, "Match decision recorded");
        if !updated.status.is_terminal() {
            return Ok(updated);
        }
        info!(match_id = %match_id, status = %updated.status, "Match resolved");

        // 2. Side effects, once
        match updated.status {
            MatchStatus::Failed => self.announce_rejection(&updated).await,
            MatchStatus::Success => self.announce_success(&updated).await,
            MatchStatus::Pending => {}
        }
        Ok(updated)
    }

    /// Work out why a conditional decision write matched no row
    async fn explain_lost_decision(&self, match_id: Uuid, side: Side) -> CoreError {
        match self.load(match_id).await {
            Err(e) => e,
            Ok(m) if m.status != MatchStatus::Pending => {
                CoreError::InvalidState(format!("match is already {}", m.status))
            }
            Ok(m) if m.decision(side) != Decision::Pending => {
                CoreError::AlreadyDone("you have already answered this match".to_string())
            }
            Ok(_) => CoreError::Transient("decision was not recorded".to_string()),
        }
    }

    async fn announce_rejection(&self, m: &Match) {
        for side in [Side::Driver, Side::Passenger] {
            if m.decision(side) == Decision::Rejected {
                continue;
            }
            let notification = Notification::about_match(
                m.user(side),
                m.id,
                "Match declined",
                "The other party declined this match or withdrew their trip. Keep an eye out for new matches.",
            );
            let match_id = m.id;
            self.notifier
                .emit(notification, MATCH_REJECTED, |notification| MatchRejectedEvent { match_id, notification })
                .await;
        }
    }

    async fn announce_success(&self, m: &Match) {
        self.trips.invalidate_trips(&[m.driver_trip_id, m.passenger_trip_id]).await;

        let contact = match self.contact_for(m).await {
            Ok(contact) => contact,
            Err(e) => {
                warn!(match_id = %m.id, "Contact lookup failed, sending without details: {}", e);
                empty_contact()
            }
        };

        for side in [Side::Driver, Side::Passenger] {
            let (nickname, phone) = match side.other() {
                Side::Driver => (&contact.driver_nickname, contact.driver_phone.expose()),
                Side::Passenger => (&contact.passenger_nickname, contact.passenger_phone.expose()),
            };
            let content = format!(
                "Both sides accepted. Contact {} on {} to arrange the ride.",
                display_name(nickname),
                display_phone(phone)
            );
            let notification = Notification::about_match(m.user(side), m.id, "Match confirmed", content);
            let match_id = m.id;
            let contact = contact.clone();
            self.notifier
                .emit(notification, MATCH_SUCCESS, |notification| MatchSuccessEvent {
                    match_id,
                    contact,
                    notification,
                })
                .await;
        }
    }

    async fn contact_for(&self, m: &Match) -> CoreResult<ContactInfo> {
        let driver = self.users.profile(m.driver_id).await?;
        let passenger = self.users.profile(m.passenger_id).await?;
        let (driver_nickname, driver_phone) = driver.map(|p| (p.nickname, p.phone)).unwrap_or_default();
        let (passenger_nickname, passenger_phone) =
            passenger.map(|p| (p.nickname, p.phone)).unwrap_or_default();
        Ok(ContactInfo {
            driver_nickname,
            driver_phone: Masked(driver_phone),
            passenger_nickname,
            passenger_phone: Masked(passenger_phone),
        })
    }

    /// Both parties' contact details, only for a successful match
    pub async fn get_contact_info(&self, match_id: Uuid, user_id: UserId) -> CoreResult<ContactInfo> {
        let m = self.get(match_id, user_id).await?;
        if m.status != MatchStatus::Success {
            return Err(CoreError::InvalidState("contact details are released once both sides accept".to_string()));
        }
        self.contact_for(&m).await
    }
}

fn empty_contact() -> ContactInfo {
    ContactInfo {
        driver_nickname: String::new(),
        driver_phone: Masked(String::new()),
        passenger_nickname: String::new(),
        passenger_phone: Masked(String::new()),
    }
}

fn display_name(nickname: &str) -> &str {
    if nickname.is_empty() { "your match" } else { nickname }
}

fn display_phone(phone: &str) -> &str {
    if phone.is_empty() { "the number in the app" } else { phone }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use carpool_core::cache::trip_key;
    use carpool_core::{TripCache, TripRepository};
    use carpool_hub::{Event, Hub};
    use carpool_shared::{Trip, TripDraft, TripRole, TripStatus};
    use carpool_store::memory::{MemoryStore, MemoryTripCache, MemoryUserDirectory};
    use chrono::Utc;

    struct Fixture {
        store: Arc<MemoryStore>,
        cache: Arc<MemoryTripCache>,
        hub: Arc<Hub>,
        service: MatchService,
        driver: UserId,
        passenger: UserId,
        m: Match,
    }

    fn trip(user: UserId, role: TripRole) -> Trip {
        let draft: TripDraft = serde_json::from_value(serde_json::json!({
            "role": role,
            "departure_city": "Hangzhou",
            "departure_address": "A",
            "destination_city": "Shanghai",
            "destination_address": "B",
            "departure_time": "",
            "seats": 2
        }))
        .unwrap();
        Trip::new(user, draft, Utc::now() + chrono::Duration::days(1))
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryTripCache::new());
        let users = Arc::new(MemoryUserDirectory::new());
        let hub = Arc::new(Hub::new(16));
        let driver = users.add("open-driver", "Lin", "13800000001");
        let passenger = users.add("open-passenger", "Wu", "13900000002");

        let driver_trip = trip(driver, TripRole::Driver);
        let passenger_trip = trip(passenger, TripRole::Passenger);
        store.put_trip(driver_trip.clone());
        store.put_trip(passenger_trip.clone());
        let m = Match::pair(&driver_trip, &passenger_trip, 88.5);
        assert!(store.create_match(&m).await.unwrap());

        let aside = TripCacheAside::new(
            store.clone(),
            cache.clone(),
            Duration::from_secs(600),
            Duration::from_secs(300),
        );
        let service = MatchService::new(store.clone(), aside, users, Notifier::new(store.clone(), hub.clone()));
        Fixture { store, cache, hub, service, driver, passenger, m }
    }

    fn titles(store: &MemoryStore, user: UserId) -> Vec<String> {
        store.notifications_for(user).into_iter().map(|n| n.title).collect()
    }

    #[tokio::test]
    async fn test_single_accept_stays_pending() {
        let f = fixture().await;
        let m = f.service.confirm(f.m.id, f.driver, true).await.unwrap();
        assert_eq!(m.driver_status, Decision::Accepted);
        assert_eq!(m.passenger_status, Decision::Pending);
        assert_eq!(m.status, MatchStatus::Pending);
        assert!(f.store.notifications_for(f.passenger).is_empty());
    }

    #[tokio::test]
    async fn test_double_confirm_already_done() {
        let f = fixture().await;
        f.service.confirm(f.m.id, f.driver, true).await.unwrap();
        let err = f.service.confirm(f.m.id, f.driver, false).await.unwrap_err();
        assert!(matches!(err, CoreError::AlreadyDone(_)));
        assert_eq!(f.service.get(f.m.id, f.driver).await.unwrap().driver_status, Decision::Accepted);
    }

    #[tokio::test]
    async fn test_unknown_and_foreign_matches() {
        let f = fixture().await;
        let err = f.service.confirm(Uuid::new_v4(), f.driver, true).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));

        let stranger = Uuid::new_v4();
        let err = f.service.confirm(f.m.id, stranger, true).await.unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
        let err = f.service.get(f.m.id, stranger).await.unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_both_accept_succeeds() {
        let f = fixture().await;
        for id in [f.m.driver_trip_id, f.m.passenger_trip_id] {
            let t = f.store.get_trip(id).await.unwrap().unwrap();
            f.cache.put(&t, Duration::from_secs(600)).await.unwrap();
        }
        let (_session, mut rx) = f.hub.connect(f.passenger, None);

        f.service.confirm(f.m.id, f.driver, true).await.unwrap();
        let m = f.service.confirm(f.m.id, f.passenger, true).await.unwrap();
        assert_eq!(m.status, MatchStatus::Success);

        for id in [f.m.driver_trip_id, f.m.passenger_trip_id] {
            assert_eq!(f.store.get_trip(id).await.unwrap().unwrap().status, TripStatus::Matched);
            assert!(!f.cache.contains(&trip_key(id)));
        }

        let event: Event = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(event.kind, MATCH_SUCCESS);
        assert_eq!(event.data["contact"]["driver_phone"], "13800000001");
        let passenger_note = &f.store.notifications_for(f.passenger)[0];
        assert!(passenger_note.content.contains("Lin"));
        assert!(passenger_note.content.contains("13800000001"));
        let driver_note = &f.store.notifications_for(f.driver)[0];
        assert!(driver_note.content.contains("13900000002"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_accepts_resolve_once() {
        let f = fixture().await;
        let (a, b) = tokio::join!(
            f.service.confirm(f.m.id, f.driver, true),
            f.service.confirm(f.m.id, f.passenger, true)
        );
        let statuses = [a.unwrap().status, b.unwrap().status];
        assert_eq!(statuses.iter().filter(|s| **s == MatchStatus::Success).count(), 1);

        let m = f.service.get(f.m.id, f.driver).await.unwrap();
        assert_eq!(m.status, MatchStatus::Success);
        assert_eq!(titles(&f.store, f.driver), vec!["Match confirmed"]);
        assert_eq!(titles(&f.store, f.passenger), vec!["Match confirmed"]);
    }

    #[tokio::test]
    async fn test_reject_closes_match() {
        let f = fixture().await;
        let m = f.service.confirm(f.m.id, f.driver, false).await.unwrap();
        assert_eq!(m.status, MatchStatus::Failed);

        let err = f.service.confirm(f.m.id, f.passenger, true).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));

        assert!(f.store.notifications_for(f.driver).is_empty());
        assert_eq!(titles(&f.store, f.passenger), vec!["Match declined"]);
        let trip = f.store.get_trip(f.m.passenger_trip_id).await.unwrap().unwrap();
        assert_eq!(trip.status, TripStatus::Pending);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reject_and_accept() {
        let f = fixture().await;
        let (_session, mut rx) = f.hub.connect(f.passenger, None);
        let (rejected, accepted) = tokio::join!(
            f.service.confirm(f.m.id, f.driver, false),
            f.service.confirm(f.m.id, f.passenger, true)
        );

        // The reject always lands; the accept either came first or lost
        assert_eq!(rejected.unwrap().status, MatchStatus::Failed);
        match accepted {
            Ok(m) => assert_eq!(m.status, MatchStatus::Pending),
            Err(e) => assert!(matches!(e, CoreError::InvalidState(_))),
        }

        let m = f.service.get(f.m.id, f.driver).await.unwrap();
        assert_eq!(m.status, MatchStatus::Failed);
        assert!(f.store.notifications_for(f.driver).is_empty());
        assert_eq!(titles(&f.store, f.passenger), vec!["Match declined"]);
        let event: Event = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(event.kind, MATCH_REJECTED);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cancelled_trip_cannot_be_matched() {
        let f = fixture().await;
        f.service.confirm(f.m.id, f.driver, true).await.unwrap();
        assert!(f
            .store
            .update_trip_status(f.m.passenger_trip_id, &[TripStatus::Pending], TripStatus::Cancelled)
            .await
            .unwrap());

        let m = f.service.confirm(f.m.id, f.passenger, true).await.unwrap();
        assert_eq!(m.status, MatchStatus::Failed);
        assert_eq!(m.passenger_status, Decision::Rejected);

        let trip = f.store.get_trip(f.m.passenger_trip_id).await.unwrap().unwrap();
        assert_eq!(trip.status, TripStatus::Cancelled);
        let trip = f.store.get_trip(f.m.driver_trip_id).await.unwrap().unwrap();
        assert_eq!(trip.status, TripStatus::Pending);
        assert_eq!(titles(&f.store, f.driver), vec!["Match declined"]);
        assert!(f.store.notifications_for(f.passenger).is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_match_retryable() {
        let f = fixture().await;
        f.service.confirm(f.m.id, f.driver, true).await.unwrap();

        f.store.fail_match_writes(true);
        let err = f.service.confirm(f.m.id, f.passenger, true).await.unwrap_err();
        assert!(matches!(err, CoreError::Transient(_)));
        let m = f.service.get(f.m.id, f.passenger).await.unwrap();
        assert_eq!(m.status, MatchStatus::Pending);
        assert_eq!(m.passenger_status, Decision::Pending);
        let trip = f.store.get_trip(f.m.passenger_trip_id).await.unwrap().unwrap();
        assert_eq!(trip.status, TripStatus::Pending);

        f.store.fail_match_writes(false);
        let m = f.service.confirm(f.m.id, f.passenger, true).await.unwrap();
        assert_eq!(m.status, MatchStatus::Success);
        assert_eq!(titles(&f.store, f.driver), vec!["Match confirmed"]);
        assert_eq!(titles(&f.store, f.passenger), vec!["Match confirmed"]);
    }

    #[tokio::test]
    async fn test_reconfirm_after_success_rejected() {
        let f = fixture().await;
        f.service.confirm(f.m.id, f.driver, true).await.unwrap();
        f.service.confirm(f.m.id, f.passenger, true).await.unwrap();
        let err = f.service.confirm(f.m.id, f.driver, false).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
        assert_eq!(f.store.notifications_for(f.driver).len(), 1);
    }

    #[tokio::test]
    async fn test_contact_info_requires_success() {
        let f = fixture().await;
        let err = f.service.get_contact_info(f.m.id, f.driver).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));

        f.service.confirm(f.m.id, f.driver, true).await.unwrap();
        f.service.confirm(f.m.id, f.passenger, true).await.unwrap();
        let info = f.service.get_contact_info(f.m.id, f.passenger).await.unwrap();
        assert_eq!(info.driver_nickname, "Lin");
        assert_eq!(info.passenger_phone.expose(), "13900000002");

        let err = f.service.get_contact_info(f.m.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_my_matches() {
        let f = fixture().await;
        let mine = f.service.get_my_matches(f.passenger).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert!(f.service.get_my_matches(Uuid::new_v4()).await.unwrap().is_empty());
    }
}
