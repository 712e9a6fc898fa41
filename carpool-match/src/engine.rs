use std::sync::Arc;
use tracing::{debug, error, info};
use carpool_core::{CoreResult, MatchRepository, MatchTrigger, TripRepository};
use carpool_hub::Notifier;
use carpool_shared::models::events::{MatchFoundEvent, MATCH_FOUND};
use carpool_shared::{Match, Notification, Trip, TripRole};

use crate::scoring;

/// Upper bound on candidates scored per new trip
pub const CANDIDATE_LIMIT: i64 = 20;
/// Candidates must depart within this many hours either side
pub const SEARCH_WINDOW_HOURS: i64 = 12;
/// Candidates scoring below this are discarded
pub const MIN_ACCEPT_SCORE: f64 = 50.0;

/// Outcome of one matching run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MatchRun {
    pub candidates: usize,
    pub below_threshold: usize,
    pub duplicates: usize,
    pub created: usize,
    pub failed: usize,
}

enum CandidateOutcome {
    BelowThreshold,
    Duplicate,
    Created,
}

/// Finds counterparts for a freshly created trip and proposes matches
#[derive(Clone)]
pub struct MatchEngine {
    trips: Arc<dyn TripRepository>,
    matches: Arc<dyn MatchRepository>,
    notifier: Notifier,
}

impl MatchEngine {
    pub fn new(trips: Arc<dyn TripRepository>, matches: Arc<dyn MatchRepository>, notifier: Notifier) -> Self {
        Self { trips, matches, notifier }
    }

    pub async fn find_and_notify(&self, trip: &Trip) -> CoreResult<MatchRun> {
        let window = chrono::Duration::hours(SEARCH_WINDOW_HOURS);
        let candidates = self
            .trips
            .list_opposite_candidates(trip, window, CANDIDATE_LIMIT)
            .await?;

        debug!(trip_id = %trip.id, candidates = candidates.len(), "Scoring match candidates");

        let mut run = MatchRun { candidates: candidates.len(), ..Default::default() };
        for candidate in &candidates {
            // One bad candidate must not stop the rest
            match self.consider(trip, candidate).await {
                Ok(CandidateOutcome::BelowThreshold) => run.below_threshold += 1,
                Ok(CandidateOutcome::Duplicate) => run.duplicates += 1,
                Ok(CandidateOutcome::Created) => run.created += 1,
                Err(e) => {
                    run.failed += 1;
                    error!(trip_id = %trip.id, candidate_id = %candidate.id, "Match candidate failed: {}", e);
                }
            }
        }
        Ok(run)
    }

    async fn consider(&self, trip: &Trip, candidate: &Trip) -> CoreResult<CandidateOutcome> {
        // 1. Score
        let score = scoring::score(trip, candidate);
        if score < MIN_ACCEPT_SCORE {
            return Ok(CandidateOutcome::BelowThreshold);
        }

        // 2. Dedup on the trip pair
        if self.matches.get_match_by_trips(trip.id, candidate.id).await?.is_some() {
            return Ok(CandidateOutcome::Duplicate);
        }
        let m = Match::pair(trip, candidate, score);
        if !self.matches.create_match(&m).await? {
            return Ok(CandidateOutcome::Duplicate);
        }

        info!(
            match_id = %m.id,
            driver_id = %m.driver_id,
            passenger_id = %m.passenger_id,
            score,
            "Match created"
        );

        // 3. Tell both owners about the other side's trip
        let (driver_trip, passenger_trip) = match trip.role {
            TripRole::Driver => (trip, candidate),
            TripRole::Passenger => (candidate, trip),
        };
        self.announce(&m, m.driver_id, "Passenger found", "A passenger", passenger_trip).await;
        self.announce(&m, m.passenger_id, "Driver found", "A driver", driver_trip).await;

        Ok(CandidateOutcome::Created)
    }

    async fn announce(&self, m: &Match, recipient: carpool_shared::UserId, title: &str, who: &str, counterpart: &Trip) {
        let content = format!(
            "{} is travelling from {} to {}, match score {:.0}%. Please confirm whether to accept.",
            who, counterpart.departure_city, counterpart.destination_city, m.score
        );
        let notification = Notification::about_match(recipient, m.id, title, content);
        let (match_id, score) = (m.id, m.score);
        self.notifier
            .emit(notification, MATCH_FOUND, |notification| MatchFoundEvent {
                match_id,
                score,
                notification,
            })
            .await;
    }
}

impl MatchTrigger for MatchEngine {
    /// Matching runs detached from the request that created the trip
    fn submit(&self, trip: Trip) {
        let engine = self.clone();
        tokio::spawn(async move {
            match engine.find_and_notify(&trip).await {
                Ok(run) => debug!(trip_id = %trip.id, ?run, "Matching finished"),
                Err(e) => error!(trip_id = %trip.id, "Matching aborted: {}", e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use carpool_hub::{Event, Hub};
    use carpool_shared::{MatchStatus, TripDraft};
    use carpool_store::memory::MemoryStore;
    use chrono::Utc;
    use uuid::Uuid;

    fn trip(role: TripRole, from: &str, to: &str, offset_minutes: i64, lat_shift: f64) -> Trip {
        let draft: TripDraft = serde_json::from_value(serde_json::json!({
            "role": role,
            "departure_city": from,
            "departure_address": "A",
            "departure_lat": 30.27 + lat_shift,
            "departure_lng": 120.15,
            "destination_city": to,
            "destination_address": "B",
            "destination_lat": 31.23,
            "destination_lng": 121.47,
            "departure_time": "",
            "seats": 2
        }))
        .unwrap();
        let base = Utc::now() + chrono::Duration::days(1);
        Trip::new(Uuid::new_v4(), draft, base + chrono::Duration::minutes(offset_minutes))
    }

    fn setup() -> (Arc<MemoryStore>, Arc<Hub>, MatchEngine) {
        let store = Arc::new(MemoryStore::new());
        let hub = Arc::new(Hub::new(16));
        let engine = MatchEngine::new(store.clone(), store.clone(), Notifier::new(store.clone(), hub.clone()));
        (store, hub, engine)
    }

    #[tokio::test]
    async fn test_no_candidates_no_matches() {
        let (store, _hub, engine) = setup();
        let driver = trip(TripRole::Driver, "Hangzhou", "Shanghai", 0, 0.0);
        store.put_trip(driver.clone());
        // Wrong city pair, same role, and outside the window
        store.put_trip(trip(TripRole::Passenger, "Hangzhou", "Nanjing", 0, 0.0));
        store.put_trip(trip(TripRole::Driver, "Hangzhou", "Shanghai", 0, 0.0));
        store.put_trip(trip(TripRole::Passenger, "Hangzhou", "Shanghai", 13 * 60, 0.0));

        let run = engine.find_and_notify(&driver).await.unwrap();
        assert_eq!(run, MatchRun::default());
        assert!(store.list_user_matches(driver.user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_creates_match_and_notifies_both() {
        let (store, hub, engine) = setup();
        let driver = trip(TripRole::Driver, "Hangzhou", "Shanghai", 0, 0.0);
        let passenger = trip(TripRole::Passenger, "Hangzhou", "Shanghai", 30, 0.01);
        store.put_trip(driver.clone());
        store.put_trip(passenger.clone());
        let (_d, mut driver_rx) = hub.connect(driver.user_id, None);
        let (_p, mut passenger_rx) = hub.connect(passenger.user_id, None);

        let run = engine.find_and_notify(&passenger).await.unwrap();
        assert_eq!(run.created, 1);

        let matches = store.list_user_matches(driver.user_id).await.unwrap();
        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert_eq!(m.driver_trip_id, driver.id);
        assert_eq!(m.passenger_trip_id, passenger.id);
        assert_eq!(m.status, MatchStatus::Pending);
        assert!(m.score >= MIN_ACCEPT_SCORE && m.score < 100.0);

        for rx in [&mut driver_rx, &mut passenger_rx] {
            let event: Event = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
            assert_eq!(event.kind, MATCH_FOUND);
            assert_eq!(event.data["match_id"], m.id.to_string());
        }
        let driver_note = &store.notifications_for(driver.user_id)[0];
        assert!(driver_note.content.contains("A passenger"));
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let (store, _hub, engine) = setup();
        let driver = trip(TripRole::Driver, "Hangzhou", "Shanghai", 0, 0.0);
        let passenger = trip(TripRole::Passenger, "Hangzhou", "Shanghai", 0, 0.0);
        store.put_trip(driver.clone());
        store.put_trip(passenger.clone());

        assert_eq!(engine.find_and_notify(&driver).await.unwrap().created, 1);
        let again = engine.find_and_notify(&passenger).await.unwrap();
        assert_eq!(again.created, 0);
        assert_eq!(again.duplicates, 1);
        assert_eq!(store.notifications_for(driver.user_id).len(), 1);
    }

    #[tokio::test]
    async fn test_low_scores_discarded() {
        let (store, _hub, engine) = setup();
        let driver = trip(TripRole::Driver, "Hangzhou", "Shanghai", 0, 0.0);
        // Eleven hours apart: time factor about 8
        let late = trip(TripRole::Passenger, "Hangzhou", "Shanghai", 11 * 60, 0.0);
        // Departure point ~40 km away and three hours later
        let far = trip(TripRole::Passenger, "Hangzhou", "Shanghai", 3 * 60, 0.36);
        let good = trip(TripRole::Passenger, "Hangzhou", "Shanghai", 10, 0.0);
        for t in [&driver, &late, &far, &good] {
            store.put_trip(t.clone());
        }

        let run = engine.find_and_notify(&driver).await.unwrap();
        assert_eq!(run.candidates, 3);
        assert_eq!(run.below_threshold, 2);
        assert_eq!(run.created, 1);
        assert!(store.notifications_for(late.user_id).is_empty());
        assert!(store.notifications_for(far.user_id).is_empty());
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_stop_batch() {
        let (store, _hub, engine) = setup();
        let driver = trip(TripRole::Driver, "Hangzhou", "Shanghai", 0, 0.0);
        let a = trip(TripRole::Passenger, "Hangzhou", "Shanghai", 5, 0.0);
        let b = trip(TripRole::Passenger, "Hangzhou", "Shanghai", 15, 0.0);
        for t in [&driver, &a, &b] {
            store.put_trip(t.clone());
        }
        store.fail_notifications(true);

        let run = engine.find_and_notify(&driver).await.unwrap();
        assert_eq!(run.created, 2);
        assert_eq!(store.list_user_matches(driver.user_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_submit_runs_in_background() {
        let (store, _hub, engine) = setup();
        let driver = trip(TripRole::Driver, "Hangzhou", "Shanghai", 0, 0.0);
        let passenger = trip(TripRole::Passenger, "Hangzhou", "Shanghai", 0, 0.0);
        store.put_trip(driver.clone());
        store.put_trip(passenger.clone());

        engine.submit(passenger.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.list_user_matches(passenger.user_id).await.unwrap().len(), 1);
    }
}
