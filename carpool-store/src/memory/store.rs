use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;
use carpool_core::repository::{MatchRepository, NotificationRepository, TripRepository};
use carpool_core::TripListQuery;
use carpool_shared::{
    Decision, Match, MatchStatus, Notification, NotificationPage, Side, Trip, TripFieldPatch,
    TripGrab, TripStatus, TripUpdate, UserId,
};
use super::Unavailable;

#[derive(Default)]
struct State {
    trips: HashMap<Uuid, Trip>,
    matches: HashMap<Uuid, Match>,
    notifications: Vec<Notification>,
    grabs: Vec<TripGrab>,
    updates: Vec<TripUpdate>,
}

/// Trips, matches and notifications behind one lock, so resolving a match
/// and flipping both trips is atomic just like the Postgres transaction.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    trip_reads: AtomicUsize,
    fail_notifications: AtomicBool,
    fail_match_writes: AtomicBool,
    status_after_read: Mutex<Option<TripStatus>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get_trip` calls served so far
    pub fn trip_reads(&self) -> usize {
        self.trip_reads.load(Ordering::SeqCst)
    }

    /// Make every notification insert fail until switched back
    pub fn fail_notifications(&self, fail: bool) {
        self.fail_notifications.store(fail, Ordering::SeqCst);
    }

    /// Make every match decision write fail until switched back
    pub fn fail_match_writes(&self, fail: bool) {
        self.fail_match_writes.store(fail, Ordering::SeqCst);
    }

    /// Change the status of whichever trip the next `get_trip` reads, right
    /// after that read. Stands in for a concurrent writer landing between a
    /// caller's check and its write.
    pub fn change_status_after_next_read(&self, status: TripStatus) {
        *self.status_after_read.lock() = Some(status);
    }

    /// Insert or overwrite a trip without any business checks
    pub fn put_trip(&self, trip: Trip) {
        self.state.lock().trips.insert(trip.id, trip);
    }

    pub fn notifications_for(&self, user_id: UserId) -> Vec<Notification> {
        self.state
            .lock()
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn update_requests(&self, trip_id: Uuid) -> Vec<TripUpdate> {
        self.state
            .lock()
            .updates
            .iter()
            .filter(|u| u.trip_id == trip_id)
            .cloned()
            .collect()
    }
}

fn contains(haystack: &str, needle: &Option<String>) -> bool {
    needle.as_deref().map_or(true, |n| haystack.contains(n))
}

fn matches_filter(trip: &Trip, query: &TripListQuery) -> bool {
    if trip.status != TripStatus::Pending {
        return false;
    }
    if query.role.is_some_and(|role| role != trip.role) {
        return false;
    }
    if !contains(&trip.departure_city, &query.departure_city)
        || !contains(&trip.destination_city, &query.destination_city)
    {
        return false;
    }
    if let Some((start, end)) = query.departure_window() {
        if trip.departure_time < start || trip.departure_time >= end {
            return false;
        }
    }
    if query.exclude_user_id == Some(trip.user_id) {
        return false;
    }
    if query.user_city.is_some() || query.user_province.is_some() {
        let city_hit = is_city_relevant(trip, query);
        let province_hit = query.user_province.as_deref().is_some_and(|p| {
            trip.departure_province == p || trip.destination_province == p
        });
        if !city_hit && !province_hit {
            return false;
        }
    }
    true
}

fn is_city_relevant(trip: &Trip, query: &TripListQuery) -> bool {
    query
        .user_city
        .as_deref()
        .is_some_and(|c| trip.departure_city == c || trip.destination_city == c)
}

#[async_trait]
impl TripRepository for MemoryStore {
    async fn create_trip(&self, trip: &Trip) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.state.lock().trips.insert(trip.id, trip.clone());
        Ok(())
    }

    async fn get_trip(&self, id: Uuid) -> Result<Option<Trip>, Box<dyn std::error::Error + Send + Sync>> {
        self.trip_reads.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        let trip = state.trips.get(&id).cloned();
        if let Some(status) = self.status_after_read.lock().take() {
            if let Some(stored) = state.trips.get_mut(&id) {
                stored.status = status;
            }
        }
        Ok(trip)
    }

    async fn list_trips(
        &self,
        query: &TripListQuery,
    ) -> Result<(Vec<Trip>, i64), Box<dyn std::error::Error + Send + Sync>> {
        let mut hits: Vec<Trip> = self
            .state
            .lock()
            .trips
            .values()
            .filter(|t| matches_filter(t, query))
            .cloned()
            .collect();

        hits.sort_by_key(|t| (!is_city_relevant(t, query), t.departure_time));
        let total = hits.len() as i64;
        let page = hits
            .into_iter()
            .skip(query.offset().max(0) as usize)
            .take(query.page_size.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn list_user_trips(&self, user_id: UserId) -> Result<Vec<Trip>, Box<dyn std::error::Error + Send + Sync>> {
        let mut trips: Vec<Trip> = self
            .state
            .lock()
            .trips
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        trips.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(trips)
    }

    async fn update_trip_status(
        &self,
        id: Uuid,
        from: &[TripStatus],
        to: TripStatus,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let mut state = self.state.lock();
        match state.trips.get_mut(&id) {
            Some(trip) if from.contains(&trip.status) => {
                trip.status = to;
                trip.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_opposite_candidates(
        &self,
        trip: &Trip,
        window: chrono::Duration,
        limit: i64,
    ) -> Result<Vec<Trip>, Box<dyn std::error::Error + Send + Sync>> {
        let role = trip.role.opposite();
        let (start, end) = (trip.departure_time - window, trip.departure_time + window);
        let mut candidates: Vec<Trip> = self
            .state
            .lock()
            .trips
            .values()
            .filter(|t| {
                t.role == role
                    && t.status == TripStatus::Pending
                    && t.departure_city == trip.departure_city
                    && t.destination_city == trip.destination_city
                    && t.departure_time >= start
                    && t.departure_time <= end
                    && t.user_id != trip.user_id
            })
            .cloned()
            .collect();

        candidates.sort_by_key(|t| (t.departure_time - trip.departure_time).num_seconds().abs());
        candidates.truncate(limit.max(0) as usize);
        Ok(candidates)
    }

    async fn count_active_trips(&self, user_id: UserId) -> Result<i64, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self
            .state
            .lock()
            .trips
            .values()
            .filter(|t| t.user_id == user_id && t.status.is_active())
            .count() as i64)
    }

    async fn count_trips_created_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<i64, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self
            .state
            .lock()
            .trips
            .values()
            .filter(|t| t.user_id == user_id && t.created_at >= since)
            .count() as i64)
    }

    async fn increment_view_count(&self, id: Uuid) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if let Some(trip) = self.state.lock().trips.get_mut(&id) {
            trip.view_count += 1;
        }
        Ok(())
    }

    async fn delete_trip(&self, id: Uuid, user_id: UserId) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let mut state = self.state.lock();
        if state.trips.get(&id).is_some_and(|t| t.user_id == user_id) {
            state.trips.remove(&id);
            state.grabs.retain(|g| g.trip_id != id);
            state.updates.retain(|u| u.trip_id != id);
            state
                .matches
                .retain(|_, m| m.driver_trip_id != id && m.passenger_trip_id != id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn patch_trip(&self, id: Uuid, patch: &TripFieldPatch) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if let Some(trip) = self.state.lock().trips.get_mut(&id) {
            if let Some(images) = &patch.images {
                trip.images = images.clone();
            }
            if let Some(remark) = &patch.remark {
                trip.remark = remark.clone();
            }
            if let Some(seats) = patch.seats {
                trip.seats = seats;
            }
            if let Some(price) = patch.price {
                trip.price = price;
            }
            trip.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn create_grab(&self, grab: &TripGrab) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let mut state = self.state.lock();
        if state
            .grabs
            .iter()
            .any(|g| g.trip_id == grab.trip_id && g.user_id == grab.user_id)
        {
            return Ok(false);
        }
        state.grabs.push(grab.clone());
        Ok(true)
    }

    async fn list_grabs(&self, trip_id: Uuid) -> Result<Vec<TripGrab>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self
            .state
            .lock()
            .grabs
            .iter()
            .filter(|g| g.trip_id == trip_id)
            .cloned()
            .collect())
    }

    async fn create_update_request(&self, update: &TripUpdate) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.state.lock().updates.push(update.clone());
        Ok(())
    }
}

#[async_trait]
impl MatchRepository for MemoryStore {
    async fn create_match(&self, m: &Match) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let mut state = self.state.lock();
        if state
            .matches
            .values()
            .any(|x| x.driver_trip_id == m.driver_trip_id && x.passenger_trip_id == m.passenger_trip_id)
        {
            return Ok(false);
        }
        state.matches.insert(m.id, m.clone());
        Ok(true)
    }

    async fn get_match(&self, id: Uuid) -> Result<Option<Match>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.state.lock().matches.get(&id).cloned())
    }

    async fn get_match_by_trips(
        &self,
        trip_a: Uuid,
        trip_b: Uuid,
    ) -> Result<Option<Match>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self
            .state
            .lock()
            .matches
            .values()
            .find(|m| {
                (m.driver_trip_id == trip_a && m.passenger_trip_id == trip_b)
                    || (m.driver_trip_id == trip_b && m.passenger_trip_id == trip_a)
            })
            .cloned())
    }

    async fn list_user_matches(&self, user_id: UserId) -> Result<Vec<Match>, Box<dyn std::error::Error + Send + Sync>> {
        let mut matches: Vec<Match> = self
            .state
            .lock()
            .matches
            .values()
            .filter(|m| m.involves(user_id))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matches)
    }

    async fn record_decision(
        &self,
        id: Uuid,
        side: Side,
        decision: Decision,
    ) -> Result<Option<Match>, Box<dyn std::error::Error + Send + Sync>> {
        if self.fail_match_writes.load(Ordering::SeqCst) {
            return Err(Box::new(Unavailable("match store")));
        }
        let mut state = self.state.lock();
        let mut m = match state.matches.get(&id) {
            Some(m) if m.status == MatchStatus::Pending && m.decision(side) == Decision::Pending => m.clone(),
            _ => return Ok(None),
        };
        m.set_decision(side, decision);

        if m.resolved_status() == MatchStatus::Success {
            let trips = [(Side::Driver, m.driver_trip_id), (Side::Passenger, m.passenger_trip_id)];
            let mut all_live = true;
            for (trip_side, trip_id) in trips {
                let live = state.trips.get(&trip_id).is_some_and(|t| t.status.is_active());
                if !live {
                    m.set_decision(trip_side, Decision::Rejected);
                    all_live = false;
                }
            }
            if all_live {
                for (_, trip_id) in trips {
                    if let Some(trip) = state.trips.get_mut(&trip_id) {
                        trip.status = TripStatus::Matched;
                        trip.updated_at = Utc::now();
                    }
                }
            }
        }
        m.status = m.resolved_status();
        state.matches.insert(m.id, m.clone());
        Ok(Some(m))
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn create_notification(
        &self,
        notification: &Notification,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.fail_notifications.load(Ordering::SeqCst) {
            return Err(Box::new(Unavailable("notification store")));
        }
        self.state.lock().notifications.push(notification.clone());
        Ok(())
    }

    async fn list_notifications(
        &self,
        user_id: UserId,
        page: i64,
        page_size: i64,
    ) -> Result<NotificationPage, Box<dyn std::error::Error + Send + Sync>> {
        let mut mine = self.notifications_for(user_id);
        mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = mine.len() as i64;
        let unread = mine.iter().filter(|n| !n.is_read).count() as i64;
        let list = mine
            .into_iter()
            .skip(((page - 1) * page_size).max(0) as usize)
            .take(page_size.max(0) as usize)
            .collect();
        Ok(NotificationPage { list, total, unread })
    }

    async fn mark_read(&self, id: Uuid, user_id: UserId) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let mut state = self.state.lock();
        match state
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
        {
            Some(n) => {
                n.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_read(&self, user_id: UserId) -> Result<u64, Box<dyn std::error::Error + Send + Sync>> {
        let mut state = self.state.lock();
        let mut changed = 0;
        for n in state
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id && !n.is_read)
        {
            n.is_read = true;
            changed += 1;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carpool_shared::{TripDraft, TripRole};

    fn trip(user: UserId, role: TripRole, from: &str, to: &str, hours: i64) -> Trip {
        let draft = TripDraft {
            role,
            departure_city: from.to_string(),
            departure_province: String::new(),
            departure_address: "A".to_string(),
            departure_lat: 0.0,
            departure_lng: 0.0,
            destination_city: to.to_string(),
            destination_province: String::new(),
            destination_address: "B".to_string(),
            destination_lat: 0.0,
            destination_lng: 0.0,
            departure_time: String::new(),
            seats: 2,
            price: 0.0,
            remark: String::new(),
            images: String::new(),
        };
        Trip::new(user, draft, Utc::now() + chrono::Duration::hours(hours))
    }

    #[tokio::test]
    async fn test_list_orders_city_relevant_first() {
        let store = MemoryStore::new();
        let far = trip(Uuid::new_v4(), TripRole::Driver, "Hangzhou", "Ningbo", 1);
        let near = trip(Uuid::new_v4(), TripRole::Driver, "Suzhou", "Shanghai", 5);
        let mut banned = trip(Uuid::new_v4(), TripRole::Driver, "Suzhou", "Shanghai", 2);
        banned.status = TripStatus::Banned;
        for t in [&far, &near, &banned] {
            store.create_trip(t).await.unwrap();
        }

        let query = TripListQuery::default().normalized(20);
        let (list, total) = store.list_trips(&query).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(list[0].id, far.id);

        let query = TripListQuery {
            user_city: Some("Shanghai".to_string()),
            ..Default::default()
        }
        .normalized(20);
        let (list, total) = store.list_trips(&query).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(list[0].id, near.id);
    }

    #[tokio::test]
    async fn test_candidates_exclude_owner_and_far_times() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let mine = trip(owner, TripRole::Driver, "Hangzhou", "Shanghai", 24);
        let own_passenger = trip(owner, TripRole::Passenger, "Hangzhou", "Shanghai", 24);
        let close = trip(Uuid::new_v4(), TripRole::Passenger, "Hangzhou", "Shanghai", 25);
        let closer = trip(Uuid::new_v4(), TripRole::Passenger, "Hangzhou", "Shanghai", 24);
        let too_late = trip(Uuid::new_v4(), TripRole::Passenger, "Hangzhou", "Shanghai", 40);
        for t in [&mine, &own_passenger, &close, &closer, &too_late] {
            store.create_trip(t).await.unwrap();
        }

        let found = store
            .list_opposite_candidates(&mine, chrono::Duration::hours(12), 20)
            .await
            .unwrap();
        let ids: Vec<Uuid> = found.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![closer.id, close.id]);
    }

    #[tokio::test]
    async fn test_record_decision_only_once_per_side() {
        let store = MemoryStore::new();
        let d = trip(Uuid::new_v4(), TripRole::Driver, "A", "B", 3);
        let p = trip(Uuid::new_v4(), TripRole::Passenger, "A", "B", 3);
        let m = Match::pair(&d, &p, 90.0);
        assert!(store.create_match(&m).await.unwrap());
        assert!(!store.create_match(&Match::pair(&p, &d, 90.0)).await.unwrap());

        let first = store.record_decision(m.id, Side::Driver, Decision::Accepted).await.unwrap();
        assert_eq!(first.unwrap().driver_status, Decision::Accepted);
        let again = store.record_decision(m.id, Side::Driver, Decision::Rejected).await.unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_second_accept_flips_trips() {
        let store = MemoryStore::new();
        let d = trip(Uuid::new_v4(), TripRole::Driver, "A", "B", 3);
        let p = trip(Uuid::new_v4(), TripRole::Passenger, "A", "B", 3);
        store.create_trip(&d).await.unwrap();
        store.create_trip(&p).await.unwrap();
        let m = Match::pair(&d, &p, 90.0);
        store.create_match(&m).await.unwrap();

        let first = store.record_decision(m.id, Side::Driver, Decision::Accepted).await.unwrap();
        assert_eq!(first.unwrap().status, MatchStatus::Pending);
        let second = store.record_decision(m.id, Side::Passenger, Decision::Accepted).await.unwrap();
        assert_eq!(second.unwrap().status, MatchStatus::Success);

        let d = store.get_trip(d.id).await.unwrap().unwrap();
        assert_eq!(d.status, TripStatus::Matched);
    }

    #[tokio::test]
    async fn test_cancelled_trip_fails_match_instead_of_reviving() {
        let store = MemoryStore::new();
        let d = trip(Uuid::new_v4(), TripRole::Driver, "A", "B", 3);
        let p = trip(Uuid::new_v4(), TripRole::Passenger, "A", "B", 3);
        store.create_trip(&d).await.unwrap();
        store.create_trip(&p).await.unwrap();
        let m = Match::pair(&d, &p, 90.0);
        store.create_match(&m).await.unwrap();

        store.record_decision(m.id, Side::Driver, Decision::Accepted).await.unwrap();
        assert!(store
            .update_trip_status(p.id, &[TripStatus::Pending], TripStatus::Cancelled)
            .await
            .unwrap());
        let closed = store
            .record_decision(m.id, Side::Passenger, Decision::Accepted)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(closed.status, MatchStatus::Failed);
        assert_eq!(closed.driver_status, Decision::Accepted);
        assert_eq!(closed.passenger_status, Decision::Rejected);
        let p = store.get_trip(p.id).await.unwrap().unwrap();
        assert_eq!(p.status, TripStatus::Cancelled);
        let d = store.get_trip(d.id).await.unwrap().unwrap();
        assert_eq!(d.status, TripStatus::Pending);
    }

    #[tokio::test]
    async fn test_status_update_requires_expected_source() {
        let store = MemoryStore::new();
        let t = trip(Uuid::new_v4(), TripRole::Driver, "A", "B", 3);
        store.create_trip(&t).await.unwrap();

        assert!(store
            .update_trip_status(t.id, &[TripStatus::Pending], TripStatus::Matched)
            .await
            .unwrap());
        assert!(!store
            .update_trip_status(t.id, &[TripStatus::Pending], TripStatus::Cancelled)
            .await
            .unwrap());
        assert!(!store
            .update_trip_status(Uuid::new_v4(), &[TripStatus::Pending], TripStatus::Cancelled)
            .await
            .unwrap());
        let t = store.get_trip(t.id).await.unwrap().unwrap();
        assert_eq!(t.status, TripStatus::Matched);
    }
}
