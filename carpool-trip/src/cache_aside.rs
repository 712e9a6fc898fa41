use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;
use carpool_core::{CoreResult, TripCache, TripListQuery, TripRepository};
use carpool_shared::{Trip, TripPage};

/// Read-through, write-invalidate front for the trip store.
///
/// The cache is advisory. Read errors count as misses, repopulation runs in
/// the background, and invalidation failures are logged without failing
/// the write they follow.
#[derive(Clone)]
pub struct TripCacheAside {
    store: Arc<dyn TripRepository>,
    cache: Arc<dyn TripCache>,
    trip_ttl: Duration,
    list_ttl: Duration,
}

impl TripCacheAside {
    pub fn new(
        store: Arc<dyn TripRepository>,
        cache: Arc<dyn TripCache>,
        trip_ttl: Duration,
        list_ttl: Duration,
    ) -> Self {
        Self { store, cache, trip_ttl, list_ttl }
    }

    pub fn store(&self) -> &Arc<dyn TripRepository> {
        &self.store
    }

    pub async fn get(&self, trip_id: Uuid) -> CoreResult<Option<Trip>> {
        match self.cache.get(trip_id).await {
            Ok(Some(trip)) => return Ok(Some(trip)),
            Ok(None) => {}
            Err(e) => debug!(trip_id = %trip_id, "Trip cache read failed, using store: {}", e),
        }

        let trip = self.store.get_trip(trip_id).await?;
        if let Some(trip) = &trip {
            let cache = self.cache.clone();
            let trip = trip.clone();
            let ttl = self.trip_ttl;
            tokio::spawn(async move {
                if let Err(e) = cache.put(&trip, ttl).await {
                    debug!(trip_id = %trip.id, "Trip cache fill failed: {}", e);
                }
            });
        }
        Ok(trip)
    }

    /// `query` must already be normalized so equal filters share a key
    pub async fn list(&self, query: &TripListQuery) -> CoreResult<TripPage> {
        let key = query.cache_key();
        match self.cache.get_list(&key).await {
            Ok(Some(page)) => return Ok(page),
            Ok(None) => {}
            Err(e) => debug!(key = %key, "Trip list cache read failed, using store: {}", e),
        }

        let (list, total) = self.store.list_trips(query).await?;
        let page = TripPage { list, total };

        let cache = self.cache.clone();
        let cached = page.clone();
        let ttl = self.list_ttl;
        tokio::spawn(async move {
            if let Err(e) = cache.put_list(&key, &cached, ttl).await {
                debug!(key = %key, "Trip list cache fill failed: {}", e);
            }
        });
        Ok(page)
    }

    /// Run a store write, then drop the affected trip key and every cached
    /// list. Every trip-mutating path goes through here.
    pub async fn mutate<T, F>(&self, trip_id: Option<Uuid>, write: F) -> CoreResult<T>
    where
        F: Future<Output = CoreResult<T>>,
    {
        let out = write.await?;
        match trip_id {
            Some(id) => self.invalidate_trips(&[id]).await,
            None => self.invalidate_lists().await,
        }
        Ok(out)
    }

    /// Invalidate trips changed outside [`Self::mutate`], plus all lists
    pub async fn invalidate_trips(&self, trip_ids: &[Uuid]) {
        for id in trip_ids {
            if let Err(e) = self.cache.invalidate(*id).await {
                warn!(trip_id = %id, "Trip cache invalidation failed: {}", e);
            }
        }
        self.invalidate_lists().await;
    }

    async fn invalidate_lists(&self) {
        if let Err(e) = self.cache.invalidate_all_lists().await {
            warn!("Trip list cache invalidation failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carpool_core::CoreError;
    use carpool_shared::{TripDraft, TripRole, TripStatus};
    use carpool_store::memory::{MemoryStore, MemoryTripCache};

    fn sample_trip() -> Trip {
        let draft: TripDraft = serde_json::from_value(serde_json::json!({
            "role": "DRIVER",
            "departure_city": "Hangzhou",
            "departure_address": "West Lake",
            "destination_city": "Shanghai",
            "destination_address": "Hongqiao",
            "departure_time": "",
            "seats": 3
        }))
        .unwrap();
        Trip::new(Uuid::new_v4(), draft, chrono::Utc::now() + chrono::Duration::hours(3))
    }

    fn setup() -> (Arc<MemoryStore>, Arc<MemoryTripCache>, TripCacheAside) {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryTripCache::new());
        let aside = TripCacheAside::new(
            store.clone(),
            cache.clone(),
            Duration::from_secs(600),
            Duration::from_secs(300),
        );
        (store, cache, aside)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_read_through_fills_cache() {
        let (store, _cache, aside) = setup();
        let trip = sample_trip();
        store.put_trip(trip.clone());

        assert_eq!(aside.get(trip.id).await.unwrap(), Some(trip.clone()));
        settle().await;
        assert_eq!(aside.get(trip.id).await.unwrap(), Some(trip));
        assert_eq!(store.trip_reads(), 1);
    }

    #[tokio::test]
    async fn test_cache_outage_falls_through() {
        let (store, cache, aside) = setup();
        let trip = sample_trip();
        let trip_id = trip.id;
        store.put_trip(trip.clone());
        cache.set_unavailable(true);

        assert_eq!(aside.get(trip_id).await.unwrap(), Some(trip));
        assert!(aside.get(Uuid::new_v4()).await.unwrap().is_none());
        assert_eq!(
            aside.list(&TripListQuery::default().normalized(20)).await.unwrap().total,
            1
        );

        // Writes still succeed with the cache down
        aside.mutate(Some(trip_id), async { Ok::<_, CoreError>(()) }).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_cached_until_status_change() {
        let (store, cache, aside) = setup();
        let trip = sample_trip();
        store.put_trip(trip.clone());
        let query = TripListQuery::default().normalized(20);
        let key = query.cache_key();

        assert_eq!(aside.list(&query).await.unwrap().total, 1);
        settle().await;
        assert!(cache.contains(&key));

        let store_ref = store.clone();
        aside
            .mutate(Some(trip.id), async move {
                store_ref
                    .update_trip_status(trip.id, &[TripStatus::Pending], TripStatus::Cancelled)
                    .await
                    .map_err(CoreError::from)
            })
            .await
            .unwrap();

        assert!(!cache.contains(&key));
        assert_eq!(aside.list(&query).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_distinct_filters_do_not_collide() {
        let (store, _cache, aside) = setup();
        store.put_trip(sample_trip());

        let drivers = TripListQuery { role: Some(TripRole::Driver), ..Default::default() }.normalized(20);
        let passengers = TripListQuery { role: Some(TripRole::Passenger), ..Default::default() }.normalized(20);

        assert_eq!(aside.list(&drivers).await.unwrap().total, 1);
        settle().await;
        assert_eq!(aside.list(&passengers).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_failed_write_skips_invalidation() {
        let (store, cache, aside) = setup();
        let trip = sample_trip();
        store.put_trip(trip.clone());
        aside.get(trip.id).await.unwrap();
        settle().await;

        let result: CoreResult<()> = aside
            .mutate(Some(trip.id), async { Err::<(), _>(CoreError::Transient("db down".to_string())) })
            .await;
        assert!(result.is_err());
        assert!(cache.contains(&carpool_core::cache::trip_key(trip.id)));
    }
}
