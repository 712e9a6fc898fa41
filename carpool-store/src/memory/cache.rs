use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;
use carpool_core::cache::{trip_key, TripCache, TRIP_LIST_KEY_PREFIX};
use carpool_shared::{Trip, TripPage};
use super::Unavailable;

struct Entry {
    payload: String,
    /// `None` when the TTL is too large to represent
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Process-local stand-in for the Redis cache, storing the same JSON under
/// the same keys with the same expiry semantics.
#[derive(Default)]
pub struct MemoryTripCache {
    entries: Mutex<HashMap<String, Entry>>,
    down: AtomicBool,
}

impl MemoryTripCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails until switched back
    pub fn set_unavailable(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .get(key)
            .is_some_and(|e| e.live(Instant::now()))
    }

    pub fn entry_count(&self) -> usize {
        self.entries.lock().len()
    }

    fn check(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.down.load(Ordering::SeqCst) {
            return Err(Box::new(Unavailable("trip cache")));
        }
        Ok(())
    }

    fn read<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, Box<dyn std::error::Error + Send + Sync>> {
        self.check()?;
        let mut entries = self.entries.lock();
        let payload = match entries.get(key) {
            Some(e) if e.live(Instant::now()) => e.payload.clone(),
            Some(_) => {
                entries.remove(key);
                return Ok(None);
            }
            None => return Ok(None),
        };
        drop(entries);
        Ok(Some(serde_json::from_str(&payload)?))
    }

    fn write<T: serde::Serialize>(
        &self,
        key: String,
        value: &T,
        ttl: Duration,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.check()?;
        let payload = serde_json::to_string(value)?;
        let now = Instant::now();
        let mut entries = self.entries.lock();
        // Keys that are written once and never read again would otherwise pile up
        entries.retain(|_, e| e.live(now));
        entries.insert(
            key,
            Entry {
                payload,
                expires_at: now.checked_add(ttl),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl TripCache for MemoryTripCache {
    async fn get(&self, trip_id: Uuid) -> Result<Option<Trip>, Box<dyn std::error::Error + Send + Sync>> {
        self.read(&trip_key(trip_id))
    }

    async fn put(&self, trip: &Trip, ttl: Duration) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.write(trip_key(trip.id), trip, ttl)
    }

    async fn invalidate(&self, trip_id: Uuid) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.check()?;
        self.entries.lock().remove(&trip_key(trip_id));
        Ok(())
    }

    async fn get_list(&self, key: &str) -> Result<Option<TripPage>, Box<dyn std::error::Error + Send + Sync>> {
        self.read(key)
    }

    async fn put_list(
        &self,
        key: &str,
        page: &TripPage,
        ttl: Duration,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.write(key.to_string(), page, ttl)
    }

    async fn invalidate_all_lists(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.check()?;
        self.entries
            .lock()
            .retain(|key, _| !key.starts_with(TRIP_LIST_KEY_PREFIX));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = MemoryTripCache::new();
        let page = TripPage::default();
        cache.put_list("trip_list:a", &page, Duration::from_millis(20)).await.unwrap();
        assert!(cache.get_list("trip_list:a").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get_list("trip_list:a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_writes_prune_expired_entries() {
        let cache = MemoryTripCache::new();
        let page = TripPage::default();
        cache.put_list("trip_list:a", &page, Duration::from_millis(10)).await.unwrap();
        cache.put_list("trip_list:b", &page, Duration::from_millis(10)).await.unwrap();
        assert_eq!(cache.entry_count(), 2);

        tokio::time::sleep(Duration::from_millis(30)).await;
        cache.put_list("trip_list:c", &page, Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.entry_count(), 1);
        assert!(cache.contains("trip_list:c"));
    }

    #[tokio::test]
    async fn test_huge_ttl_never_expires() {
        let cache = MemoryTripCache::new();
        cache.put_list("trip_list:a", &TripPage::default(), Duration::MAX).await.unwrap();
        assert!(cache.get_list("trip_list:a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalidate_all_lists_keeps_trips() {
        let cache = MemoryTripCache::new();
        cache.write("trip:x".to_string(), &1, Duration::from_secs(60)).unwrap();
        cache.put_list("trip_list:a", &TripPage::default(), Duration::from_secs(60)).await.unwrap();
        cache.invalidate_all_lists().await.unwrap();

        assert!(cache.contains("trip:x"));
        assert!(!cache.contains("trip_list:a"));
    }

    #[tokio::test]
    async fn test_outage_surfaces_errors() {
        let cache = MemoryTripCache::new();
        cache.set_unavailable(true);
        assert!(cache.get(Uuid::new_v4()).await.is_err());
    }
}
