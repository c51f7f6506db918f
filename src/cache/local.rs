//! In-process cache tier.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{CacheError, CacheService};
use crate::observability::metrics;

/// A cached value and its optional deadline.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: String,
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    /// Whether the entry is logically absent at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// Thread-safe in-memory cache with a background expiry sweep.
///
/// Reads check expiry themselves, so results never depend on when the sweep
/// last ran. The sweep only reclaims memory.
pub struct LocalCache {
    entries: Arc<DashMap<String, CacheEntry>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl LocalCache {
    /// Create the cache and start its sweep task on the current runtime.
    pub fn new(sweep_interval: Duration) -> Self {
        let entries = Arc::new(DashMap::new());
        let sweeper = tokio::spawn(sweep(Arc::clone(&entries), sweep_interval));
        Self {
            entries,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// Number of stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        purge(&self.entries, Instant::now())
    }

    fn lookup(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let found = self
            .entries
            .get(key)
            .map(|entry| (!entry.is_expired(now)).then(|| entry.value.clone()));

        match found {
            Some(Some(value)) => Some(value),
            Some(None) => {
                self.entries.remove_if(key, |_, entry| entry.is_expired(now));
                None
            }
            None => None,
        }
    }

    fn stop_sweeper(&self) {
        let handle = self.sweeper.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

async fn sweep(entries: Arc<DashMap<String, CacheEntry>>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let removed = purge(&entries, Instant::now());
        if removed > 0 {
            tracing::trace!(removed, remaining = entries.len(), "Expired cache entries purged");
        }
    }
}

fn purge(entries: &DashMap<String, CacheEntry>, now: Instant) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired(now));
    before.saturating_sub(entries.len())
}

#[async_trait]
impl CacheService for LocalCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let value = self.lookup(key);
        metrics::record_cache_lookup(self.kind(), value.is_some());
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), CacheError> {
        let expires_at = ttl_secs
            .filter(|secs| *secs > 0)
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.lookup(key).is_some())
    }

    async fn close(&self) -> Result<(), CacheError> {
        self.stop_sweeper();
        self.entries.clear();
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "local"
    }
}

impl Drop for LocalCache {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test(start_paused = true)]
    async fn ttl_expiry_does_not_wait_for_sweep() {
        let cache = LocalCache::new(HOUR);
        cache.set("k", "v", Some(1)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_millis(1001)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(!cache.exists("k").await.unwrap());
        assert!(cache.is_empty(), "expired entry removed on read");
    }

    #[tokio::test(start_paused = true)]
    async fn entries_without_ttl_persist() {
        let cache = LocalCache::new(HOUR);
        cache.set("a", "1", None).await.unwrap();
        cache.set("b", "2", Some(0)).await.unwrap();
        tokio::time::advance(HOUR * 48).await;
        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(cache.get("b").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_reclaims_expired_entries() {
        let cache = LocalCache::new(Duration::from_secs(5));
        cache.set("short", "x", Some(1)).await.unwrap();
        cache.set("long", "y", Some(60)).await.unwrap();
        assert_eq!(cache.len(), 2);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("long").await.unwrap().as_deref(), Some("y"));
    }

    #[tokio::test(start_paused = true)]
    async fn purge_expired_counts_removals() {
        let cache = LocalCache::new(HOUR);
        cache.set("a", "1", Some(1)).await.unwrap();
        cache.set("b", "2", Some(1)).await.unwrap();
        cache.set("c", "3", None).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn overwrite_and_delete() {
        let cache = LocalCache::new(HOUR);
        cache.set("k", "old", None).await.unwrap();
        cache.set("k", "new", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("new"));

        cache.del("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        cache.del("missing").await.unwrap();
    }

    #[tokio::test]
    async fn close_stops_sweep_and_drops_entries() {
        let cache = LocalCache::new(HOUR);
        cache.set("k", "v", None).await.unwrap();
        cache.close().await.unwrap();
        assert!(cache.is_empty());
        assert!(cache.sweeper.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_writers_do_not_lose_keys() {
        let cache = Arc::new(LocalCache::new(Duration::from_millis(1)));
        let mut tasks = Vec::new();
        for t in 0..8 {
            let cache = Arc::clone(&cache);
            tasks.push(tokio::spawn(async move {
                for i in 0..100 {
                    cache.set(&format!("{t}-{i}"), "v", Some(60)).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(cache.len(), 800);
    }
}
