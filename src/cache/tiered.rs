//! Two-tier cache: in-process first, remote second.

use async_trait::async_trait;

use super::{combine, CacheError, CacheService, LocalCache};
use crate::observability::Logger;

/// Local tier in front of an optional remote tier.
pub struct TieredCache {
    local: LocalCache,
    remote: Option<Box<dyn CacheService>>,
    log: Logger,
}

impl TieredCache {
    pub fn new(local: LocalCache, remote: Option<Box<dyn CacheService>>, log: Logger) -> Self {
        Self { local, remote, log }
    }

    /// Get the in-process tier.
    pub fn local(&self) -> &LocalCache {
        &self.local
    }
}

#[async_trait]
impl CacheService for TieredCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        if let Some(value) = self.local.get(key).await? {
            return Ok(Some(value));
        }
        let Some(remote) = &self.remote else {
            return Ok(None);
        };

        let value = match remote.get(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(parent: self.log.span(), key, error = %e, "Remote cache read failed");
                return Ok(None);
            }
        };

        if let Some(value) = &value {
            // No TTL is known for values read back from the remote tier.
            if let Err(e) = self.local.set(key, value, None).await {
                tracing::debug!(parent: self.log.span(), key, error = %e, "Local cache populate failed");
            }
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), CacheError> {
        match &self.remote {
            Some(remote) => {
                let (local, remote) =
                    tokio::join!(self.local.set(key, value, ttl_secs), remote.set(key, value, ttl_secs));
                combine([local, remote])
            }
            None => self.local.set(key, value, ttl_secs).await,
        }
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        match &self.remote {
            Some(remote) => {
                let (local, remote) = tokio::join!(self.local.del(key), remote.del(key));
                combine([local, remote])
            }
            None => self.local.del(key).await,
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        if self.local.exists(key).await? {
            return Ok(true);
        }
        match &self.remote {
            Some(remote) => Ok(remote.exists(key).await.unwrap_or_else(|e| {
                tracing::warn!(parent: self.log.span(), key, error = %e, "Remote cache exists failed");
                false
            })),
            None => Ok(false),
        }
    }

    async fn close(&self) -> Result<(), CacheError> {
        let local = self.local.close().await;
        let remote = match &self.remote {
            Some(remote) => remote.close().await,
            None => Ok(()),
        };
        combine([local, remote])
    }

    fn kind(&self) -> &'static str {
        "tiered"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SWEEP: Duration = Duration::from_secs(60);

    struct FailingCache;

    #[async_trait]
    impl CacheService for FailingCache {
        async fn get(&self, _: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Server("down".into()))
        }
        async fn set(&self, _: &str, _: &str, _: Option<u64>) -> Result<(), CacheError> {
            Err(CacheError::Server("down".into()))
        }
        async fn del(&self, _: &str) -> Result<(), CacheError> {
            Err(CacheError::Server("down".into()))
        }
        async fn exists(&self, _: &str) -> Result<bool, CacheError> {
            Err(CacheError::Server("down".into()))
        }
        async fn close(&self) -> Result<(), CacheError> {
            Err(CacheError::Server("down".into()))
        }
        fn kind(&self) -> &'static str {
            "failing"
        }
    }

    fn tiered(remote: Option<Box<dyn CacheService>>) -> TieredCache {
        TieredCache::new(LocalCache::new(SWEEP), remote, Logger::none())
    }

    #[tokio::test]
    async fn remote_hit_populates_local() {
        let remote = LocalCache::new(SWEEP);
        remote.set("wf", "owner", None).await.unwrap();
        let cache = tiered(Some(Box::new(remote)));

        assert!(cache.local().is_empty());
        assert_eq!(cache.get("wf").await.unwrap().as_deref(), Some("owner"));
        assert_eq!(cache.local().get("wf").await.unwrap().as_deref(), Some("owner"));
    }

    #[tokio::test]
    async fn local_tier_wins() {
        let remote = LocalCache::new(SWEEP);
        remote.set("k", "remote", None).await.unwrap();
        let cache = tiered(Some(Box::new(remote)));
        cache.local().set("k", "local", None).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("local"));
    }

    #[tokio::test]
    async fn remote_read_failure_is_a_miss() {
        let cache = tiered(Some(Box::new(FailingCache)));
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(!cache.exists("k").await.unwrap());

        cache.local().set("k", "v", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(cache.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn write_through_surfaces_remote_failure() {
        let cache = tiered(Some(Box::new(FailingCache)));
        assert!(matches!(cache.set("k", "v", Some(5)).await, Err(CacheError::Server(_))));
        // The local write still happened.
        assert_eq!(cache.local().get("k").await.unwrap().as_deref(), Some("v"));

        assert!(cache.del("k").await.is_err());
        assert!(cache.local().is_empty());
    }

    #[tokio::test]
    async fn write_through_reaches_both_tiers() {
        let cache = tiered(Some(Box::new(LocalCache::new(SWEEP))));
        cache.set("k", "v", None).await.unwrap();
        cache.local().clear();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        cache.del("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn local_only_without_remote() {
        let cache = tiered(None);
        cache.set("k", "v", None).await.unwrap();
        assert!(cache.exists("k").await.unwrap());
        cache.del("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_reports_remote_failure() {
        let cache = tiered(Some(Box::new(FailingCache)));
        assert!(matches!(cache.close().await, Err(CacheError::Server(_))));
        assert!(cache.local().is_empty());
    }
}
