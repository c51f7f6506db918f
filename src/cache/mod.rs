//! Metadata cache subsystem.
//!
//! # Data Flow
//! ```text
//! owner lookup (detached task, off the forward path)
//!     → CacheService::get("<namespace>:<workflowId>")
//!         → tiered.rs: local hit? return
//!                      remote hit? populate local (best effort), return
//!         → local.rs  (DashMap + expiry sweep task)
//!         → remote.rs (lazy RESP connection to the backend host)
//! ```
//!
//! # Design Decisions
//! - Values are opaque strings; TTLs are whole seconds (0 = no expiry)
//! - Remote read failures degrade to a miss in the tiered cache
//! - Write-through fails if either tier fails
//! - Nothing here may be awaited by the forwarding path

pub mod local;
pub mod remote;
pub mod resp;
pub mod tiered;

pub use local::{CacheEntry, LocalCache};
pub use remote::{RemoteCache, RemoteConfig};
pub use tiered::TieredCache;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{BackendConfig, CacheConfig, CacheKind};
use crate::observability::Logger;
use resp::{RespError, RespValue};

/// Errors raised by cache tiers.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("remote cache connection to {address} failed: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("remote cache connection to {0} timed out")]
    ConnectTimeout(String),

    #[error("remote cache command {0} timed out")]
    Timeout(String),

    #[error("remote cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("remote cache protocol error: {0}")]
    Resp(#[from] RespError),

    #[error("remote cache replied with error: {0}")]
    Server(String),

    #[error("unexpected reply to {command}: {reply:?}")]
    UnexpectedReply { command: &'static str, reply: RespValue },

    #[error("cached value for '{0}' is not valid UTF-8")]
    InvalidUtf8(String),

    #[error("{} cache tier operations failed: {}", .0.len(), join_errors(.0))]
    Multiple(Vec<CacheError>),
}

fn join_errors(errors: &[CacheError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Key/value store with optional expiry shared by every tier.
#[async_trait]
pub trait CacheService: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value`; `ttl_secs` of `None` or `Some(0)` never expires.
    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), CacheError>;

    async fn del(&self, key: &str) -> Result<(), CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Release background tasks and connections.
    async fn close(&self) -> Result<(), CacheError>;

    /// Label used in metrics and logs.
    fn kind(&self) -> &'static str;
}

/// Fold per-tier results into one, keeping every failure.
pub(crate) fn combine(results: impl IntoIterator<Item = Result<(), CacheError>>) -> Result<(), CacheError> {
    let mut errors: Vec<CacheError> = results.into_iter().filter_map(Result::err).collect();
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(CacheError::Multiple(errors)),
    }
}

/// Build the configured cache. Remote tiers connect lazily, so this never
/// touches the network. Must run inside a Tokio runtime (local sweep task).
pub fn build(config: &CacheConfig, backend: &BackendConfig, log: &Logger) -> Arc<dyn CacheService> {
    let remote = || RemoteCache::new(RemoteConfig::from(backend));

    let cache: Arc<dyn CacheService> = match config.kind {
        CacheKind::Local => Arc::new(LocalCache::new(config.sweep_interval())),
        CacheKind::Remote => Arc::new(remote()),
        CacheKind::Tiered => Arc::new(TieredCache::new(
            LocalCache::new(config.sweep_interval()),
            Some(Box::new(remote())),
            log.child("tiered-cache"),
        )),
    };

    tracing::info!(
        parent: log.span(),
        cache_type = config.kind.as_str(),
        backend = %backend.address(),
        "Cache initialized"
    );
    cache
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_keeps_all_failures() {
        assert!(combine([Ok(()), Ok(())]).is_ok());
        assert!(matches!(
            combine([Ok(()), Err(CacheError::Server("boom".into()))]),
            Err(CacheError::Server(_))
        ));

        let err = combine([
            Err(CacheError::Server("a".into())),
            Err(CacheError::ConnectTimeout("b".into())),
        ])
        .unwrap_err();
        assert!(matches!(&err, CacheError::Multiple(errors) if errors.len() == 2));
        assert!(err.to_string().starts_with("2 cache tier operations failed"));
    }

    #[tokio::test]
    async fn factory_builds_each_kind() {
        let backend = BackendConfig::default();
        for (kind, label) in [
            (CacheKind::Local, "local"),
            (CacheKind::Remote, "remote"),
            (CacheKind::Tiered, "tiered"),
        ] {
            let config = CacheConfig { kind, ..CacheConfig::default() };
            let cache = build(&config, &backend, &Logger::none());
            assert_eq!(cache.kind(), label);
            cache.close().await.unwrap();
        }
    }
}
