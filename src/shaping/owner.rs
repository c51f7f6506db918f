//! Workflow owner lookup for the workflow-run counter.
//!
//! Runs off the forward path: `observe` spawns a detached task and returns.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::cache::{CacheError, CacheService};
use crate::observability::{metrics, Logger};

const UNKNOWN_OWNER: &str = "unknown";

#[derive(Debug, Error)]
pub enum OwnerLookupError {
    #[error("owner cache read failed: {0}")]
    Cache(#[from] CacheError),

    #[error("owner record for '{workflow_id}' is not valid JSON: {source}")]
    Decode {
        workflow_id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Owner record stored under `<namespace>:<workflowId>`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkflowOwner {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

pub struct OwnerLookup {
    cache: Arc<dyn CacheService>,
    namespace: String,
    log: Logger,
}

impl OwnerLookup {
    pub fn new(cache: Arc<dyn CacheService>, namespace: &str, log: Logger) -> Self {
        Self {
            cache,
            namespace: namespace.to_string(),
            log,
        }
    }

    /// Cache key holding the owner record for a workflow.
    pub fn key(&self, workflow_id: &str) -> String {
        format!("{}:{}", self.namespace, workflow_id)
    }

    /// Read and decode the owner record, `None` when not cached.
    pub async fn resolve(&self, workflow_id: &str) -> Result<Option<WorkflowOwner>, OwnerLookupError> {
        let Some(raw) = self.cache.get(&self.key(workflow_id)).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| OwnerLookupError::Decode {
                workflow_id: workflow_id.to_string(),
                source,
            })
    }

    /// Resolve and count one workflow run in the background.
    ///
    /// Outside a Tokio runtime the run is counted against an unknown owner
    /// without a lookup.
    pub fn observe(self: &Arc<Self>, workflow_id: &str) {
        let workflow_id = workflow_id.to_string();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            metrics::record_workflow_run(&workflow_id, UNKNOWN_OWNER, UNKNOWN_OWNER);
            return;
        };

        let lookup = Arc::clone(self);
        runtime.spawn(async move { lookup.record(&workflow_id).await });
    }

    async fn record(&self, workflow_id: &str) {
        match self.resolve(workflow_id).await {
            Ok(Some(owner)) => {
                let name = owner.name.as_deref().unwrap_or(UNKNOWN_OWNER);
                tracing::info!(
                    parent: self.log.span(),
                    workflow_id,
                    owner_id = %owner.id,
                    owner_name = name,
                    "Workflow run"
                );
                metrics::record_workflow_run(workflow_id, &owner.id, name);
            }
            Ok(None) => {
                tracing::debug!(parent: self.log.span(), workflow_id, "Workflow owner not cached");
                metrics::record_workflow_run(workflow_id, UNKNOWN_OWNER, UNKNOWN_OWNER);
            }
            Err(e) => {
                tracing::warn!(parent: self.log.span(), workflow_id, error = %e, "Workflow owner lookup failed");
                metrics::record_workflow_run(workflow_id, UNKNOWN_OWNER, UNKNOWN_OWNER);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LocalCache;
    use std::time::Duration;

    fn lookup() -> (Arc<LocalCache>, OwnerLookup) {
        let cache = Arc::new(LocalCache::new(Duration::from_secs(60)));
        let lookup = OwnerLookup::new(cache.clone(), "n8n:cache:workflow-project", Logger::none());
        (cache, lookup)
    }

    #[tokio::test]
    async fn resolves_cached_owner() {
        let (cache, lookup) = lookup();
        cache
            .set(
                "n8n:cache:workflow-project:wf_1",
                r#"{"id":"proj-1","name":"Ada Lovelace <ada@example.com>","type":"personal"}"#,
                None,
            )
            .await
            .unwrap();

        let owner = lookup.resolve("wf_1").await.unwrap().unwrap();
        assert_eq!(owner.id, "proj-1");
        assert_eq!(owner.name.as_deref(), Some("Ada Lovelace <ada@example.com>"));
    }

    #[tokio::test]
    async fn missing_and_malformed_records() {
        let (cache, lookup) = lookup();
        assert_eq!(lookup.resolve("nope").await.unwrap(), None);

        cache.set(&lookup.key("bad"), "not json", None).await.unwrap();
        assert!(matches!(
            lookup.resolve("bad").await,
            Err(OwnerLookupError::Decode { .. })
        ));
    }

    #[test]
    fn observe_outside_runtime_does_not_panic() {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let cache: Arc<dyn CacheService> = runtime.block_on(async { Arc::new(LocalCache::new(Duration::from_secs(60))) });
        let lookup = Arc::new(OwnerLookup::new(cache, "ns", Logger::none()));
        lookup.observe("wf");
    }
}
