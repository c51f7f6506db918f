//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize all subsystems in dependency order
//! - Start background tasks (metrics endpoint, frame dump)
//! - Bind the proxy listener and begin accepting traffic
//! - Tear everything down in reverse on shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinError;

use super::{signals, Shutdown};
use crate::cache::{self, CacheService};
use crate::config::ProxyConfig;
use crate::net::{Listener, ListenerError};
use crate::observability::{metrics, Logger};
use crate::proxy::{FrameDump, ProxyError, ProxyServer};
use crate::shaping::{FramePipeline, OwnerLookup};

/// Time background writers get to flush after the proxy stops.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to install metrics recorder: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("failed to bind metrics endpoint {address}: {source}")]
    MetricsBind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open frame dump files: {0}")]
    Dump(#[source] std::io::Error),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error("proxy task failed: {0}")]
    Task(#[from] JoinError),
}

/// Run the proxy until SIGINT/SIGTERM, then shut down in order.
pub async fn run(config: ProxyConfig) -> Result<(), StartupError> {
    let log = Logger::new("priority-proxy");
    let shutdown = Shutdown::new();

    let metrics_task = if config.observability.metrics_enabled {
        let handle = metrics::init_metrics()?;
        let address = config.observability.metrics_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| StartupError::MetricsBind { address, source })?;
        Some(tokio::spawn(metrics::serve(listener, handle, shutdown.subscribe())))
    } else {
        tracing::info!(parent: log.span(), "Metrics endpoint disabled");
        None
    };

    let cache = cache::build(&config.cache, &config.backend, &log.child("cache"));
    let owner = config.shaping.owner_lookup_enabled.then(|| {
        Arc::new(OwnerLookup::new(
            Arc::clone(&cache),
            &config.shaping.owner_namespace,
            log.child("owner-lookup"),
        ))
    });
    let pipeline = Arc::new(FramePipeline::new(&config.shaping, owner, log.child("pipeline")));

    let (dump, dump_task) = if config.dump.enabled {
        let (dump, task) = FrameDump::spawn(&config.dump, log.child("dump"))
            .await
            .map_err(StartupError::Dump)?;
        (Some(dump), Some(task))
    } else {
        (None, None)
    };

    let listener = Listener::bind(&config.listener).await?;
    let server = ProxyServer::new(&config, pipeline, dump, log.child("proxy"));
    tracing::info!(
        parent: log.span(),
        listen = %config.listener.bind_address(),
        backend = %config.backend.address(),
        cache_type = config.cache.kind.as_str(),
        priority_offset = config.shaping.priority_offset,
        "Proxy started; authentication is forwarded from client to backend"
    );

    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));
    let served = tokio::select! {
        joined = &mut server_task => joined,
        signal = signals::wait_for_termination() => {
            tracing::info!(parent: log.span(), signal, "Shutdown signal received");
            shutdown.trigger();
            server_task.await
        }
    };
    // Stop the metrics endpoint even when the proxy ended on its own.
    shutdown.trigger();

    if let Some(task) = metrics_task {
        match task.await {
            Ok(Err(e)) => tracing::warn!(parent: log.span(), error = %e, "Metrics server failed"),
            Err(e) => tracing::warn!(parent: log.span(), error = %e, "Metrics task failed"),
            Ok(Ok(())) => {}
        }
    }
    if let Some(task) = dump_task {
        if tokio::time::timeout(FLUSH_TIMEOUT, task).await.is_err() {
            tracing::warn!(parent: log.span(), "Frame dump did not flush before timeout");
        }
    }
    if let Err(e) = cache.close().await {
        tracing::warn!(parent: log.span(), error = %e, "Cache close failed");
    }

    served??;
    tracing::info!(parent: log.span(), "Shutdown complete");
    Ok(())
}
