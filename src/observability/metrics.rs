//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (frames, connections, cache lookups, workflow runs)
//! - Expose Prometheus-compatible metrics endpoint and a liveness probe
//!
//! # Metrics
//! - `priority_proxy_requests_total` (counter): pipeline steps by command, status
//! - `priority_proxy_active_connections` (gauge): current client connections
//! - `priority_proxy_frame_duration_seconds` (histogram): rewrite latency
//! - `priority_proxy_cache_hits_total` / `_misses_total` (counter): by cache type
//! - `priority_proxy_backend_errors_total` (counter): by error type
//! - `priority_proxy_workflow_runs_total` (counter): by workflow and owner
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Histogram buckets tuned for sub-millisecond frame handling

use std::time::Instant;

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

const REQUESTS_TOTAL: &str = "priority_proxy_requests_total";
const ACTIVE_CONNECTIONS: &str = "priority_proxy_active_connections";
const FRAME_DURATION: &str = "priority_proxy_frame_duration_seconds";
const CACHE_HITS: &str = "priority_proxy_cache_hits_total";
const CACHE_MISSES: &str = "priority_proxy_cache_misses_total";
const BACKEND_ERRORS: &str = "priority_proxy_backend_errors_total";
const WORKFLOW_RUNS: &str = "priority_proxy_workflow_runs_total";

const DURATION_BUCKETS: &[f64] = &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0];

/// Outcome label for `priority_proxy_requests_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Started,
    Skipped,
    Completed,
    Error,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Started => "started",
            RequestStatus::Skipped => "skipped",
            RequestStatus::Completed => "completed",
            RequestStatus::Error => "error",
        }
    }
}

/// Install the Prometheus recorder as the process recorder.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(FRAME_DURATION.to_string()), DURATION_BUCKETS)?
        .install_recorder()?;
    describe();
    Ok(handle)
}

fn describe() {
    ::metrics::describe_counter!(REQUESTS_TOTAL, "Pipeline steps processed, by command and status");
    ::metrics::describe_gauge!(ACTIVE_CONNECTIONS, "Number of active proxy connections");
    ::metrics::describe_histogram!(FRAME_DURATION, "Time spent rewriting a targeted frame");
    ::metrics::describe_counter!(CACHE_HITS, "Total number of cache hits");
    ::metrics::describe_counter!(CACHE_MISSES, "Total number of cache misses");
    ::metrics::describe_counter!(BACKEND_ERRORS, "Backend and remote cache errors");
    ::metrics::describe_counter!(WORKFLOW_RUNS, "Workflow runs observed in rewritten frames");
}

pub fn record_request(command: &'static str, status: RequestStatus) {
    ::metrics::counter!(REQUESTS_TOTAL, "command" => command, "status" => status.as_str()).increment(1);
}

pub fn connection_opened() {
    ::metrics::gauge!(ACTIVE_CONNECTIONS).increment(1.0);
}

pub fn connection_closed() {
    ::metrics::gauge!(ACTIVE_CONNECTIONS).decrement(1.0);
}

pub fn record_frame_duration(start: Instant) {
    ::metrics::histogram!(FRAME_DURATION).record(start.elapsed().as_secs_f64());
}

pub fn record_cache_lookup(cache_type: &'static str, hit: bool) {
    if hit {
        ::metrics::counter!(CACHE_HITS, "cache_type" => cache_type).increment(1);
    } else {
        ::metrics::counter!(CACHE_MISSES, "cache_type" => cache_type).increment(1);
    }
}

pub fn record_backend_error(error_type: &'static str) {
    ::metrics::counter!(BACKEND_ERRORS, "error_type" => error_type).increment(1);
}

pub fn record_workflow_run(workflow_id: &str, owner_id: &str, owner_name: &str) {
    ::metrics::counter!(
        WORKFLOW_RUNS,
        "workflow_id" => workflow_id.to_string(),
        "owner_id" => owner_id.to_string(),
        "owner_name" => owner_name.to_string()
    )
    .increment(1);
}

/// Router serving `/metrics` and `/health`.
pub fn router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .route("/health", get(health))
        .with_state(handle)
        .layer(TraceLayer::new_for_http())
}

/// Serve the metrics endpoint until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    handle: PrometheusHandle,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Metrics server listening");

    axum::serve(listener, router(handle))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!("Metrics server stopped");
    Ok(())
}

async fn render_metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}
