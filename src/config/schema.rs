//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Client-facing listener.
    pub listener: ListenerConfig,

    /// Backend server the proxy forwards to.
    pub backend: BackendConfig,

    /// Frame inspection and priority rewrite policy.
    pub shaping: ShapingConfig,

    /// Metadata cache selection.
    pub cache: CacheConfig,

    /// Raw frame dump for offline debugging.
    pub dump: DumpConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind host (e.g., "0.0.0.0").
    pub host: String,

    /// Bind port; defaults to the backend's default port.
    pub port: u16,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Close connections that send nothing within this window (0 = off).
    pub idle_probe_timeout_ms: u64,

    /// Time in-flight connections get to finish on shutdown.
    pub drain_timeout_ms: u64,
}

impl ListenerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn idle_probe_timeout(&self) -> Option<Duration> {
        (self.idle_probe_timeout_ms > 0).then(|| Duration::from_millis(self.idle_probe_timeout_ms))
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 6379,
            max_connections: 10_000,
            idle_probe_timeout_ms: 2_000,
            drain_timeout_ms: 5_000,
        }
    }
}

/// Backend server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    pub host: String,

    pub port: u16,

    /// Used only by the remote cache tier; client AUTH is passed through.
    pub password: Option<String>,

    /// Logical database for the remote cache tier.
    pub db: Option<u32>,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl BackendConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            db: None,
            connect_timeout_secs: 5,
        }
    }
}

/// Frame inspection and rewrite policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShapingConfig {
    /// Command name that triggers payload inspection (case-insensitive).
    pub command_marker: String,

    /// Field identifying the workflow in the job data object.
    pub workflow_field: String,

    /// Priority field in the job options object.
    pub priority_field: String,

    /// Added to every detected priority (lower runs earlier downstream).
    pub priority_offset: i64,

    /// Upper bound for a buffered frame (0 = unbounded).
    pub max_frame_bytes: usize,

    /// Resolve workflow owners through the cache for metrics.
    pub owner_lookup_enabled: bool,

    /// Key namespace for owner metadata (`<namespace>:<workflowId>`).
    pub owner_namespace: String,
}

impl Default for ShapingConfig {
    fn default() -> Self {
        Self {
            command_marker: "eval".to_string(),
            workflow_field: "workflowId".to_string(),
            priority_field: "priority".to_string(),
            priority_offset: 100,
            max_frame_bytes: 64 * 1024 * 1024,
            owner_lookup_enabled: true,
            owner_namespace: "n8n:cache:workflow-project".to_string(),
        }
    }
}

/// Which cache tiers back the metadata lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    Local,
    #[serde(alias = "redis")]
    Remote,
    #[default]
    Tiered,
}

impl CacheKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheKind::Local => "local",
            CacheKind::Remote => "remote",
            CacheKind::Tiered => "tiered",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(CacheKind::Local),
            "remote" | "redis" => Ok(CacheKind::Remote),
            "tiered" => Ok(CacheKind::Tiered),
            other => Err(format!("unknown cache type '{other}' (expected local, remote or tiered)")),
        }
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub kind: CacheKind,

    /// Interval of the local tier's expiry sweep in milliseconds.
    pub sweep_interval_ms: u64,
}

impl CacheConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            kind: CacheKind::Tiered,
            sweep_interval_ms: 60_000,
        }
    }
}

/// Diagnostic dump configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DumpConfig {
    pub enabled: bool,

    /// Receives hex-encoded client frames, one per line.
    pub input_path: String,

    /// Receives hex-encoded forwarded frames, one per line.
    pub output_path: String,

    /// Frame pairs buffered for the writer; further pairs are dropped while full.
    pub queue_capacity: usize,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            input_path: "inputs".to_string(),
            output_path: "outputs".to_string(),
            queue_capacity: 4096,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable output instead of JSON lines.
    pub log_pretty: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind host.
    pub metrics_host: String,

    /// Metrics endpoint bind port.
    pub metrics_port: u16,
}

impl ObservabilityConfig {
    pub fn metrics_address(&self) -> String {
        format!("{}:{}", self.metrics_host, self.metrics_port)
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_pretty: false,
            metrics_enabled: true,
            metrics_host: "0.0.0.0".to_string(),
            metrics_port: 9090,
        }
    }
}
