//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::config::schema::{CacheKind, ProxyConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Env { key: &'static str, value: String, reason: String },
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Env { key, value, reason } => {
                write!(f, "Invalid value '{}' for {}: {}", value, key, reason)
            }
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

pub const PROXY_HOST: &str = "PROXY_HOST";
pub const PROXY_PORT: &str = "PROXY_PORT";
pub const MAX_CONNECTIONS: &str = "MAX_CONNECTIONS";
pub const IDLE_PROBE_TIMEOUT_MS: &str = "IDLE_PROBE_TIMEOUT_MS";
pub const DRAIN_TIMEOUT_MS: &str = "DRAIN_TIMEOUT_MS";
pub const REDIS_HOST: &str = "REDIS_HOST";
pub const REDIS_PORT: &str = "REDIS_PORT";
pub const REDIS_PASSWORD: &str = "REDIS_PASSWORD";
pub const REDIS_DB: &str = "REDIS_DB";
pub const DUMP_DATA: &str = "DUMP_DATA";
pub const METRICS_PORT: &str = "METRICS_PORT";
pub const METRICS_DISABLED: &str = "METRICS_DISABLED";
pub const CACHE_TYPE: &str = "CACHE_TYPE";
pub const LOCAL_CACHE_SWEEP_MS: &str = "LOCAL_CACHE_SWEEP_MS";
pub const LOG_LEVEL: &str = "LOG_LEVEL";
pub const LOG_PRETTY: &str = "LOG_PRETTY";
pub const PRIORITY_OFFSET: &str = "PRIORITY_OFFSET";
pub const MAX_FRAME_BYTES: &str = "MAX_FRAME_BYTES";
pub const OWNER_NAMESPACE: &str = "OWNER_NAMESPACE";

/// Load the optional TOML file, apply process environment overrides and
/// validate the result.
pub fn load_config(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
            toml::from_str(&content).map_err(ConfigError::Parse)?
        }
        None => ProxyConfig::default(),
    };

    apply_env(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Override `config` fields from an environment-style lookup.
///
/// Empty values are treated as unset.
pub fn apply_env<F>(config: &mut ProxyConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get(PROXY_HOST) { config.listener.host = v; }
    if let Some(v) = get(PROXY_PORT) { config.listener.port = parse(PROXY_PORT, &v)?; }
    if let Some(v) = get(MAX_CONNECTIONS) { config.listener.max_connections = parse(MAX_CONNECTIONS, &v)?; }
    if let Some(v) = get(IDLE_PROBE_TIMEOUT_MS) { config.listener.idle_probe_timeout_ms = parse(IDLE_PROBE_TIMEOUT_MS, &v)?; }
    if let Some(v) = get(DRAIN_TIMEOUT_MS) { config.listener.drain_timeout_ms = parse(DRAIN_TIMEOUT_MS, &v)?; }

    if let Some(v) = get(REDIS_HOST) { config.backend.host = v; }
    if let Some(v) = get(REDIS_PORT) { config.backend.port = parse(REDIS_PORT, &v)?; }
    if let Some(v) = get(REDIS_PASSWORD) { config.backend.password = Some(v); }
    if let Some(v) = get(REDIS_DB) { config.backend.db = Some(parse(REDIS_DB, &v)?); }

    if let Some(v) = get(DUMP_DATA) { config.dump.enabled = parse_flag(&v); }

    if let Some(v) = get(METRICS_PORT) { config.observability.metrics_port = parse(METRICS_PORT, &v)?; }
    if let Some(v) = get(METRICS_DISABLED) { config.observability.metrics_enabled = !parse_flag(&v); }
    if let Some(v) = get(LOG_LEVEL) { config.observability.log_level = v.to_ascii_lowercase(); }
    if let Some(v) = get(LOG_PRETTY) { config.observability.log_pretty = parse_flag(&v); }

    if let Some(v) = get(CACHE_TYPE) { config.cache.kind = parse::<CacheKind>(CACHE_TYPE, &v)?; }
    if let Some(v) = get(LOCAL_CACHE_SWEEP_MS) { config.cache.sweep_interval_ms = parse(LOCAL_CACHE_SWEEP_MS, &v)?; }

    if let Some(v) = get(PRIORITY_OFFSET) { config.shaping.priority_offset = parse(PRIORITY_OFFSET, &v)?; }
    if let Some(v) = get(MAX_FRAME_BYTES) { config.shaping.max_frame_bytes = parse(MAX_FRAME_BYTES, &v)?; }
    if let Some(v) = get(OWNER_NAMESPACE) { config.shaping.owner_namespace = v; }

    Ok(())
}

fn parse<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_flag(value: &str) -> bool {
    let value = value.trim();
    value.eq_ignore_ascii_case("true") || value == "1"
}
