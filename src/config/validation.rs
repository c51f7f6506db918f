//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde and env parsing handle syntactic)
//! - Validate value ranges (ports, intervals, offsets)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::{CacheKind, ProxyConfig};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

/// Check every semantic rule, collecting all violations.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.host.trim().is_empty() {
        errors.push(ValidationError::new("listener.host", "must not be empty"));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }

    if config.backend.host.trim().is_empty() {
        errors.push(ValidationError::new("backend.host", "must not be empty"));
    }
    if config.backend.port == 0 {
        errors.push(ValidationError::new("backend.port", "must be greater than 0"));
    }
    if config.backend.connect_timeout_secs == 0 {
        errors.push(ValidationError::new("backend.connect_timeout_secs", "must be greater than 0"));
    }

    if config.shaping.command_marker.is_empty() {
        errors.push(ValidationError::new("shaping.command_marker", "must not be empty"));
    }
    if config.shaping.workflow_field.is_empty() {
        errors.push(ValidationError::new("shaping.workflow_field", "must not be empty"));
    }
    if config.shaping.priority_field.is_empty() {
        errors.push(ValidationError::new("shaping.priority_field", "must not be empty"));
    }
    if config.shaping.priority_offset <= 0 {
        errors.push(ValidationError::new(
            "shaping.priority_offset",
            format!("must be positive, got {}", config.shaping.priority_offset),
        ));
    }

    if config.cache.sweep_interval_ms == 0 {
        errors.push(ValidationError::new("cache.sweep_interval_ms", "must be greater than 0"));
    }
    if config.cache.kind != CacheKind::Local && config.backend.host.trim().is_empty() {
        errors.push(ValidationError::new(
            "cache.kind",
            format!("'{}' cache requires a backend host", config.cache.kind),
        ));
    }

    if config.dump.enabled
        && (config.dump.input_path.is_empty() || config.dump.output_path.is_empty())
    {
        errors.push(ValidationError::new("dump", "input_path and output_path are required when enabled"));
    }
    if config.dump.enabled && config.dump.queue_capacity == 0 {
        errors.push(ValidationError::new("dump.queue_capacity", "must be greater than 0"));
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }
    if config.observability.metrics_enabled && config.observability.metrics_port == 0 {
        errors.push(ValidationError::new("observability.metrics_port", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
