//! Structured logging.
//!
//! # Responsibilities
//! - Install the process subscriber once at startup
//! - Hand out `Logger` handles that components log through
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - Log level configurable via config and environment (`RUST_LOG` wins)

use thiserror::Error;
use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("failed to install subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}

/// Install the global subscriber according to `config`.
pub fn init(config: &ObservabilityConfig) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!(
            "priority_proxy={level},load_client={level},tower_http=info",
            level = config.log_level
        ))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    if config.log_pretty {
        registry.with(tracing_subscriber::fmt::layer().pretty()).try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .try_init()?;
    }
    Ok(())
}

/// Logging handle passed into components by their constructors.
///
/// Wraps a component span; events are emitted with it as explicit parent so
/// every line carries the component name.
#[derive(Debug, Clone)]
pub struct Logger {
    span: Span,
}

impl Logger {
    /// Root handle for a component.
    pub fn new(component: &'static str) -> Self {
        Self {
            span: tracing::info_span!("component", name = component),
        }
    }

    /// Handle that records nothing (tests, tools).
    pub fn none() -> Self {
        Self { span: Span::none() }
    }

    /// Nested handle for a sub-component.
    pub fn child(&self, component: &'static str) -> Self {
        Self {
            span: tracing::info_span!(parent: &self.span, "component", name = component),
        }
    }

    /// Handle for one client connection, tagged with its id and peer.
    pub fn connection(&self, id: impl std::fmt::Display, peer: std::net::SocketAddr) -> Self {
        Self {
            span: tracing::info_span!(parent: &self.span, "connection", id = %id, peer = %peer),
        }
    }

    /// Get the component span.
    pub fn span(&self) -> &Span {
        &self.span
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_logger_has_no_span() {
        let log = Logger::none();
        assert!(log.span().is_none());
        assert!(log.child("pipeline").span().is_disabled());
    }
}
