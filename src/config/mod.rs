//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! optional config file (TOML)
//!     → loader.rs (parse & deserialize, then environment overrides)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → sections handed to each subsystem at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults so an empty environment is a valid config
//! - Validation separates syntactic (serde / env parsing) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::{
    BackendConfig, CacheConfig, CacheKind, DumpConfig, ListenerConfig, ObservabilityConfig,
    ProxyConfig, ShapingConfig,
};
