//! Priority-shaping reverse proxy for a Redis-protocol job queue backend.
//!
//! Clients connect to the proxy as if it were the backend. Every byte is
//! relayed unchanged except job-submission `EVAL` frames, whose priority is
//! shifted by a fixed offset before forwarding.

// Core subsystems
pub mod config;
pub mod net;
pub mod protocol;
pub mod proxy;
pub mod shaping;

// Metadata cache
pub mod cache;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use lifecycle::Shutdown;
pub use proxy::ProxyServer;
pub use shaping::FramePipeline;
