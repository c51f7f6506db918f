//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured events under an injected component span)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (JSON lines, or pretty output for development)
//!     → Metrics endpoint (Prometheus scrape) + liveness probe
//! ```
//!
//! # Design Decisions
//! - Components receive a `Logger` through their constructor instead of
//!   reaching for an implicit global
//! - Metrics are cheap (atomic increments) and never fail the caller
//! - No log calls inside the byte-copy loops

pub mod logging;
pub mod metrics;

pub use logging::Logger;
