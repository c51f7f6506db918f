//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Metrics endpoint → Cache → Pipeline → Dump → Bind listener → Accept
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections → Close cache → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: observability first, listeners last
//! - Ordered shutdown: stop accept, drain, close
//! - Drain has a timeout; stragglers are force-closed

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
