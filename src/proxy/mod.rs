//! Transparent TCP proxy subsystem.
//!
//! # Data Flow
//! ```text
//! client ──▶ server.rs (accept loop, limits, drain on shutdown)
//!        ──▶ session.rs
//!              client → StreamReassembler → FramePipeline → dump.rs → backend
//!              backend → client (verbatim)
//! ```
//!
//! # Design Decisions
//! - One task per accepted connection; the backend is connected eagerly
//! - Frames are forwarded in order, one at a time per direction
//! - Either side closing tears down the pair

pub mod dump;
pub mod server;
pub mod session;

pub use dump::FrameDump;
pub use server::{ProxyError, ProxyServer};
pub use session::{CloseReason, Session, SessionContext, SessionError};
