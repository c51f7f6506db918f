//! Client byte-stream framing.
//!
//! # Data Flow
//! ```text
//! client socket chunks
//!     → reassembler.rs (accumulate until the buffer ends with CRLF)
//!     → Frame (one complete client command, always CRLF-terminated)
//!     → frame.rs segment() (split on CRLF into indexed Segments)
//!     → shaping pipeline inspects / mutates Segments
//!     → frame.rs join() (re-insert CRLF after every segment)
//!     → backend socket
//! ```
//!
//! # Design Decisions
//! - Commands are handled in their newline-delimited form; bulk length
//!   headers (`$N`) are ordinary segments and are never recomputed
//! - Segments slice the frame's `Bytes` and are immutable; a rewrite builds
//!   a new payload region instead of editing the frame in place
//! - `join(segment(frame)) == frame` for every frame

pub mod frame;
pub mod reassembler;
pub mod segment;

pub use frame::{join, segment, Frame};
pub use reassembler::StreamReassembler;
pub use segment::{Payload, Segment};

use thiserror::Error;

/// Line terminator of the wire protocol.
pub const TERMINATOR: &[u8; 2] = b"\r\n";

/// Errors raised while framing client bytes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The accumulated buffer grew past the configured frame limit.
    #[error("frame exceeds {max} bytes (buffered {buffered})")]
    FrameTooLarge { buffered: usize, max: usize },

    /// Bytes handed to `Frame::new` do not end with the terminator.
    #[error("frame is not CRLF-terminated")]
    Unterminated,
}
