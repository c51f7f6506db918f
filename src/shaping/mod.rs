//! Frame inspection and priority shaping.
//!
//! # Data Flow
//! ```text
//! Frame (from the session's StreamReassembler)
//!     → protocol::segment
//!     → detector.rs: fast-path marker scan, then one parse per segment
//!         → CorrelatedTriple { data, options, priority }
//!     → all three present?
//!         no  → forward unchanged
//!         yes → rewriter.rs: priority + offset (floored at 0)
//!               owner.rs: detached owner lookup for the workflow-run counter
//!     → substitute rewritten segments by index → protocol::join
//! ```
//!
//! # Design Decisions
//! - Untouched segments are forwarded byte-for-byte
//! - Any failure forwards the original frame; nothing here closes a connection
//! - The forward path never awaits the cache

pub mod detector;
pub mod owner;
pub mod pipeline;
pub mod rewriter;

pub use detector::{CompleteTriple, CorrelatedTriple, Detector};
pub use owner::{OwnerLookup, WorkflowOwner};
pub use pipeline::FramePipeline;
pub use rewriter::{PriorityRewriter, RewriteError};
