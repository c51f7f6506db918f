//! Per-connection accumulator for partial reads.
//!
//! Uses `bytes::BytesMut` so a completed frame is split off without copying.

use bytes::BytesMut;

use super::frame::Frame;
use super::{ProtocolError, TERMINATOR};

const INITIAL_CAPACITY: usize = 16 * 1024;

/// Buffers client bytes until the accumulated data ends with CRLF.
///
/// Owned by exactly one connection. When a chunk leaves the buffer ending in
/// the terminator, the whole buffer becomes one [`Frame`] and the buffer is
/// reset; otherwise nothing is emitted.
#[derive(Debug)]
pub struct StreamReassembler {
    buffer: BytesMut,
    /// 0 disables the limit.
    max_frame_bytes: usize,
}

impl StreamReassembler {
    /// Reassembler without a frame size limit.
    pub fn new() -> Self {
        Self::with_max_frame_bytes(0)
    }

    /// Reassembler that rejects frames larger than `max_frame_bytes`
    /// (0 = unbounded).
    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            max_frame_bytes,
        }
    }

    /// Append a chunk; returns a frame once the buffer ends with CRLF.
    ///
    /// On `FrameTooLarge` the buffered bytes are discarded.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Option<Frame>, ProtocolError> {
        self.buffer.extend_from_slice(chunk);

        if self.max_frame_bytes > 0 && self.buffer.len() > self.max_frame_bytes {
            let buffered = self.buffer.len();
            self.buffer.clear();
            return Err(ProtocolError::FrameTooLarge {
                buffered,
                max: self.max_frame_bytes,
            });
        }

        if !self.buffer.ends_with(TERMINATOR) {
            return Ok(None);
        }

        Frame::new(self.buffer.split().freeze()).map(Some)
    }

    /// Bytes waiting for a terminator.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for StreamReassembler {
    fn default() -> Self {
        Self::new()
    }
}
