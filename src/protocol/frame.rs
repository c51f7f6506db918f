//! Complete client frames and CRLF segmentation.

use bytes::{Bytes, BytesMut};

use super::segment::Segment;
use super::{ProtocolError, TERMINATOR};

/// One complete client command, guaranteed to end with CRLF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Bytes,
}

impl Frame {
    /// Wrap bytes that already end with the terminator.
    pub fn new(bytes: Bytes) -> Result<Self, ProtocolError> {
        if !bytes.ends_with(TERMINATOR) {
            return Err(ProtocolError::Unterminated);
        }
        Ok(Self { bytes })
    }

    /// Get the raw frame bytes, terminator included.
    pub fn as_bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Consume the frame, returning its bytes.
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// Frame length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the frame has no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Split a frame on every CRLF into indexed segments.
///
/// Terminators are not kept; [`join`] puts them back.
pub fn segment(frame: &Frame) -> Vec<Segment> {
    let bytes = frame.as_bytes();
    let mut segments = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i + 1 < bytes.len() {
        if bytes[i] == TERMINATOR[0] && bytes[i + 1] == TERMINATOR[1] {
            segments.push(Segment::from_span(segments.len(), bytes.slice(start..i)));
            start = i + 2;
            i += 2;
        } else {
            i += 1;
        }
    }

    segments
}

/// Concatenate segments, appending CRLF after each one (the last included).
pub fn join(segments: &[Segment]) -> Bytes {
    let capacity = segments.iter().map(|s| s.len() + TERMINATOR.len()).sum();
    let mut out = BytesMut::with_capacity(capacity);
    for seg in segments {
        out.extend_from_slice(seg.prefix());
        out.extend_from_slice(seg.payload());
        out.extend_from_slice(seg.suffix());
        out.extend_from_slice(TERMINATOR);
    }
    out.freeze()
}
