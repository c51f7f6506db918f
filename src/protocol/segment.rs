//! A single CRLF-delimited span of a frame.

use bytes::{Bytes, BytesMut};
use serde_json::{Map, Value};

/// One delimited span of a frame, split around an embedded JSON object.
///
/// `prefix + payload + suffix` reproduces the original span exactly. When the
/// span holds a `{ ... }` region the payload is that region (braces
/// included); otherwise the whole span is the payload and prefix/suffix are
/// empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    index: usize,
    prefix: Bytes,
    payload: Bytes,
    suffix: Bytes,
    braced: bool,
}

/// Result of the single parse attempt made on a segment payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Neither a JSON object nor an integer.
    Unparsed(Bytes),
    /// Top-level JSON object.
    JsonObject(Map<String, Value>),
    /// Whole span is a base-10 integer.
    Integer(i64),
}

impl Segment {
    /// Build a segment from one delimited span (terminator excluded).
    pub fn from_span(index: usize, span: Bytes) -> Self {
        let open = span.iter().position(|b| *b == b'{');
        let close = span.iter().rposition(|b| *b == b'}');

        match (open, close) {
            (Some(open), Some(close)) if close > open => Self {
                index,
                prefix: span.slice(..open),
                payload: span.slice(open..=close),
                suffix: span.slice(close + 1..),
                braced: true,
            },
            _ => Self {
                index,
                prefix: Bytes::new(),
                payload: span,
                suffix: Bytes::new(),
                braced: false,
            },
        }
    }

    /// Position of this segment in its frame.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Bytes before the opening brace.
    pub fn prefix(&self) -> &Bytes {
        &self.prefix
    }

    /// The braced region, or the whole span when unbraced.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Bytes after the closing brace.
    pub fn suffix(&self) -> &Bytes {
        &self.suffix
    }

    /// Whether a `{ ... }` region was found in the span.
    pub fn is_braced(&self) -> bool {
        self.braced
    }

    /// Length of the full span.
    pub fn len(&self) -> usize {
        self.prefix.len() + self.payload.len() + self.suffix.len()
    }

    /// Check if the span is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reassemble `prefix + payload + suffix`.
    pub fn to_bytes(&self) -> Bytes {
        if self.prefix.is_empty() && self.suffix.is_empty() {
            return self.payload.clone();
        }
        let mut out = BytesMut::with_capacity(self.len());
        out.extend_from_slice(&self.prefix);
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(&self.suffix);
        out.freeze()
    }

    /// Copy of this segment with a replaced payload; index, prefix and
    /// suffix are kept.
    pub fn with_payload(&self, payload: impl Into<Bytes>) -> Self {
        Self {
            index: self.index,
            prefix: self.prefix.clone(),
            payload: payload.into(),
            suffix: self.suffix.clone(),
            braced: self.braced,
        }
    }

    /// Case-insensitive ASCII prefix test over the full span.
    pub fn starts_with_ignore_case(&self, marker: &[u8]) -> bool {
        if self.len() < marker.len() {
            return false;
        }
        self.prefix
            .iter()
            .chain(self.payload.iter())
            .chain(self.suffix.iter())
            .zip(marker)
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }

    /// Classify the payload with one parse attempt.
    ///
    /// Braced spans are tried as a JSON object; anything else is tried as an
    /// integer over the whole span. Failures yield `Payload::Unparsed`.
    pub fn parse(&self) -> Payload {
        if self.braced {
            if let Ok(object) = serde_json::from_slice::<Map<String, Value>>(&self.payload) {
                return Payload::JsonObject(object);
            }
            return Payload::Unparsed(self.payload.clone());
        }

        std::str::from_utf8(&self.payload)
            .ok()
            .and_then(|text| text.parse::<i64>().ok())
            .map_or_else(|| Payload::Unparsed(self.payload.clone()), Payload::Integer)
    }
}
