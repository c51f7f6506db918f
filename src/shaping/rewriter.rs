//! Priority rewrite over a complete correlated triple.

use thiserror::Error;

use super::detector::CompleteTriple;
use crate::protocol::Segment;

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("failed to re-encode options object: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Adds a fixed offset to the detected priority.
///
/// Lower values run earlier downstream, so a positive offset deprioritizes.
#[derive(Debug, Clone)]
pub struct PriorityRewriter {
    offset: i64,
    priority_field: String,
}

impl PriorityRewriter {
    pub fn new(offset: i64, priority_field: &str) -> Self {
        Self {
            offset,
            priority_field: priority_field.to_string(),
        }
    }

    /// Get the configured priority offset.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// `max(0, old + offset)`, saturating at the integer bounds.
    pub fn next_priority(&self, old: i64) -> i64 {
        old.saturating_add(self.offset).max(0)
    }

    /// Returns the rewritten options and priority segments, indices kept.
    pub fn rewrite(&self, triple: &CompleteTriple) -> Result<Vec<Segment>, RewriteError> {
        let priority = self.next_priority(triple.priority.value);

        let mut fields = triple.options.fields.clone();
        fields.insert(self.priority_field.clone(), priority.into());
        let options = triple.options.segment.with_payload(serde_json::to_vec(&fields)?);

        let number = triple.priority.segment.with_payload(priority.to_string());

        Ok(vec![options, number])
    }
}
