//! Correlated payload detection over a segmented frame.

use serde_json::{Map, Number, Value};

use crate::protocol::{Payload, Segment};

/// Segment whose JSON object names a workflow.
#[derive(Debug, Clone)]
pub struct DataCandidate {
    pub segment: Segment,
    pub workflow_id: String,
}

/// Segment whose JSON object carries a numeric priority.
#[derive(Debug, Clone)]
pub struct OptionsCandidate {
    pub segment: Segment,
    pub fields: Map<String, Value>,
    pub priority: Number,
}

impl OptionsCandidate {
    fn matches(&self, value: i64) -> bool {
        match self.priority.as_i64() {
            Some(priority) => priority == value,
            None => self.priority.as_f64() == Some(value as f64),
        }
    }
}

/// Bare integer segment equal to the options priority.
#[derive(Debug, Clone)]
pub struct PriorityCandidate {
    pub segment: Segment,
    pub value: i64,
}

/// Detector output; any subset of the candidates may be present.
#[derive(Debug, Clone, Default)]
pub struct CorrelatedTriple {
    pub data: Option<DataCandidate>,
    pub options: Option<OptionsCandidate>,
    pub priority: Option<PriorityCandidate>,
}

impl CorrelatedTriple {
    /// Number of candidates found (0 to 3).
    pub fn found_count(&self) -> usize {
        usize::from(self.data.is_some())
            + usize::from(self.options.is_some())
            + usize::from(self.priority.is_some())
    }

    /// `Some` only when all three candidates were found.
    pub fn into_complete(self) -> Option<CompleteTriple> {
        Some(CompleteTriple {
            data: self.data?,
            options: self.options?,
            priority: self.priority?,
        })
    }
}

/// A triple that is safe to rewrite.
#[derive(Debug, Clone)]
pub struct CompleteTriple {
    pub data: DataCandidate,
    pub options: OptionsCandidate,
    pub priority: PriorityCandidate,
}

/// Finds the data, options and priority segments of a targeted command.
#[derive(Debug, Clone)]
pub struct Detector {
    marker: Vec<u8>,
    workflow_field: String,
    priority_field: String,
}

impl Detector {
    pub fn new(command_marker: &str, workflow_field: &str, priority_field: &str) -> Self {
        Self {
            marker: command_marker.to_ascii_lowercase().into_bytes(),
            workflow_field: workflow_field.to_string(),
            priority_field: priority_field.to_string(),
        }
    }

    /// Cheap check: does any segment begin with the command marker?
    pub fn is_targeted(&self, segments: &[Segment]) -> bool {
        segments.iter().any(|s| s.starts_with_ignore_case(&self.marker))
    }

    /// Fast-path check, then [`correlate`](Self::correlate) on targeted frames.
    pub fn detect(&self, segments: &[Segment]) -> CorrelatedTriple {
        if !self.is_targeted(segments) {
            return CorrelatedTriple::default();
        }
        self.correlate(segments)
    }

    /// Scan the whole frame once and correlate candidates.
    ///
    /// Does not check the command marker; callers run [`is_targeted`](Self::is_targeted) first.
    /// Data objects are first-match-wins. Options objects are last-match-wins,
    /// and a bare integer only counts when it follows an options candidate
    /// with the same priority (last match wins there too).
    pub fn correlate(&self, segments: &[Segment]) -> CorrelatedTriple {
        let mut triple = CorrelatedTriple::default();
        for segment in segments {
            match segment.parse() {
                Payload::JsonObject(fields) => {
                    if triple.data.is_none() {
                        if let Some(workflow_id) = fields.get(&self.workflow_field).and_then(truthy_id) {
                            triple.data = Some(DataCandidate {
                                segment: segment.clone(),
                                workflow_id,
                            });
                        }
                    }
                    if let Some(Value::Number(priority)) = fields.get(&self.priority_field) {
                        let priority = priority.clone();
                        triple.options = Some(OptionsCandidate {
                            segment: segment.clone(),
                            fields,
                            priority,
                        });
                    }
                }
                Payload::Integer(value) => {
                    if triple.options.as_ref().is_some_and(|options| options.matches(value)) {
                        triple.priority = Some(PriorityCandidate {
                            segment: segment.clone(),
                            value,
                        });
                    }
                }
                Payload::Unparsed(_) => {}
            }
        }

        triple
    }
}

/// Workflow identifier as text, or `None` for empty/falsy values.
fn truthy_id(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}
