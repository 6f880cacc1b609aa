// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pipe Out execution: projecting a pipe back onto a fixed set of outputs.

use crate::envelope::Envelope;
use serde_json::Value;

/// Key of the envelope shape used by the first static release
const LEGACY_ITEMS_KEY: &str = "items";

/// What arrived on a Pipe Out's `pipe` socket
#[derive(Debug, Clone, PartialEq)]
pub enum PipeInput {
    /// Nothing connected, or a null value
    Missing,
    /// A genuine envelope
    Envelope(Envelope),
    /// A raw sequence, consumed positionally
    Sequence(Vec<Value>),
    /// Any other value, treated as a single-element bundle
    Scalar(Value),
}

impl PipeInput {
    /// Classify a raw socket value
    pub fn classify(value: Option<&Value>) -> Self {
        let Some(value) = value else {
            return Self::Missing;
        };

        if let Some(envelope) = Envelope::from_value(value) {
            return Self::Envelope(envelope);
        }

        match value {
            Value::Null => Self::Missing,
            Value::Array(items) => Self::Sequence(items.clone()),
            Value::Object(map) => match map.get(LEGACY_ITEMS_KEY) {
                Some(Value::Array(items)) if map.len() == 1 => Self::Sequence(items.clone()),
                _ => Self::Scalar(value.clone()),
            },
            other => Self::Scalar(other.clone()),
        }
    }
}

/// How a Pipe Out reacts to a missing or malformed pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnpackPolicy {
    /// Coerce whatever arrived; nothing becomes all-empty outputs
    Lenient,
    /// Require a genuine envelope
    Strict,
}

/// Error raised by a strict Pipe Out
#[derive(Debug, thiserror::Error)]
pub enum UnpackError {
    /// No pipe reached the node
    #[error(
        "Fabio Dynamic Pipe Out did not receive a pipe for pipe_name '{pipe_name}'. \
         Make sure a Fabio Dynamic Pipe In uses exactly the same pipe_name, \
         submit the workflow again so the wiring is resolved, \
         or connect the 'pipe' input manually."
    )]
    MissingPipe {
        /// The name the node was looking for
        pipe_name: String,
    },

    /// Something other than an envelope reached the node
    #[error(
        "Fabio Dynamic Pipe Out received a value that is not a pipe for pipe_name '{pipe_name}' \
         (got {found}). Connect the output of a Fabio Dynamic Pipe In, \
         or give both nodes the same pipe_name and remove the manual connection."
    )]
    InvalidPipe {
        /// The name the node was looking for
        pipe_name: String,
        /// Short description of what arrived
        found: &'static str,
    },
}

/// Project a pipe onto exactly `max_outputs` slots.
///
/// Slot `i` holds the `i`-th bundled value, or `None` when the bundle is
/// shorter. Values beyond `max_outputs` are dropped.
pub fn unpack(
    input: PipeInput,
    max_outputs: usize,
    policy: UnpackPolicy,
    expected_pipe_name: &str,
) -> Result<Vec<Option<Value>>, UnpackError> {
    let values = match (input, policy) {
        (PipeInput::Envelope(envelope), _) => {
            if policy == UnpackPolicy::Strict {
                if let Some(actual) = envelope.pipe_name.as_deref() {
                    if !expected_pipe_name.is_empty() && actual != expected_pipe_name {
                        tracing::warn!(
                            expected = %expected_pipe_name,
                            actual = %actual,
                            "pipe wired manually from a Pipe In with a different pipe_name"
                        );
                    }
                }
            }
            envelope.into_values()
        }
        (PipeInput::Missing, UnpackPolicy::Strict) => {
            return Err(UnpackError::MissingPipe {
                pipe_name: expected_pipe_name.to_string(),
            });
        }
        (PipeInput::Sequence(_), UnpackPolicy::Strict) => {
            return Err(UnpackError::InvalidPipe {
                pipe_name: expected_pipe_name.to_string(),
                found: "a list",
            });
        }
        (PipeInput::Scalar(value), UnpackPolicy::Strict) => {
            return Err(UnpackError::InvalidPipe {
                pipe_name: expected_pipe_name.to_string(),
                found: describe(&value),
            });
        }
        (PipeInput::Missing, UnpackPolicy::Lenient) => Vec::new(),
        (PipeInput::Sequence(items), UnpackPolicy::Lenient) => items,
        (PipeInput::Scalar(value), UnpackPolicy::Lenient) => vec![value],
    };

    if values.len() > max_outputs {
        tracing::debug!(
            count = values.len(),
            max_outputs,
            "pipe carries more values than outputs, truncating"
        );
    }

    let mut outputs: Vec<Option<Value>> = values.into_iter().take(max_outputs).map(Some).collect();
    outputs.resize(max_outputs, None);
    Ok(outputs)
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
