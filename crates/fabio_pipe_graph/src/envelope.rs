// SPDX-License-Identifier: MIT OR Apache-2.0
//! The pipe value: an ordered bundle of (optionally named) values.
//!
//! An envelope is created by a Pipe In node at execution time and consumed
//! by a Pipe Out node. It travels through the host as a single JSON object
//! carrying a marker key, so a Pipe Out can tell a genuine envelope apart
//! from an arbitrary value routed onto the pipe socket.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key holding the marker in the JSON form of an envelope
pub const ENVELOPE_MARKER_KEY: &str = "__fabio_pipe__";

/// Marker value; bumped if the envelope layout ever changes incompatibly
pub const ENVELOPE_MARKER: &str = "fabio.dynamic_pipe.v1";

/// Packing discipline the envelope was produced with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeFormat {
    /// Numbered slots, slot identity dropped (static generation)
    Ordinal,
    /// Socket names preserved, optional pipe name (dynamic generation)
    Named,
}

/// A pipe value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "__fabio_pipe__")]
    marker: String,
    /// Packing discipline
    pub format: EnvelopeFormat,
    /// Virtual wiring key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipe_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    names: Vec<String>,
    #[serde(default)]
    values: Vec<Value>,
}

impl Envelope {
    /// Create an ordinal envelope (no names, no pipe name)
    pub fn ordinal(values: Vec<Value>) -> Self {
        Self {
            marker: ENVELOPE_MARKER.to_string(),
            format: EnvelopeFormat::Ordinal,
            pipe_name: None,
            names: Vec::new(),
            values,
        }
    }

    /// Create a named envelope.
    ///
    /// Returns `None` when `names` and `values` differ in length.
    pub fn named(pipe_name: Option<String>, names: Vec<String>, values: Vec<Value>) -> Option<Self> {
        if names.len() != values.len() {
            return None;
        }
        Some(Self {
            marker: ENVELOPE_MARKER.to_string(),
            format: EnvelopeFormat::Named,
            pipe_name,
            names,
            values,
        })
    }

    /// Convert into the JSON value carried on the pipe socket
    pub fn to_value(&self) -> Value {
        // Plain strings, vectors and JSON values always serialize
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Recognize an envelope in a socket value.
    ///
    /// Anything without the marker, or with mismatched names/values, is
    /// not an envelope.
    pub fn from_value(value: &Value) -> Option<Self> {
        let marker = value.as_object()?.get(ENVELOPE_MARKER_KEY)?.as_str()?;
        if marker != ENVELOPE_MARKER {
            return None;
        }
        let envelope: Envelope = serde_json::from_value(value.clone()).ok()?;
        // Named envelopes always carry one name per value
        let needs_names = envelope.format == EnvelopeFormat::Named || !envelope.names.is_empty();
        if needs_names && envelope.names.len() != envelope.values.len() {
            return None;
        }
        Some(envelope)
    }

    /// Value names, parallel to `values()`; empty for ordinal envelopes
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Bundled values in packing order
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consume the envelope, keeping only its values
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Number of bundled values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the envelope carries no values
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by position
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Iterate over (name, value) pairs
    pub fn iter(&self) -> impl Iterator<Item = (Option<&str>, &Value)> {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| (self.names.get(i).map(String::as_str), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_named_requires_parallel_lengths() {
        assert!(Envelope::named(None, vec!["a".into()], vec![]).is_none());
        let env = Envelope::named(Some("X".into()), vec!["a".into()], vec![json!(1)]).unwrap();
        assert_eq!(env.len(), 1);
        assert_eq!(env.pipe_name.as_deref(), Some("X"));
    }

    #[test]
    fn test_json_form_carries_marker() {
        let env = Envelope::named(
            Some("X".into()),
            vec!["foo".into(), "bar".into()],
            vec![json!(1), json!(2)],
        )
        .unwrap();
        let value = env.to_value();
        assert_eq!(value[ENVELOPE_MARKER_KEY], json!(ENVELOPE_MARKER));
        assert_eq!(value["format"], json!("named"));
        assert_eq!(Envelope::from_value(&value), Some(env));
    }

    #[test]
    fn test_ordinal_omits_names() {
        let value = Envelope::ordinal(vec![json!(10), json!(30)]).to_value();
        assert!(value.get("names").is_none());
        assert!(value.get("pipe_name").is_none());

        let env = Envelope::from_value(&value).unwrap();
        assert_eq!(env.format, EnvelopeFormat::Ordinal);
        assert_eq!(env.values(), &[json!(10), json!(30)]);
    }

    #[test]
    fn test_rejects_lookalikes() {
        assert!(Envelope::from_value(&json!({"items": [1, 2]})).is_none());
        assert!(Envelope::from_value(&json!([1, 2])).is_none());
        assert!(Envelope::from_value(&json!({
            "__fabio_pipe__": "something.else",
            "format": "named",
            "values": []
        }))
        .is_none());
        assert!(Envelope::from_value(&json!({
            "__fabio_pipe__": ENVELOPE_MARKER,
            "format": "named",
            "names": ["a", "b"],
            "values": [1]
        }))
        .is_none());
        // Named without names is not a genuine envelope either
        assert!(Envelope::from_value(&json!({
            "__fabio_pipe__": ENVELOPE_MARKER,
            "format": "named",
            "pipe_name": "X",
            "values": [1, 2]
        }))
        .is_none());
    }

    #[test]
    fn test_empty_named_envelope_is_genuine() {
        let env = Envelope::named(Some("X".into()), vec![], vec![]).unwrap();
        let value = env.to_value();
        assert_eq!(Envelope::from_value(&value), Some(env));
    }

    #[test]
    fn test_iter_pairs_names() {
        let env = Envelope::named(None, vec!["a".into(), "b".into()], vec![json!(1), json!(2)]).unwrap();
        let pairs: Vec<_> = env.iter().collect();
        assert_eq!(pairs, vec![(Some("a"), &json!(1)), (Some("b"), &json!(2))]);

        let ordinal = Envelope::ordinal(vec![json!(true)]);
        assert_eq!(ordinal.iter().next(), Some((None, &json!(true))));
    }
}
