// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pipe In execution: bundling connected inputs into an envelope.

use crate::envelope::Envelope;
use crate::node::{NodeInputs, PIPE_NAME_INPUT};
use serde_json::Value;

/// Sort key for slot names whose suffix is not a number
pub const MALFORMED_SLOT_INDEX: u64 = 1_000_000_000;

/// Numeric suffix of a slot name (`slot_03` -> 3).
///
/// Names without a parsable suffix get [`MALFORMED_SLOT_INDEX`].
pub fn slot_index(name: &str) -> u64 {
    name.split_once('_')
        .and_then(|(_, suffix)| suffix.parse().ok())
        .unwrap_or(MALFORMED_SLOT_INDEX)
}

/// Pack numbered slots, ordered by suffix, dropping slot identity
pub fn pack_ordinal(inputs: &NodeInputs) -> Envelope {
    let mut slots: Vec<(&String, &Value)> = inputs.iter().filter(|(_, v)| !v.is_null()).collect();
    // Stable: malformed names keep their relative order at the end
    slots.sort_by_key(|(name, _)| slot_index(name));

    Envelope::ordinal(slots.into_iter().map(|(_, v)| v.clone()).collect())
}

/// Pack arbitrarily named inputs, preserving names and declaration order.
///
/// The `pipe_name` widget is carried on the envelope instead of being
/// bundled; a blank or missing one falls back to `default_pipe_name`.
pub fn pack_named(inputs: &NodeInputs, default_pipe_name: &str) -> Envelope {
    let pipe_name = inputs
        .get(PIPE_NAME_INPUT)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(default_pipe_name)
        .to_string();

    let (names, values): (Vec<String>, Vec<Value>) = inputs
        .iter()
        .filter(|(name, value)| name.as_str() != PIPE_NAME_INPUT && !value.is_null())
        .map(|(name, value)| (name.clone(), value.clone()))
        .unzip();

    tracing::trace!(pipe_name = %pipe_name, count = values.len(), "packed named pipe");

    // unzip keeps both sides the same length
    Envelope::named(Some(pipe_name), names, values)
        .unwrap_or_else(|| Envelope::ordinal(Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeFormat;
    use serde_json::json;

    fn inputs(pairs: &[(&str, Value)]) -> NodeInputs {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_slot_index() {
        assert_eq!(slot_index("slot_03"), 3);
        assert_eq!(slot_index("in_64"), 64);
        assert_eq!(slot_index("slot_x"), MALFORMED_SLOT_INDEX);
        assert_eq!(slot_index("noseparator"), MALFORMED_SLOT_INDEX);
    }

    #[test]
    fn test_ordinal_sorts_by_suffix() {
        let packed = pack_ordinal(&inputs(&[
            ("slot_03", json!(30)),
            ("slot_01", json!(10)),
            ("slot_99", json!(990)),
        ]));
        assert_eq!(packed.format, EnvelopeFormat::Ordinal);
        assert_eq!(packed.values(), &[json!(10), json!(30), json!(990)]);
    }

    #[test]
    fn test_ordinal_malformed_last_and_stable() {
        let packed = pack_ordinal(&inputs(&[
            ("slot_b", json!("b")),
            ("slot_02", json!(2)),
            ("slot_a", json!("a")),
            ("slot_01", json!(1)),
            ("slot_03", Value::Null),
        ]));
        assert_eq!(packed.values(), &[json!(1), json!(2), json!("b"), json!("a")]);
    }

    #[test]
    fn test_named_keeps_order_and_names() {
        let packed = pack_named(
            &inputs(&[
                ("pipe_name", json!("X")),
                ("foo", json!(1)),
                ("skipped", Value::Null),
                ("bar", json!(2)),
            ]),
            "Pipe Principal",
        );
        assert_eq!(packed.pipe_name.as_deref(), Some("X"));
        assert_eq!(packed.names(), &["foo".to_string(), "bar".to_string()]);
        assert_eq!(packed.values(), &[json!(1), json!(2)]);
    }

    #[test]
    fn test_named_blank_pipe_name_uses_default() {
        let packed = pack_named(&inputs(&[("pipe_name", json!("   "))]), "Pipe Principal");
        assert_eq!(packed.pipe_name.as_deref(), Some("Pipe Principal"));
        assert!(packed.is_empty());

        let packed = pack_named(&NodeInputs::new(), "Main");
        assert_eq!(packed.pipe_name.as_deref(), Some("Main"));
    }
}
