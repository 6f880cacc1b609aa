// SPDX-License-Identifier: MIT OR Apache-2.0
//! The flattened graph a host submits for execution.
//!
//! A prompt maps node identifiers to node records. Subgraphs are already
//! inlined, so identifiers of nested nodes look like `"12:5"` while top
//! level ones are plain numbers.

use indexmap::IndexMap;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identifier of a node in a prompt.
///
/// Hosts key nodes by string but may write producer ids inside links as
/// JSON integers. The written form is kept so a record serializes back
/// exactly as it arrived; equality and ordering only look at the text.
#[derive(Debug, Clone)]
pub struct NodeId {
    text: String,
    integer: bool,
}

impl NodeId {
    /// Create a node ID
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            text: id.into(),
            integer: false,
        }
    }

    /// The identifier text
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether the identifier was written as a JSON integer
    pub fn is_integer(&self) -> bool {
        self.integer
    }

    fn numeric(&self) -> Option<u64> {
        self.text.parse().ok()
    }
}

impl PartialEq for NodeId {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for NodeId {}

impl Hash for NodeId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

// Numeric identifiers first by value, everything else after, lexicographically
impl Ord for NodeId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.text.cmp(&other.text)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.text.cmp(&other.text),
        }
    }
}

impl PartialOrd for NodeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self {
            text: id.to_string(),
            integer: true,
        }
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.integer {
            if let Ok(n) = self.text.parse::<u64>() {
                return serializer.serialize_u64(n);
            }
            if let Ok(n) = self.text.parse::<i64>() {
                return serializer.serialize_i64(n);
            }
        }
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NodeIdVisitor;

        impl Visitor<'_> for NodeIdVisitor {
            type Value = NodeId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a node id string or integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<NodeId, E> {
                Ok(NodeId::new(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<NodeId, E> {
                Ok(NodeId::from(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<NodeId, E> {
                Ok(NodeId {
                    text: v.to_string(),
                    integer: true,
                })
            }
        }

        deserializer.deserialize_any(NodeIdVisitor)
    }
}

/// An edge reference: `[producer_node_id, producer_output_index]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link(pub NodeId, pub u32);

impl Link {
    /// Create an edge reference
    pub fn new(node: impl Into<NodeId>, output: u32) -> Self {
        Self(node.into(), output)
    }

    /// Producer node
    pub fn node(&self) -> &NodeId {
        &self.0
    }

    /// Producer output index
    pub fn output(&self) -> u32 {
        self.1
    }
}

/// A node input: either a wire or a literal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    /// Wire from another node's output
    Link(Link),
    /// Literal value (widget)
    Literal(Value),
}

impl InputValue {
    /// Literal string, if this input is one
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Literal(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Wire, if this input is one
    pub fn as_link(&self) -> Option<&Link> {
        match self {
            Self::Link(link) => Some(link),
            Self::Literal(_) => None,
        }
    }
}

/// A node record in a prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Class identifier
    pub class_type: String,
    /// Inputs by socket name
    #[serde(default)]
    pub inputs: IndexMap<String, InputValue>,
    /// Fields this plugin does not interpret (`_meta`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NodeRecord {
    /// Create a record with no inputs
    pub fn new(class_type: impl Into<String>) -> Self {
        Self {
            class_type: class_type.into(),
            inputs: IndexMap::new(),
            extra: Map::new(),
        }
    }

    /// Add an input
    pub fn with_input(mut self, name: impl Into<String>, value: InputValue) -> Self {
        self.inputs.insert(name.into(), value);
        self
    }

    /// Add a literal input
    pub fn with_literal(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_input(name, InputValue::Literal(value.into()))
    }

    /// Add a wired input
    pub fn with_link(self, name: impl Into<String>, node: impl Into<NodeId>, output: u32) -> Self {
        self.with_input(name, InputValue::Link(Link::new(node, output)))
    }

    /// Trimmed literal string input; `None` when absent, blank or wired
    pub fn literal_str(&self, name: &str) -> Option<&str> {
        self.inputs
            .get(name)
            .and_then(InputValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// A flattened node table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Prompt {
    nodes: IndexMap<NodeId, NodeRecord>,
}

impl Prompt {
    /// Create an empty prompt
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a node
    pub fn insert(&mut self, id: impl Into<NodeId>, record: NodeRecord) {
        self.nodes.insert(id.into(), record);
    }

    /// Get a node
    pub fn node(&self, id: &NodeId) -> Option<&NodeRecord> {
        self.nodes.get(id)
    }

    /// Get a mutable node
    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut NodeRecord> {
        self.nodes.get_mut(id)
    }

    /// Nodes in submission order
    pub fn nodes(&self) -> impl Iterator<Item = (&NodeId, &NodeRecord)> {
        self.nodes.iter()
    }

    /// Node IDs in numeric-then-lexicographic order
    pub fn sorted_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the prompt has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// The payload handed to before-execution hooks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// The flattened node table
    pub prompt: Prompt,
    /// Everything else the host sends along (client id, extra data, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Submission {
    /// Wrap a prompt with no extra fields
    pub fn new(prompt: Prompt) -> Self {
        Self {
            prompt,
            extra: Map::new(),
        }
    }
}
