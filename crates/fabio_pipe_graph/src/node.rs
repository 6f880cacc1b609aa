// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node type definitions and the registration table.

use crate::pack::{pack_named, pack_ordinal};
use crate::settings::PipeSettings;
use crate::socket::{Socket, SocketType};
use crate::unpack::{unpack, PipeInput, UnpackError, UnpackPolicy};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Keyword inputs handed to a node execution, in declaration order.
///
/// Unconnected optional sockets are absent, never null.
pub type NodeInputs = IndexMap<String, Value>;

/// Name of the string widget holding the virtual wiring key
pub const PIPE_NAME_INPUT: &str = "pipe_name";

/// Name of the pipe socket on Pipe In (output) and Pipe Out (input)
pub const PIPE_SOCKET: &str = "pipe";

/// Menu category of all pipe nodes
pub const CATEGORY: &str = "Fabio/Dynamic Pipe";

/// Class identifier of the static Pipe In
pub const STATIC_PIPE_IN: &str = "Fabio Pipe In";
/// Class identifier of the static Pipe Out
pub const STATIC_PIPE_OUT: &str = "Fabio Pipe Out";
/// Class identifier of the dynamic named Pipe In
pub const DYNAMIC_PIPE_IN: &str = "FabioDynamicPipeIn";
/// Class identifier of the dynamic named Pipe Out
pub const DYNAMIC_PIPE_OUT: &str = "FabioDynamicPipeOut";

/// Which generation of the pipe a node belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Generation {
    /// Fixed numbered slots, wired by hand
    Static,
    /// Variable named slots, wired by `pipe_name`
    DynamicNamed,
}

/// The node classes this plugin provides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Static Pipe In
    StaticPipeIn,
    /// Static Pipe Out
    StaticPipeOut,
    /// Dynamic named Pipe In
    DynamicPipeIn,
    /// Dynamic named Pipe Out
    DynamicPipeOut,
}

impl NodeKind {
    /// All kinds, in registration order
    pub fn all() -> &'static [NodeKind] {
        &[
            NodeKind::StaticPipeIn,
            NodeKind::StaticPipeOut,
            NodeKind::DynamicPipeIn,
            NodeKind::DynamicPipeOut,
        ]
    }

    /// Look up a kind by its class identifier
    pub fn from_class_type(class_type: &str) -> Option<Self> {
        Self::all().iter().copied().find(|k| k.class_type() == class_type)
    }

    /// Stable class identifier
    pub fn class_type(&self) -> &'static str {
        match self {
            NodeKind::StaticPipeIn => STATIC_PIPE_IN,
            NodeKind::StaticPipeOut => STATIC_PIPE_OUT,
            NodeKind::DynamicPipeIn => DYNAMIC_PIPE_IN,
            NodeKind::DynamicPipeOut => DYNAMIC_PIPE_OUT,
        }
    }

    /// Human-readable name shown in the host's menus
    pub fn display_name(&self) -> &'static str {
        match self {
            NodeKind::StaticPipeIn => "Fabio Pipe In",
            NodeKind::StaticPipeOut => "Fabio Pipe Out",
            NodeKind::DynamicPipeIn => "Fabio Dynamic Pipe In",
            NodeKind::DynamicPipeOut => "Fabio Dynamic Pipe Out",
        }
    }

    /// Pipe generation
    pub fn generation(&self) -> Generation {
        match self {
            NodeKind::StaticPipeIn | NodeKind::StaticPipeOut => Generation::Static,
            NodeKind::DynamicPipeIn | NodeKind::DynamicPipeOut => Generation::DynamicNamed,
        }
    }

    /// Whether this kind bundles values
    pub fn is_packer(&self) -> bool {
        matches!(self, NodeKind::StaticPipeIn | NodeKind::DynamicPipeIn)
    }

    /// Whether this kind unbundles values
    pub fn is_unpacker(&self) -> bool {
        !self.is_packer()
    }
}

/// Node type definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeType {
    /// Class identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Menu category
    pub category: String,
    /// Description
    pub description: String,
    /// Declared input sockets
    pub inputs: Vec<Socket>,
    /// Declared output sockets
    pub outputs: Vec<Socket>,
    /// Accepts extra wildcard inputs added in the browser
    pub dynamic_inputs: bool,
    /// Implementation
    pub kind: NodeKind,
}

impl NodeType {
    /// Get an input socket by name
    pub fn input(&self, name: &str) -> Option<&Socket> {
        self.inputs.iter().find(|s| s.name == name)
    }

    /// Get an output socket by index
    pub fn output(&self, index: usize) -> Option<&Socket> {
        self.outputs.get(index)
    }

    /// Required input sockets
    pub fn required_inputs(&self) -> impl Iterator<Item = &Socket> {
        self.inputs.iter().filter(|s| s.required)
    }
}

/// Values produced by one node execution, one per output socket
pub type NodeOutputs = Vec<Option<Value>>;

/// Error executing a registered node
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// Class identifier not registered
    #[error("Unknown node class: {0}")]
    UnknownClass(String),

    /// Pipe Out failed
    #[error(transparent)]
    Unpack(#[from] UnpackError),
}

/// Registry of available node types
pub struct NodeRegistry {
    types: IndexMap<String, NodeType>,
    settings: PipeSettings,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new(settings: PipeSettings) -> Self {
        Self {
            types: IndexMap::new(),
            settings,
        }
    }

    /// Register a node type
    pub fn register(&mut self, node_type: NodeType) {
        self.types.insert(node_type.id.clone(), node_type);
    }

    /// Get a node type by class identifier
    pub fn get(&self, id: &str) -> Option<&NodeType> {
        self.types.get(id)
    }

    /// Get all registered types
    pub fn types(&self) -> impl Iterator<Item = &NodeType> {
        self.types.values()
    }

    /// Class identifier to display name table
    pub fn display_names(&self) -> impl Iterator<Item = (&str, &str)> {
        self.types.values().map(|t| (t.id.as_str(), t.name.as_str()))
    }

    /// Settings the types were declared with
    pub fn settings(&self) -> &PipeSettings {
        &self.settings
    }

    /// Run a node of the given class on its keyword inputs
    pub fn execute(&self, class_type: &str, inputs: &NodeInputs) -> Result<NodeOutputs, ExecutionError> {
        let node_type = self
            .get(class_type)
            .ok_or_else(|| ExecutionError::UnknownClass(class_type.to_string()))?;

        let outputs = match node_type.kind {
            NodeKind::StaticPipeIn => vec![Some(pack_ordinal(inputs).to_value())],
            NodeKind::DynamicPipeIn => {
                vec![Some(pack_named(inputs, &self.settings.default_pipe_name).to_value())]
            }
            NodeKind::StaticPipeOut => unpack(
                PipeInput::classify(inputs.get(PIPE_SOCKET)),
                node_type.outputs.len(),
                UnpackPolicy::Lenient,
                "",
            )?,
            NodeKind::DynamicPipeOut => {
                let pipe_name = inputs
                    .get(PIPE_NAME_INPUT)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .unwrap_or_default();
                unpack(
                    PipeInput::classify(inputs.get(PIPE_SOCKET)),
                    node_type.outputs.len(),
                    UnpackPolicy::Strict,
                    pipe_name,
                )?
            }
        };

        Ok(outputs)
    }
}

/// Create the registry holding all pipe node types
pub fn create_pipe_registry(settings: &PipeSettings) -> NodeRegistry {
    let mut registry = NodeRegistry::new(settings.clone());

    // Static pair: numbered slots
    registry.register(NodeType {
        id: STATIC_PIPE_IN.to_string(),
        name: NodeKind::StaticPipeIn.display_name().to_string(),
        category: CATEGORY.to_string(),
        description: "Bundle up to N connected inputs into a single pipe".to_string(),
        inputs: (1..=settings.static_slots)
            .map(|i| Socket::input(format!("slot_{i:02}"), SocketType::Any).force_input())
            .collect(),
        outputs: vec![Socket::output(PIPE_SOCKET, SocketType::Pipe)],
        dynamic_inputs: false,
        kind: NodeKind::StaticPipeIn,
    });

    registry.register(NodeType {
        id: STATIC_PIPE_OUT.to_string(),
        name: NodeKind::StaticPipeOut.display_name().to_string(),
        category: CATEGORY.to_string(),
        description: "Unbundle a pipe into numbered outputs".to_string(),
        inputs: vec![Socket::input(PIPE_SOCKET, SocketType::Pipe).required()],
        outputs: (1..=settings.static_slots)
            .map(|i| Socket::output(format!("out_{i:02}"), SocketType::Any))
            .collect(),
        dynamic_inputs: false,
        kind: NodeKind::StaticPipeOut,
    });

    // Dynamic named pair: sockets added in the browser, wired by pipe_name
    registry.register(NodeType {
        id: DYNAMIC_PIPE_IN.to_string(),
        name: NodeKind::DynamicPipeIn.display_name().to_string(),
        category: CATEGORY.to_string(),
        description: "Bundle any number of named inputs into a pipe published under pipe_name"
            .to_string(),
        inputs: vec![Socket::string_widget(PIPE_NAME_INPUT, settings.default_pipe_name.clone())],
        outputs: vec![Socket::output(PIPE_SOCKET, SocketType::Pipe)],
        dynamic_inputs: true,
        kind: NodeKind::DynamicPipeIn,
    });

    registry.register(NodeType {
        id: DYNAMIC_PIPE_OUT.to_string(),
        name: NodeKind::DynamicPipeOut.display_name().to_string(),
        category: CATEGORY.to_string(),
        description: "Unbundle the pipe published under pipe_name, across subgraphs".to_string(),
        inputs: vec![
            Socket::string_widget(PIPE_NAME_INPUT, settings.default_pipe_name.clone()),
            Socket::input(PIPE_SOCKET, SocketType::Pipe),
        ],
        outputs: (1..=settings.max_outputs)
            .map(|i| Socket::output(format!("out_{i}"), SocketType::Any))
            .collect(),
        dynamic_inputs: false,
        kind: NodeKind::DynamicPipeOut,
    });

    registry
}
