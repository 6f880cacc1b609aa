// SPDX-License-Identifier: MIT OR Apache-2.0
//! Socket declarations for node inputs/outputs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type tag the host uses for the pipe socket
pub const PIPE_TYPE_NAME: &str = "FABIO_PIPE";

/// Socket direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SocketDirection {
    /// Input socket
    Input,
    /// Output socket
    Output,
}

/// Data type that can flow through a socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SocketType {
    /// Wildcard type, connects to anything
    Any,
    /// Bundle produced by a Pipe In node
    Pipe,
    /// String value (used by the `pipe_name` widget)
    String,
    /// Host-defined type
    Custom(String),
}

impl SocketType {
    /// Get the tag the host knows this type by
    pub fn type_name(&self) -> &str {
        match self {
            Self::Any => "*",
            Self::Pipe => PIPE_TYPE_NAME,
            Self::String => "STRING",
            Self::Custom(name) => name,
        }
    }

    /// Parse a host type tag
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "*" => Self::Any,
            PIPE_TYPE_NAME => Self::Pipe,
            "STRING" => Self::String,
            other => Self::Custom(other.to_string()),
        }
    }
}

/// A socket declaration on a node type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Socket {
    /// Socket name
    pub name: String,
    /// Socket direction
    pub direction: SocketDirection,
    /// Data type
    pub socket_type: SocketType,
    /// Default value (for widgets)
    pub default_value: Option<Value>,
    /// Whether the execution needs this input to be present
    pub required: bool,
    /// Skip the host's type-compatibility check for this socket
    pub accepts_any_type: bool,
    /// Always rendered as a socket, never as an inline widget
    pub force_input: bool,
    /// Rendered as an inline widget holding a literal
    pub widget: bool,
}

impl Socket {
    /// Create a new input socket
    pub fn input(name: impl Into<String>, socket_type: SocketType) -> Self {
        let accepts_any_type = socket_type == SocketType::Any;
        Self {
            name: name.into(),
            direction: SocketDirection::Input,
            socket_type,
            default_value: None,
            required: false,
            accepts_any_type,
            force_input: false,
            widget: false,
        }
    }

    /// Create a new output socket
    pub fn output(name: impl Into<String>, socket_type: SocketType) -> Self {
        let accepts_any_type = socket_type == SocketType::Any;
        Self {
            name: name.into(),
            direction: SocketDirection::Output,
            socket_type,
            default_value: None,
            required: false,
            accepts_any_type,
            force_input: false,
            widget: false,
        }
    }

    /// Create a required string widget with a default literal
    pub fn string_widget(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            default_value: Some(Value::String(default.into())),
            required: true,
            widget: true,
            ..Self::input(name, SocketType::String)
        }
    }

    /// Mark as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark as socket-only
    pub fn force_input(mut self) -> Self {
        self.force_input = true;
        self
    }

    /// Check if a connection to another socket is valid
    pub fn can_connect(&self, other: &Socket) -> bool {
        if self.direction == other.direction {
            return false;
        }

        if self.accepts_any_type || other.accepts_any_type {
            return true;
        }

        self.socket_type.type_name() == other.socket_type.type_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_connects_to_anything() {
        let any_in = Socket::input("slot_01", SocketType::Any);
        let image_out = Socket::output("IMAGE", SocketType::Custom("IMAGE".into()));
        assert!(any_in.can_connect(&image_out));
        assert!(image_out.can_connect(&any_in));
    }

    #[test]
    fn test_pipe_only_connects_to_pipe() {
        let pipe_in = Socket::input("pipe", SocketType::Pipe);
        let pipe_out = Socket::output("pipe", SocketType::Pipe);
        let latent_out = Socket::output("LATENT", SocketType::Custom("LATENT".into()));

        assert!(pipe_in.can_connect(&pipe_out));
        assert!(!pipe_in.can_connect(&latent_out));
        // Same direction never connects
        assert!(!pipe_out.can_connect(&pipe_out.clone()));
    }

    #[test]
    fn test_custom_pipe_tag_matches_builtin() {
        assert_eq!(SocketType::from_type_name("FABIO_PIPE"), SocketType::Pipe);
        assert_eq!(SocketType::from_type_name("*"), SocketType::Any);
        assert_eq!(SocketType::Custom("MODEL".into()).type_name(), "MODEL");
    }

    #[test]
    fn test_string_widget_defaults() {
        let widget = Socket::string_widget("pipe_name", "Pipe Principal");
        assert!(widget.required);
        assert!(widget.widget);
        assert!(!widget.accepts_any_type);
        assert_eq!(widget.default_value, Some(Value::String("Pipe Principal".into())));
    }
}
