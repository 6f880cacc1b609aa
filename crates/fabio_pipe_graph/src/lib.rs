// SPDX-License-Identifier: MIT OR Apache-2.0
//! Named pipe nodes for flattened workflow graphs.
//!
//! A pipe bundles any number of values into one socket value at a Pipe In
//! node and unbundles it at a Pipe Out node elsewhere in the graph. This
//! crate provides:
//! - Socket declarations and the node registration table
//! - The envelope (pipe value) and its packing/unpacking
//! - The flattened prompt model the host submits
//! - The submission-time resolver wiring Pipe Outs to Pipe Ins by name
//! - Host registration, settings and a dry-run evaluator
//!
//! ## Architecture
//!
//! Two generations of the pipe share one envelope format with a
//! discriminant: the static pair (numbered slots, wired by hand) and the
//! dynamic named pair (browser-defined slots, wired by `pipe_name`). Only
//! the dynamic pair takes part in virtual wiring.

pub mod socket;
pub mod node;
pub mod envelope;
pub mod pack;
pub mod unpack;
pub mod prompt;
pub mod resolver;
pub mod evaluation;
pub mod schema;
pub mod settings;
pub mod registration;

pub use envelope::{Envelope, EnvelopeFormat};
pub use node::{create_pipe_registry, NodeKind, NodeRegistry, NodeType};
pub use prompt::{InputValue, Link, NodeId, NodeRecord, Prompt, Submission};
pub use registration::{register, Host, RegistrationHandle, SubmissionHook};
pub use resolver::{ResolveError, ResolveReport, WiringResolver};
pub use settings::PipeSettings;
pub use socket::{Socket, SocketDirection, SocketType};
