// SPDX-License-Identifier: MIT OR Apache-2.0
//! Announcing the pipe nodes and the wiring hook to a host.
//!
//! The host's plugin loader calls [`register`] once. Node types and the
//! browser asset directory are always announced; the before-execution hook
//! may be refused by the host, which is recorded on the returned handle
//! instead of aborting the load.

use crate::node::{create_pipe_registry, NodeRegistry, NodeType};
use crate::prompt::Submission;
use crate::resolver::{ResolveError, ResolveReport, WiringResolver};
use crate::settings::PipeSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Directory the host serves the pipe's browser scripts from
pub const WEB_DIRECTORY: &str = "./js";

/// Identifier the host hands back for a registered hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HookId(pub Uuid);

impl HookId {
    /// Create a new random hook ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HookId {
    fn default() -> Self {
        Self::new()
    }
}

/// Error reported by a host
#[derive(Debug, Clone, thiserror::Error)]
pub enum HostError {
    /// The host has no before-execution extension point
    #[error("host does not support submission hooks")]
    HooksUnsupported,

    /// The host refused the registration
    #[error("host rejected registration: {0}")]
    Rejected(String),
}

/// Callback run on every submission before execution
pub trait SubmissionHook: Send + Sync {
    /// Inspect or patch the submission; an error aborts it
    fn before_execution(&self, submission: &mut Submission) -> Result<(), ResolveError>;
}

/// The hook that resolves pipe wiring
#[derive(Debug, Clone, Default)]
pub struct PipeWiringHook {
    resolver: WiringResolver,
}

impl PipeWiringHook {
    /// Create a hook around a resolver
    pub fn new(resolver: WiringResolver) -> Self {
        Self { resolver }
    }

    /// Resolve and return the report
    pub fn run(&self, submission: &mut Submission) -> Result<ResolveReport, ResolveError> {
        self.resolver.resolve_submission(submission)
    }
}

impl SubmissionHook for PipeWiringHook {
    fn before_execution(&self, submission: &mut Submission) -> Result<(), ResolveError> {
        self.run(submission).map(|_| ())
    }
}

/// Extension points a host exposes to plugins
pub trait Host {
    /// Make a node type available in the host
    fn register_node_type(&mut self, node_type: NodeType) -> Result<(), HostError>;

    /// Serve browser assets from a directory
    fn set_web_directory(&mut self, path: &Path) -> Result<(), HostError>;

    /// Run a hook on every submission before execution
    fn register_submission_hook(&mut self, hook: Box<dyn SubmissionHook>) -> Result<HookId, HostError>;
}

/// What a call to [`register`] achieved
#[derive(Debug)]
pub struct RegistrationHandle {
    node_types: Vec<String>,
    web_directory: Option<PathBuf>,
    hook: Result<HookId, HostError>,
    failures: Vec<(String, HostError)>,
}

impl RegistrationHandle {
    /// Class identifiers the host accepted
    pub fn node_types(&self) -> &[String] {
        &self.node_types
    }

    /// Asset directory, if the host accepted it
    pub fn web_directory(&self) -> Option<&Path> {
        self.web_directory.as_deref()
    }

    /// ID of the wiring hook, if it was registered
    pub fn hook_id(&self) -> Option<HookId> {
        self.hook.as_ref().ok().copied()
    }

    /// Why the wiring hook is missing
    pub fn hook_error(&self) -> Option<&HostError> {
        self.hook.as_ref().err()
    }

    /// Node types or assets the host refused
    pub fn failures(&self) -> &[(String, HostError)] {
        &self.failures
    }

    /// Whether everything was registered
    pub fn is_complete(&self) -> bool {
        self.hook.is_ok() && self.failures.is_empty()
    }
}

/// Register the pipe nodes, assets and wiring hook with a host
pub fn register(host: &mut dyn Host, settings: &PipeSettings) -> RegistrationHandle {
    let registry: NodeRegistry = create_pipe_registry(settings);
    let mut node_types = Vec::new();
    let mut failures = Vec::new();

    for node_type in registry.types() {
        let id = node_type.id.clone();
        match host.register_node_type(node_type.clone()) {
            Ok(()) => node_types.push(id),
            Err(e) => {
                tracing::warn!(class_type = %id, "failed to register node type: {e}");
                failures.push((id, e));
            }
        }
    }

    let web_directory = PathBuf::from(WEB_DIRECTORY);
    let web_directory = match host.set_web_directory(&web_directory) {
        Ok(()) => Some(web_directory),
        Err(e) => {
            tracing::warn!("failed to register web directory: {e}");
            failures.push((WEB_DIRECTORY.to_string(), e));
            None
        }
    };

    let hook = host.register_submission_hook(Box::new(PipeWiringHook::default()));
    match &hook {
        Ok(id) => tracing::info!(hook = %id.0, "registered pipe wiring hook"),
        Err(e) => tracing::warn!("pipe wiring hook not registered, pipes will not auto-connect: {e}"),
    }

    RegistrationHandle {
        node_types,
        web_directory,
        hook,
        failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{DYNAMIC_PIPE_IN, DYNAMIC_PIPE_OUT, PIPE_NAME_INPUT};
    use crate::prompt::{InputValue, Link, NodeId, NodeRecord, Prompt};

    #[derive(Default)]
    struct TestHost {
        types: Vec<NodeType>,
        web_directory: Option<PathBuf>,
        hooks: Vec<Box<dyn SubmissionHook>>,
        supports_hooks: bool,
        reject: Option<&'static str>,
    }

    impl Host for TestHost {
        fn register_node_type(&mut self, node_type: NodeType) -> Result<(), HostError> {
            if self.reject == Some(node_type.id.as_str()) {
                return Err(HostError::Rejected(node_type.id));
            }
            self.types.push(node_type);
            Ok(())
        }

        fn set_web_directory(&mut self, path: &Path) -> Result<(), HostError> {
            self.web_directory = Some(path.to_path_buf());
            Ok(())
        }

        fn register_submission_hook(&mut self, hook: Box<dyn SubmissionHook>) -> Result<HookId, HostError> {
            if !self.supports_hooks {
                return Err(HostError::HooksUnsupported);
            }
            self.hooks.push(hook);
            Ok(HookId::new())
        }
    }

    #[test]
    fn test_register_everything() {
        let mut host = TestHost {
            supports_hooks: true,
            ..TestHost::default()
        };
        let handle = register(&mut host, &PipeSettings::default());

        assert!(handle.is_complete());
        assert_eq!(handle.node_types().len(), 4);
        assert_eq!(handle.web_directory(), Some(Path::new("./js")));
        assert!(handle.hook_id().is_some());
        assert_eq!(host.hooks.len(), 1);
    }

    #[test]
    fn test_hook_failure_is_reported() {
        let mut host = TestHost::default();
        let handle = register(&mut host, &PipeSettings::default());

        assert!(!handle.is_complete());
        assert!(matches!(handle.hook_error(), Some(HostError::HooksUnsupported)));
        // Nodes still load without the hook
        assert_eq!(host.types.len(), 4);
    }

    #[test]
    fn test_rejected_node_type_is_reported() {
        let mut host = TestHost {
            supports_hooks: true,
            reject: Some("Fabio Pipe Out"),
            ..TestHost::default()
        };
        let handle = register(&mut host, &PipeSettings::default());

        assert!(!handle.is_complete());
        assert_eq!(handle.failures().len(), 1);
        assert_eq!(handle.failures()[0].0, "Fabio Pipe Out");
        assert!(!handle.node_types().contains(&"Fabio Pipe Out".to_string()));
    }

    #[test]
    fn test_registered_hook_patches_submission() {
        let mut host = TestHost {
            supports_hooks: true,
            ..TestHost::default()
        };
        register(&mut host, &PipeSettings::default());

        let mut prompt = Prompt::new();
        prompt.insert("1", NodeRecord::new(DYNAMIC_PIPE_IN).with_literal(PIPE_NAME_INPUT, "X"));
        prompt.insert("2", NodeRecord::new(DYNAMIC_PIPE_OUT).with_literal(PIPE_NAME_INPUT, "X"));
        let mut submission = Submission::new(prompt);

        host.hooks[0].before_execution(&mut submission).unwrap();
        let out = submission.prompt.node(&NodeId::from("2")).unwrap();
        assert_eq!(out.inputs["pipe"], InputValue::Link(Link::new("1", 0)));
    }
}
