// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dry-run evaluation of a resolved prompt.
//!
//! Executes the pipe nodes of a prompt in dependency order, the way the
//! host would, so a patched submission can be previewed without the host.
//! Only this plugin's node classes can run; anything else is an error.

use crate::node::{ExecutionError, NodeInputs, NodeOutputs, NodeRegistry};
use crate::prompt::{InputValue, NodeId, Prompt};
use std::collections::{HashMap, HashSet};

/// Error during evaluation
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    /// Graph contains a cycle
    #[error("Graph contains a cycle through node {0}")]
    CycleDetected(NodeId),

    /// A wire points at a node that is not in the prompt
    #[error("Node {node} input '{input}' references missing node {target}")]
    DanglingLink {
        /// Consumer node
        node: NodeId,
        /// Consumer input
        input: String,
        /// Missing producer
        target: NodeId,
    },

    /// Node execution failed
    #[error("Node {node} ({class_type}) failed: {source}")]
    Execution {
        /// Failing node
        node: NodeId,
        /// Its class
        class_type: String,
        /// Underlying error
        #[source]
        source: ExecutionError,
    },
}

/// Outputs of every evaluated node
#[derive(Debug, Clone, Default)]
pub struct EvaluationResult {
    outputs: HashMap<NodeId, NodeOutputs>,
    order: Vec<NodeId>,
}

impl EvaluationResult {
    /// Outputs of a node
    pub fn outputs(&self, node: &NodeId) -> Option<&NodeOutputs> {
        self.outputs.get(node)
    }

    /// Nodes in the order they ran
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }
}

/// Executes prompts against a node registry
pub struct Evaluator<'a> {
    registry: &'a NodeRegistry,
}

impl<'a> Evaluator<'a> {
    /// Create an evaluator
    pub fn new(registry: &'a NodeRegistry) -> Self {
        Self { registry }
    }

    /// Run every node of the prompt
    pub fn run(&self, prompt: &Prompt) -> Result<EvaluationResult, EvaluationError> {
        let order = topological_order(prompt)?;
        let mut result = EvaluationResult::default();

        for id in &order {
            let Some(record) = prompt.node(id) else { continue };

            let mut inputs = NodeInputs::new();
            for (name, value) in &record.inputs {
                match value {
                    InputValue::Literal(literal) => {
                        inputs.insert(name.clone(), literal.clone());
                    }
                    InputValue::Link(link) => {
                        // An empty upstream output is the same as an unconnected socket
                        let upstream = result
                            .outputs
                            .get(link.node())
                            .and_then(|outs| outs.get(link.output() as usize))
                            .cloned()
                            .flatten();
                        if let Some(value) = upstream {
                            inputs.insert(name.clone(), value);
                        }
                    }
                }
            }

            let outputs = self
                .registry
                .execute(&record.class_type, &inputs)
                .map_err(|source| EvaluationError::Execution {
                    node: id.clone(),
                    class_type: record.class_type.clone(),
                    source,
                })?;

            tracing::trace!(node = %id, class_type = %record.class_type, "evaluated node");
            result.outputs.insert(id.clone(), outputs);
        }

        result.order = order;
        Ok(result)
    }
}

/// Nodes ordered so every producer precedes its consumers.
///
/// Independent nodes keep the numeric-then-lexicographic id order.
pub fn topological_order(prompt: &Prompt) -> Result<Vec<NodeId>, EvaluationError> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();

    for id in prompt.sorted_ids() {
        if !visited.contains(&id) {
            visit(prompt, id, &mut visited, &mut order)?;
        }
    }

    Ok(order)
}

// Depth-first walk with an explicit stack; each frame is a node and the
// index of the next input to follow
fn visit(
    prompt: &Prompt,
    root: NodeId,
    visited: &mut HashSet<NodeId>,
    order: &mut Vec<NodeId>,
) -> Result<(), EvaluationError> {
    let mut on_stack = HashSet::from([root.clone()]);
    let mut stack = vec![(root, 0usize)];

    while let Some((id, next)) = stack.last_mut() {
        let Some((input, value)) = prompt.node(id).and_then(|record| record.inputs.get_index(*next)) else {
            let id = id.clone();
            stack.pop();
            on_stack.remove(&id);
            visited.insert(id.clone());
            order.push(id);
            continue;
        };
        *next += 1;

        let Some(link) = value.as_link() else { continue };
        let target = link.node();
        if prompt.node(target).is_none() {
            return Err(EvaluationError::DanglingLink {
                node: id.clone(),
                input: input.clone(),
                target: target.clone(),
            });
        }
        if on_stack.contains(target) {
            return Err(EvaluationError::CycleDetected(target.clone()));
        }
        if visited.contains(target) {
            continue;
        }

        on_stack.insert(target.clone());
        stack.push((target.clone(), 0));
    }

    Ok(())
}
