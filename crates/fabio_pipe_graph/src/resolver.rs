// SPDX-License-Identifier: MIT OR Apache-2.0
//! Submission-time wiring of Pipe Out nodes to their Pipe In by name.
//!
//! The host cannot wire sockets across subgraph boundaries, but by the time
//! a prompt is submitted every subgraph has been inlined into one flat node
//! table. The resolver runs once per submission, before execution:
//!
//! 1. Index every Pipe In with a non-blank `pipe_name`.
//! 2. Abort the submission if any name is published by more than one node.
//! 3. Give every Pipe Out without a `pipe` input an edge to the Pipe In
//!    publishing its `pipe_name`.
//!
//! Existing `pipe` inputs are never touched. A Pipe Out whose name has no
//! publisher is left alone; it fails (or yields empty outputs) when it runs.

use crate::node::{DYNAMIC_PIPE_IN, DYNAMIC_PIPE_OUT, PIPE_NAME_INPUT, PIPE_SOCKET};
use crate::prompt::{InputValue, Link, NodeId, Prompt, Submission};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Class identifiers the resolver treats as Pipe In / Pipe Out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverClasses {
    /// Producer classes
    pub packers: Vec<String>,
    /// Consumer classes
    pub unpackers: Vec<String>,
}

impl Default for ResolverClasses {
    fn default() -> Self {
        Self {
            packers: vec![DYNAMIC_PIPE_IN.to_string()],
            unpackers: vec![DYNAMIC_PIPE_OUT.to_string()],
        }
    }
}

/// A pipe name published by more than one Pipe In
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicatePipeName {
    /// The shared name
    pub name: String,
    /// Every node publishing it, sorted
    pub nodes: Vec<NodeId>,
}

impl fmt::Display for DuplicatePipeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.nodes.iter().map(NodeId::as_str).collect();
        write!(f, "'{}' -> nodes [{}]", self.name, ids.join(", "))
    }
}

/// Error aborting a submission
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Two or more Pipe In nodes share a name
    #[error(
        "Fabio Dynamic Pipe: duplicate pipe_name on Pipe In nodes: {}. \
         Each Pipe In must use a unique pipe_name.",
        format_duplicates(.0)
    )]
    DuplicatePipeNames(Vec<DuplicatePipeName>),

    /// Payload is not a valid submission
    #[error("invalid submission payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

fn format_duplicates(duplicates: &[DuplicatePipeName]) -> String {
    duplicates
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Why a Pipe Out was left untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No usable `pipe_name`
    BlankName,
    /// Already has a `pipe` input
    AlreadyWired,
    /// No Pipe In publishes the name
    NoProducer,
}

/// An edge the resolver added
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedEdge {
    /// The Pipe Out that received the edge
    pub unpacker: NodeId,
    /// The Pipe In it now reads from
    pub producer: NodeId,
    /// The shared pipe name
    pub pipe_name: String,
}

/// Outcome of one resolution pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveReport {
    /// Edges added
    pub patched: Vec<PatchedEdge>,
    /// Pipe Outs left alone, with the reason
    pub skipped: Vec<(NodeId, SkipReason)>,
}

impl ResolveReport {
    /// Whether the pass changed the prompt
    pub fn changed(&self) -> bool {
        !self.patched.is_empty()
    }
}

/// Name-based wiring pass over a flattened prompt
#[derive(Debug, Clone, Default)]
pub struct WiringResolver {
    classes: ResolverClasses,
}

impl WiringResolver {
    /// Create a resolver for the given classes
    pub fn new(classes: ResolverClasses) -> Self {
        Self { classes }
    }

    /// Classes this resolver matches
    pub fn classes(&self) -> &ResolverClasses {
        &self.classes
    }

    fn is_packer(&self, class_type: &str) -> bool {
        self.classes.packers.iter().any(|c| c == class_type)
    }

    fn is_unpacker(&self, class_type: &str) -> bool {
        self.classes.unpackers.iter().any(|c| c == class_type)
    }

    /// Resolve virtual wiring in place.
    ///
    /// On error the prompt is left unchanged.
    pub fn resolve(&self, prompt: &mut Prompt) -> Result<ResolveReport, ResolveError> {
        let order = prompt.sorted_ids();

        // Index
        let mut producers: BTreeMap<String, NodeId> = BTreeMap::new();
        let mut duplicates: BTreeMap<String, BTreeSet<NodeId>> = BTreeMap::new();

        for id in &order {
            let Some(record) = prompt.node(id) else { continue };
            if !self.is_packer(&record.class_type) {
                continue;
            }
            let Some(name) = record.literal_str(PIPE_NAME_INPUT) else {
                continue;
            };

            match producers.get(name) {
                Some(first) if first != id => {
                    duplicates
                        .entry(name.to_string())
                        .or_insert_with(|| BTreeSet::from([first.clone()]))
                        .insert(id.clone());
                }
                Some(_) => {}
                None => {
                    producers.insert(name.to_string(), id.clone());
                }
            }
        }

        // Duplicate check
        if !duplicates.is_empty() {
            let duplicates: Vec<DuplicatePipeName> = duplicates
                .into_iter()
                .map(|(name, nodes)| DuplicatePipeName {
                    name,
                    nodes: nodes.into_iter().collect(),
                })
                .collect();
            tracing::debug!(count = duplicates.len(), "duplicate pipe names, aborting submission");
            return Err(ResolveError::DuplicatePipeNames(duplicates));
        }

        // Patch
        let mut report = ResolveReport::default();

        for id in &order {
            let Some(record) = prompt.node_mut(id) else { continue };
            if !self.is_unpacker(&record.class_type) {
                continue;
            }

            let Some(name) = record.literal_str(PIPE_NAME_INPUT).map(str::to_string) else {
                tracing::debug!(node = %id, "pipe out has no pipe_name, skipping");
                report.skipped.push((id.clone(), SkipReason::BlankName));
                continue;
            };

            if record.inputs.contains_key(PIPE_SOCKET) {
                tracing::debug!(node = %id, pipe_name = %name, "pipe out already wired, keeping edge");
                report.skipped.push((id.clone(), SkipReason::AlreadyWired));
                continue;
            }

            let Some(producer) = producers.get(&name) else {
                tracing::debug!(node = %id, pipe_name = %name, "no pipe in publishes this name");
                report.skipped.push((id.clone(), SkipReason::NoProducer));
                continue;
            };

            record.inputs.insert(
                PIPE_SOCKET.to_string(),
                InputValue::Link(Link(producer.clone(), 0)),
            );
            tracing::debug!(node = %id, producer = %producer, pipe_name = %name, "wired pipe out");
            report.patched.push(PatchedEdge {
                unpacker: id.clone(),
                producer: producer.clone(),
                pipe_name: name,
            });
        }

        tracing::info!(
            patched = report.patched.len(),
            skipped = report.skipped.len(),
            "resolved pipe wiring"
        );

        Ok(report)
    }

    /// Resolve the prompt of a hook payload
    pub fn resolve_submission(&self, submission: &mut Submission) -> Result<ResolveReport, ResolveError> {
        self.resolve(&mut submission.prompt)
    }

    /// Resolve a raw JSON payload holding a `"prompt"` key, returning it patched.
    ///
    /// Only the added `pipe` edges are written into the payload; every other
    /// byte of it comes back as it arrived.
    pub fn resolve_payload(&self, mut payload: Value) -> Result<(Value, ResolveReport), ResolveError> {
        let mut submission = Submission::deserialize(&payload)?;
        let report = self.resolve_submission(&mut submission)?;

        for edge in &report.patched {
            let Some(record) = payload
                .get_mut("prompt")
                .and_then(|prompt| prompt.get_mut(edge.unpacker.as_str()))
                .and_then(Value::as_object_mut)
            else {
                continue;
            };
            let inputs = record
                .entry("inputs")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Some(inputs) = inputs.as_object_mut() {
                let link = Link(edge.producer.clone(), 0);
                inputs.insert(PIPE_SOCKET.to_string(), serde_json::to_value(link)?);
            }
        }

        Ok((payload, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::NodeRecord;
    use serde_json::json;

    fn pipe_in(name: &str) -> NodeRecord {
        NodeRecord::new(DYNAMIC_PIPE_IN).with_literal(PIPE_NAME_INPUT, name)
    }

    fn pipe_out(name: &str) -> NodeRecord {
        NodeRecord::new(DYNAMIC_PIPE_OUT).with_literal(PIPE_NAME_INPUT, name)
    }

    fn pipe_edge(prompt: &Prompt, id: &str) -> Option<InputValue> {
        prompt.node(&NodeId::from(id))?.inputs.get(PIPE_SOCKET).cloned()
    }

    #[test]
    fn test_wires_matching_pair() {
        let mut prompt = Prompt::new();
        prompt.insert("1", pipe_in("X").with_literal("foo", 1).with_literal("bar", 2));
        prompt.insert("2", pipe_out("X"));

        let report = WiringResolver::default().resolve(&mut prompt).unwrap();
        assert_eq!(pipe_edge(&prompt, "2"), Some(InputValue::Link(Link::new("1", 0))));
        assert_eq!(
            report.patched,
            vec![PatchedEdge {
                unpacker: NodeId::from("2"),
                producer: NodeId::from("1"),
                pipe_name: "X".into(),
            }]
        );
    }

    #[test]
    fn test_bridges_subgraph_ids() {
        let mut prompt = Prompt::new();
        prompt.insert("7:3", pipe_in("Latents"));
        prompt.insert("12:5:1", pipe_out(" Latents "));

        WiringResolver::default().resolve(&mut prompt).unwrap();
        assert_eq!(pipe_edge(&prompt, "12:5:1"), Some(InputValue::Link(Link::new("7:3", 0))));
    }

    #[test]
    fn test_duplicates_abort_everything() {
        let mut prompt = Prompt::new();
        prompt.insert("1", pipe_in("X"));
        prompt.insert("3", pipe_in("X"));
        prompt.insert("10", pipe_in("X"));
        prompt.insert("4", pipe_in("Z"));
        prompt.insert("5", pipe_out("Z"));
        let before = prompt.clone();

        let err = WiringResolver::default().resolve(&mut prompt).unwrap_err();
        let ResolveError::DuplicatePipeNames(dups) = &err else {
            panic!("expected duplicates, got {err:?}");
        };
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].name, "X");
        assert_eq!(dups[0].nodes, vec![NodeId::from("1"), NodeId::from("3"), NodeId::from("10")]);

        let message = err.to_string();
        assert!(message.contains("'X' -> nodes [1, 3, 10]"));
        // No partial wiring for unrelated names
        assert_eq!(prompt, before);
    }

    #[test]
    fn test_duplicates_reported_without_consumers() {
        let mut prompt = Prompt::new();
        prompt.insert("a", pipe_in("X"));
        prompt.insert("c", pipe_in("X"));
        prompt.insert("b", pipe_in("Y"));
        prompt.insert("d", pipe_in("Y"));

        let err = WiringResolver::default().resolve(&mut prompt).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("'X' -> nodes [a, c]"));
        assert!(message.contains("'Y' -> nodes [b, d]"));
    }

    #[test]
    fn test_blank_names_never_collide() {
        let mut prompt = Prompt::new();
        prompt.insert("1", pipe_in(""));
        prompt.insert("2", pipe_in("   "));
        prompt.insert("3", NodeRecord::new(DYNAMIC_PIPE_IN));
        prompt.insert("4", pipe_out(""));

        let report = WiringResolver::default().resolve(&mut prompt).unwrap();
        assert!(!report.changed());
        assert_eq!(report.skipped, vec![(NodeId::from("4"), SkipReason::BlankName)]);
    }

    #[test]
    fn test_existing_edge_is_kept() {
        let mut prompt = Prompt::new();
        prompt.insert("1", pipe_in("X"));
        prompt.insert("2", pipe_out("X").with_link(PIPE_SOCKET, "99", 3));
        prompt.insert("3", pipe_out("nothing").with_literal(PIPE_SOCKET, json!(null)));

        let report = WiringResolver::default().resolve(&mut prompt).unwrap();
        assert_eq!(pipe_edge(&prompt, "2"), Some(InputValue::Link(Link::new("99", 3))));
        assert_eq!(pipe_edge(&prompt, "3"), Some(InputValue::Literal(json!(null))));
        assert_eq!(
            report.skipped,
            vec![
                (NodeId::from("2"), SkipReason::AlreadyWired),
                (NodeId::from("3"), SkipReason::AlreadyWired),
            ]
        );
    }

    #[test]
    fn test_unmatched_name_is_not_an_error() {
        let mut prompt = Prompt::new();
        prompt.insert("1", pipe_in("X"));
        prompt.insert("2", pipe_out("Y"));

        let report = WiringResolver::default().resolve(&mut prompt).unwrap();
        assert_eq!(pipe_edge(&prompt, "2"), None);
        assert_eq!(report.skipped, vec![(NodeId::from("2"), SkipReason::NoProducer)]);
    }

    #[test]
    fn test_idempotent() {
        let mut prompt = Prompt::new();
        prompt.insert("1", pipe_in("X"));
        prompt.insert("2", pipe_out("X"));
        prompt.insert("3", pipe_out("X"));
        prompt.insert("4", pipe_out("Y"));

        let resolver = WiringResolver::default();
        resolver.resolve(&mut prompt).unwrap();
        let once = prompt.clone();
        let report = resolver.resolve(&mut prompt).unwrap();
        assert_eq!(prompt, once);
        assert!(!report.changed());
    }

    #[test]
    fn test_ignores_other_classes() {
        let mut prompt = Prompt::new();
        prompt.insert("1", NodeRecord::new("Fabio Pipe In").with_literal(PIPE_NAME_INPUT, "X"));
        prompt.insert("2", NodeRecord::new("Fabio Pipe In").with_literal(PIPE_NAME_INPUT, "X"));
        prompt.insert("3", NodeRecord::new("KSampler").with_literal(PIPE_NAME_INPUT, "X"));

        let report = WiringResolver::default().resolve(&mut prompt).unwrap();
        assert_eq!(report, ResolveReport::default());
    }

    #[test]
    fn test_resolve_payload() {
        let payload = json!({
            "client_id": "c1",
            "prompt": {
                "5": {"class_type": DYNAMIC_PIPE_OUT, "inputs": {"pipe_name": "X"}},
                "4": {"class_type": DYNAMIC_PIPE_IN, "inputs": {"pipe_name": "X", "seed": ["2", 0]}}
            }
        });

        let (patched, report) = WiringResolver::default().resolve_payload(payload).unwrap();
        assert_eq!(report.patched.len(), 1);
        assert_eq!(patched["prompt"]["5"]["inputs"]["pipe"], json!(["4", 0]));
        assert_eq!(patched["prompt"]["4"]["inputs"]["seed"], json!(["2", 0]));
        assert_eq!(patched["client_id"], json!("c1"));
    }

    #[test]
    fn test_payload_without_pipes_is_untouched() {
        let payload = json!({
            "client_id": "c1",
            "prompt": {
                "7": {
                    "class_type": "EmptyLatentImage",
                    "inputs": {"size": [512, 512], "vae": [3, 0], "scale": 1.50}
                },
                "3": {"class_type": "VAELoader", "inputs": {"name": "v.safetensors"}, "_meta": {"title": "VAE"}}
            }
        });
        let before = serde_json::to_string(&payload).unwrap();

        let (after, report) = WiringResolver::default().resolve_payload(payload).unwrap();
        assert!(!report.changed());
        assert_eq!(serde_json::to_string(&after).unwrap(), before);
    }

    #[test]
    fn test_payload_patch_keeps_other_inputs() {
        let payload = json!({
            "prompt": {
                "1": {"class_type": DYNAMIC_PIPE_IN, "inputs": {"pipe_name": "X", "size": [64, 64]}},
                "2": {"class_type": DYNAMIC_PIPE_OUT, "inputs": {"pipe_name": "X", "seed": [9, 0]}}
            }
        });

        let (after, report) = WiringResolver::default().resolve_payload(payload).unwrap();
        assert!(report.changed());
        assert_eq!(
            after["prompt"]["2"]["inputs"],
            json!({"pipe_name": "X", "seed": [9, 0], "pipe": ["1", 0]})
        );
        assert_eq!(after["prompt"]["1"]["inputs"]["size"], json!([64, 64]));
    }

    #[test]
    fn test_payload_without_prompt_is_invalid() {
        let err = WiringResolver::default().resolve_payload(json!({"client_id": "c1"})).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidPayload(_)));
    }
}
