// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pipe schemas: socket labels derived from the types wired into a Pipe In.
//!
//! The browser side names each connected Pipe In socket after the type of
//! its link (`IMAGE` -> `image`, a second `IMAGE` -> `image_2`) and shows
//! the same labels on every Pipe Out reading that pipe.
//!
//! Schemas live in the saved UI workflow, not in the submitted prompt: a
//! Pipe In keeps its last schema in a node property, and the link table
//! records the type of every wire.

use crate::node::{DYNAMIC_PIPE_IN, DYNAMIC_PIPE_OUT, PIPE_NAME_INPUT};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Node property a Pipe In saves its schema under
pub const SCHEMA_PROPERTY: &str = "fabio_dynamic_pipe_schema";

/// One labelled entry of a pipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaEntry {
    /// Socket label
    pub name: String,
    /// Host type of the connected link
    #[serde(rename = "type")]
    pub type_name: String,
}

/// Ordered socket labels of one pipe
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipeSchema {
    entries: Vec<SchemaEntry>,
}

impl PipeSchema {
    /// Build a schema from the link types of the connected sockets, in order
    pub fn from_link_types<'a>(types: impl IntoIterator<Item = &'a str>) -> Self {
        let mut counters = NameCounter::default();
        let entries = types
            .into_iter()
            .map(|type_name| {
                let type_name = if type_name.is_empty() { "*" } else { type_name };
                let base = sanitize_base_name(type_name);
                SchemaEntry {
                    name: counters.unique(&base),
                    type_name: type_name.to_string(),
                }
            })
            .collect();
        Self { entries }
    }

    /// Entries in socket order
    pub fn entries(&self) -> &[SchemaEntry] {
        &self.entries
    }

    /// Socket labels in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the schema has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Default)]
struct NameCounter(IndexMap<String, usize>);

impl NameCounter {
    fn unique(&mut self, base: &str) -> String {
        let n = self.0.entry(base.to_string()).or_insert(0);
        *n += 1;
        if *n == 1 {
            base.to_string()
        } else {
            format!("{base}_{n}")
        }
    }
}

/// Turn a host type tag into a socket label
pub fn sanitize_base_name(type_name: &str) -> String {
    let lowered = type_name.trim().to_lowercase();
    if lowered.is_empty() || lowered == "*" || lowered == "any" {
        return "any".to_string();
    }

    let mut base = String::with_capacity(lowered.len());
    let mut in_gap = false;
    for c in lowered.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            base.push(c);
            in_gap = false;
        } else if !in_gap {
            base.push('_');
            in_gap = true;
        }
    }

    let base = base.trim_matches('_');
    if base.is_empty() {
        return "any".to_string();
    }
    if base.starts_with(|c: char| c.is_ascii_digit()) {
        return format!("t_{base}");
    }
    base.to_string()
}

/// Labels shown on one Pipe Out of a workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipeOutLabels {
    /// Node id in its graph
    pub node: String,
    /// Pipe the node reads
    pub pipe_name: String,
    /// Output labels in order
    pub labels: Vec<String>,
}

/// Schemas of every named pipe in a workflow
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct SchemaStore {
    schemas: IndexMap<String, PipeSchema>,
}

impl SchemaStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a schema under a pipe name; blank names and empty schemas are ignored
    pub fn publish(&mut self, pipe_name: &str, schema: PipeSchema) {
        let pipe_name = pipe_name.trim();
        if pipe_name.is_empty() || schema.is_empty() {
            return;
        }
        self.schemas.insert(pipe_name.to_string(), schema);
    }

    /// Get the schema published under a name
    pub fn get(&self, pipe_name: &str) -> Option<&PipeSchema> {
        self.schemas.get(pipe_name.trim())
    }

    /// Forget every schema
    pub fn clear(&mut self) {
        self.schemas.clear();
    }

    /// Published pipes with their schemas
    pub fn schemas(&self) -> impl Iterator<Item = (&str, &PipeSchema)> {
        self.schemas.iter().map(|(name, schema)| (name.as_str(), schema))
    }

    /// Rebuild the store from a saved UI workflow.
    ///
    /// Walks the top level graph and every subgraph definition. A Pipe In
    /// publishes its saved schema, or one computed from its connected
    /// inputs when none was saved. Later graphs win on a shared name.
    pub fn from_workflow(workflow: &Value) -> Self {
        let mut store = Self::new();
        for graph in workflow_graphs(workflow) {
            for node in graph_nodes(graph).filter(|n| node_class(n) == Some(DYNAMIC_PIPE_IN)) {
                let Some(pipe_name) = node_pipe_name(node) else { continue };
                let schema = saved_schema(node).unwrap_or_else(|| computed_schema(graph, node));
                store.publish(&pipe_name, schema);
            }
        }
        tracing::debug!(pipes = store.schemas.len(), "rebuilt pipe schemas from workflow");
        store
    }

    /// Labels of every named Pipe Out in a saved UI workflow
    pub fn pipe_out_labels(&self, workflow: &Value) -> Vec<PipeOutLabels> {
        let mut labels = Vec::new();
        for graph in workflow_graphs(workflow) {
            for node in graph_nodes(graph).filter(|n| node_class(n) == Some(DYNAMIC_PIPE_OUT)) {
                let Some(pipe_name) = node_pipe_name(node) else { continue };
                let highest = node
                    .get("outputs")
                    .and_then(Value::as_array)
                    .and_then(|outputs| outputs.iter().rposition(output_is_connected));
                labels.push(PipeOutLabels {
                    node: node.get("id").map(id_text).unwrap_or_default(),
                    labels: self.output_labels(&pipe_name, highest),
                    pipe_name,
                });
            }
        }
        labels
    }

    /// Labels for a Pipe Out reading `pipe_name`.
    ///
    /// Shows every schema entry, plus enough `out_N` labels to keep the
    /// highest connected output visible, and never fewer than one.
    pub fn output_labels(&self, pipe_name: &str, highest_connected: Option<usize>) -> Vec<String> {
        let names: Vec<&str> = self.get(pipe_name).map(|s| s.names().collect()).unwrap_or_default();
        let desired = names
            .len()
            .max(highest_connected.map_or(0, |i| i + 1))
            .max(1);

        (0..desired)
            .map(|i| match names.get(i) {
                Some(name) => (*name).to_string(),
                None => format!("out_{}", i + 1),
            })
            .collect()
    }
}

fn workflow_graphs(workflow: &Value) -> Vec<&Value> {
    let mut graphs = vec![workflow];
    if let Some(subgraphs) = workflow.pointer("/definitions/subgraphs").and_then(Value::as_array) {
        graphs.extend(subgraphs);
    }
    graphs
}

fn graph_nodes(graph: &Value) -> impl Iterator<Item = &Value> {
    graph.get("nodes").and_then(Value::as_array).into_iter().flatten()
}

fn node_class(node: &Value) -> Option<&str> {
    node.get("type").and_then(Value::as_str)
}

fn id_text(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// Widget value first, then the node property
fn node_pipe_name(node: &Value) -> Option<String> {
    let widget = match node.get("widgets_values") {
        Some(Value::Array(values)) => values.first(),
        Some(Value::Object(values)) => values.get(PIPE_NAME_INPUT),
        _ => None,
    };
    let property = node.get("properties").and_then(|p| p.get(PIPE_NAME_INPUT));

    [widget, property]
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|name| !name.is_empty())
        .map(str::to_string)
}

fn saved_schema(node: &Value) -> Option<PipeSchema> {
    let saved = node.get("properties")?.get(SCHEMA_PROPERTY)?;
    PipeSchema::deserialize(saved).ok().filter(|schema| !schema.is_empty())
}

fn computed_schema(graph: &Value, node: &Value) -> PipeSchema {
    let types = node
        .get("inputs")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|input| input.get("widget").is_none())
        .filter(|input| input.get("name").and_then(Value::as_str) != Some(PIPE_NAME_INPUT))
        .filter_map(|input| {
            let link = input.get("link")?.as_u64()?;
            Some(
                link_type(graph, link)
                    .or_else(|| input.get("type").and_then(Value::as_str))
                    .unwrap_or("*"),
            )
        });
    PipeSchema::from_link_types(types)
}

// Links are `[id, from, from_slot, to, to_slot, type]` or objects with `id`/`type`
fn link_type(graph: &Value, link_id: u64) -> Option<&str> {
    graph.get("links")?.as_array()?.iter().find_map(|link| match link {
        Value::Array(fields) if fields.first().and_then(Value::as_u64) == Some(link_id) => {
            fields.get(5)?.as_str()
        }
        Value::Object(fields) if fields.get("id").and_then(Value::as_u64) == Some(link_id) => {
            fields.get("type")?.as_str()
        }
        _ => None,
    })
}

fn output_is_connected(output: &Value) -> bool {
    output
        .get("links")
        .and_then(Value::as_array)
        .is_some_and(|links| !links.is_empty())
}
