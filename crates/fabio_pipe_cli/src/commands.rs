// SPDX-License-Identifier: MIT OR Apache-2.0
//! Subcommand implementations.

use anyhow::{Context, Result};
use fabio_pipe_graph::evaluation::Evaluator;
use fabio_pipe_graph::schema::{PipeOutLabels, SchemaStore};
use fabio_pipe_graph::{create_pipe_registry, PipeSettings, Prompt, ResolveReport, Submission, WiringResolver};
use serde::Serialize;
use serde_json::Value;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

#[derive(clap::Args, Debug)]
pub struct ResolveCmd {
    /// Submission JSON (default: stdin).
    #[arg(long)]
    input: Option<PathBuf>,
    /// Where to write the patched JSON (default: stdout).
    #[arg(long)]
    output: Option<PathBuf>,
    /// Input is a bare node table instead of a payload with a "prompt" key.
    #[arg(long, default_value_t = false)]
    prompt_only: bool,
    /// Write compact JSON.
    #[arg(long, default_value_t = false)]
    compact: bool,
}

#[derive(clap::Args, Debug)]
pub struct NodesCmd {
    /// Print JSON instead of a table.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(clap::Args, Debug)]
pub struct RunCmd {
    /// Submission JSON (default: stdin).
    #[arg(long)]
    input: Option<PathBuf>,
    /// Input is a bare node table instead of a payload with a "prompt" key.
    #[arg(long, default_value_t = false)]
    prompt_only: bool,
}

#[derive(clap::Args, Debug)]
pub struct SchemaCmd {
    /// Saved UI workflow JSON (default: stdin).
    #[arg(long)]
    input: Option<PathBuf>,
    /// Print JSON instead of a table.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Serialize)]
struct SchemaReport<'a> {
    schemas: &'a SchemaStore,
    pipe_outs: &'a [PipeOutLabels],
}

#[derive(Serialize)]
struct NodeRow<'a> {
    class_type: &'a str,
    display_name: &'a str,
    category: &'a str,
    inputs: usize,
    outputs: usize,
}

/// Settings from an optional file, then the environment
pub fn load_settings(path: Option<&Path>) -> Result<PipeSettings> {
    let settings = match path {
        Some(path) => PipeSettings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => PipeSettings::default(),
    };
    Ok(settings.with_env_overrides())
}

fn read_input(path: Option<&Path>) -> Result<Value> {
    let text = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read stdin")?;
            text
        }
    };
    serde_json::from_str(&text).context("input is not valid JSON")
}

fn write_output(path: Option<&Path>, value: &Value, compact: bool) -> Result<()> {
    let mut text = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    text.push('\n');

    match path {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => std::io::stdout().write_all(text.as_bytes())?,
    }
    Ok(())
}

fn parse_submission(value: Value, prompt_only: bool) -> Result<Submission> {
    if prompt_only {
        let prompt: Prompt = serde_json::from_value(value).context("input is not a node table")?;
        return Ok(Submission::new(prompt));
    }
    serde_json::from_value(value).context("input is not a submission with a \"prompt\" key")
}

fn log_report(report: &ResolveReport) {
    for edge in &report.patched {
        tracing::info!(
            "wired pipe out {} to pipe in {} ('{}')",
            edge.unpacker,
            edge.producer,
            edge.pipe_name
        );
    }
    for (node, reason) in &report.skipped {
        tracing::debug!("left pipe out {node} unchanged: {reason:?}");
    }
}

/// Patch a submission (or bare node table) without touching anything else in it
fn resolve_value(input: Value, prompt_only: bool) -> Result<(Value, ResolveReport)> {
    let payload = if prompt_only {
        let mut payload = serde_json::Map::new();
        payload.insert("prompt".to_string(), input);
        Value::Object(payload)
    } else {
        input
    };

    let (mut patched, report) = WiringResolver::default()
        .resolve_payload(payload)
        .context("failed to resolve pipe wiring")?;

    if prompt_only {
        patched = patched.get_mut("prompt").map(Value::take).unwrap_or_default();
    }
    Ok((patched, report))
}

pub fn resolve(cmd: &ResolveCmd) -> Result<()> {
    let (value, report) = resolve_value(read_input(cmd.input.as_deref())?, cmd.prompt_only)?;
    log_report(&report);
    write_output(cmd.output.as_deref(), &value, cmd.compact)
}

pub fn nodes(cmd: &NodesCmd, settings: &PipeSettings) -> Result<()> {
    let registry = create_pipe_registry(settings);
    let rows: Vec<NodeRow<'_>> = registry
        .types()
        .map(|t| NodeRow {
            class_type: &t.id,
            display_name: &t.name,
            category: &t.category,
            inputs: t.inputs.len(),
            outputs: t.outputs.len(),
        })
        .collect();

    if cmd.json {
        return write_output(None, &serde_json::to_value(&rows)?, false);
    }

    let mut out = std::io::stdout().lock();
    for row in &rows {
        writeln!(
            out,
            "{:<22} {:<24} inputs={:<3} outputs={}",
            row.class_type, row.display_name, row.inputs, row.outputs
        )?;
    }
    Ok(())
}

pub fn schema(cmd: &SchemaCmd) -> Result<()> {
    let workflow = read_input(cmd.input.as_deref())?;
    let store = SchemaStore::from_workflow(&workflow);
    let pipe_outs = store.pipe_out_labels(&workflow);

    if cmd.json {
        let report = SchemaReport {
            schemas: &store,
            pipe_outs: &pipe_outs,
        };
        return write_output(None, &serde_json::to_value(&report)?, false);
    }

    let mut out = std::io::stdout().lock();
    for (pipe_name, schema) in store.schemas() {
        let names: Vec<&str> = schema.names().collect();
        writeln!(out, "pipe {pipe_name:<24} {}", names.join(", "))?;
    }
    for pipe_out in &pipe_outs {
        writeln!(
            out,
            "out  {:<8} {:<24} {}",
            pipe_out.node,
            pipe_out.pipe_name,
            pipe_out.labels.join(", ")
        )?;
    }
    Ok(())
}

pub fn run(cmd: &RunCmd, settings: &PipeSettings) -> Result<()> {
    let mut submission = parse_submission(read_input(cmd.input.as_deref())?, cmd.prompt_only)?;
    let report = WiringResolver::default().resolve_submission(&mut submission)?;
    log_report(&report);

    let registry = create_pipe_registry(settings);
    let result = Evaluator::new(&registry).run(&submission.prompt)?;

    let mut outputs = serde_json::Map::new();
    for id in result.order() {
        let values = result.outputs(id).cloned().unwrap_or_default();
        // Trailing empty outputs only add noise
        let used = values.iter().rposition(Option::is_some).map_or(0, |i| i + 1);
        outputs.insert(id.to_string(), serde_json::to_value(&values[..used])?);
    }
    write_output(None, &Value::Object(outputs), false)
}
