// SPDX-License-Identifier: MIT OR Apache-2.0
//! `fabio_pipe` - run the pipe wiring pass outside the host.
//!
//! Reads a workflow submission (the JSON the host hands to its
//! before-execution hooks), resolves named pipes the same way the hook does
//! and writes the patched submission back out. Also lists the node
//! registration table, dry-runs resolved prompts and previews the socket
//! labels of saved workflows.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "fabio_pipe")]
#[command(about = "Resolve and inspect Fabio Dynamic Pipe wiring in workflow submissions", long_about = None)]
struct Cli {
    /// Settings file (RON); FABIO_DYNAMIC_PIPE_MAX_OUTPUTS still applies on top.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Wire Pipe Outs to their Pipe In by pipe_name and print the patched submission.
    Resolve(commands::ResolveCmd),
    /// Print the node registration table.
    Nodes(commands::NodesCmd),
    /// Resolve, then execute the pipe nodes and print every node's outputs.
    Run(commands::RunCmd),
    /// Show pipe schemas and Pipe Out labels of a saved UI workflow.
    Schema(commands::SchemaCmd),
}

fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("fabio_pipe_graph=info,fabio_pipe_cli=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(Cli::parse()) {
        tracing::error!("{e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = commands::load_settings(cli.settings.as_deref())?;

    match cli.command {
        Commands::Resolve(cmd) => commands::resolve(&cmd),
        Commands::Nodes(cmd) => commands::nodes(&cmd, &settings),
        Commands::Run(cmd) => commands::run(&cmd, &settings),
        Commands::Schema(cmd) => commands::schema(&cmd),
    }
}
