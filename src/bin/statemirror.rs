//! statemirror CLI
//!
//! Thin plumbing over the library: loads a tree through the engine's
//! bootstrap read, applies a mutation, waits for the coalesced flush and
//! exits. Useful for inspecting and editing mirrored stores from scripts.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use statemirror::backend::{FileBackend, SledBackend, StorageBackend};
use statemirror::config::{BackendKind, MirrorConfig};
use statemirror::engine::PersistenceEngine;
use statemirror::logging::init_logging;
use statemirror::signals::EngineSignal;
use statemirror::state::{MemoryTree, SharedState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

#[derive(Parser)]
#[command(
    name = "statemirror",
    about = "Mirror a JSON data tree to durable storage",
    version
)]
struct Cli {
    /// Storage target: file path, or database directory for the sled backend
    #[arg(short, long)]
    store: PathBuf,

    /// Config file path (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the stored tree, or the subtree at a dot-separated path
    Show {
        path: Option<String>,
    },
    /// Set a value at a dot-separated path and flush
    Set {
        path: String,
        /// JSON value; bare text is treated as a string
        value: String,
    },
    /// Remove the value at a dot-separated path and flush
    Remove {
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = MirrorConfig::load(cli.config.as_deref())?;
    init_logging(Some(&config.logging))?;

    let backend: Arc<dyn StorageBackend> = match config.backend {
        BackendKind::File => Arc::new(
            FileBackend::new(&cli.store).with_pretty_print(config.persistence.pretty_print),
        ),
        BackendKind::Sled => Arc::new(SledBackend::new(&cli.store)?),
    };

    let tree = Arc::new(MemoryTree::new());
    let (flush_tx, mut flush_rx) = unbounded_channel();

    // One-shot invocations flush immediately; the configured throttle only
    // makes sense for long-lived processes.
    let mut persistence = config.persistence.clone();
    persistence.write_delay_ms = 0;

    let engine = PersistenceEngine::builder()
        .shared_state(Arc::clone(&tree) as Arc<dyn SharedState>)
        .backend(backend)
        .config(persistence)
        .on_signal(move |signal| {
            if matches!(signal, EngineSignal::Write | EngineSignal::WriteError(_)) {
                let _ = flush_tx.send(signal.name().to_string());
            }
        })
        .start()
        .await?;

    let result = run_command(cli.command, &tree, &mut flush_rx).await;
    engine.unpersist();
    result
}

async fn run_command(
    command: Command,
    tree: &MemoryTree,
    flush_rx: &mut UnboundedReceiver<String>,
) -> Result<()> {
    match command {
        Command::Show { path } => {
            let path = path.unwrap_or_default();
            let value = tree
                .get(&path)
                .ok_or_else(|| anyhow!("no value at '{}'", path))?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Command::Set { path, value } => {
            tree.set(&path, parse_value(&value));
            wait_for_flush(flush_rx).await?;
            println!("{} {}", "flushed".green(), path);
        }
        Command::Remove { path } => {
            if tree.remove(&path).is_none() {
                return Err(anyhow!("no value at '{}'", path));
            }
            wait_for_flush(flush_rx).await?;
            println!("{} {}", "flushed".green(), path);
        }
    }
    Ok(())
}

/// Parse a CLI value as JSON, falling back to a plain string.
fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

async fn wait_for_flush(flush_rx: &mut UnboundedReceiver<String>) -> Result<()> {
    let signal = tokio::time::timeout(Duration::from_secs(10), flush_rx.recv())
        .await
        .context("timed out waiting for flush")?
        .ok_or_else(|| anyhow!("engine signal stream closed"))?;
    if signal == "write-error" {
        return Err(anyhow!("flush failed, see log for details"));
    }
    Ok(())
}
