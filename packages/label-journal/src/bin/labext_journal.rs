//! labext-journal - maintenance tool for label journals
//!
//! Usage:
//!   labext-journal <journal> stats
//!   labext-journal <journal> compact [--force]
//!   labext-journal <journal> dump [--json]
//!   labext-journal <journal> get <example-id>
//!
//! Labels are handled as raw strings, so any journal can be inspected
//! regardless of the label type its annotator used.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use labext_journal::journal::{self, Replay, ReplayOptions};
use labext_journal::{JournalError, LabelStore, RawCodec, StoreConfig};

#[derive(Parser)]
#[command(name = "labext-journal", version, about = "Inspect and compact label journals")]
struct Cli {
    /// Path to the journal file
    journal: PathBuf,

    /// JSON store config (duplication_ratio, compact_on_open, durability)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the duplication ratio that triggers compaction
    #[arg(long)]
    ratio: Option<f64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay the journal and print its statistics, without modifying it
    Stats,
    /// Compact the journal if the policy says so (or always, with --force)
    Compact {
        #[arg(long)]
        force: bool,
    },
    /// Print the current labels
    Dump {
        /// One JSON object instead of tab-separated lines
        #[arg(long)]
        json: bool,
    },
    /// Print the label of one example
    Get { example_id: String },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => StoreConfig::read_from(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => StoreConfig::default(),
    };
    if let Some(ratio) = cli.ratio {
        config.duplication_ratio = ratio;
    }
    config.validate()?;

    match cli.command {
        Command::Stats => stats(&cli.journal, &config),
        Command::Compact { force } => compact(&cli.journal, config, force),
        Command::Dump { json } => dump(&cli.journal, &config, json),
        Command::Get { example_id } => {
            let replay = load(&cli.journal, &config)?;
            let label = replay
                .labels
                .get(&example_id)
                .ok_or(JournalError::KeyNotFound(example_id))?;
            println!("{}", label);
            Ok(())
        }
    }
}

/// Replay without touching the file: no recovery, truncation or compaction.
fn load(path: &Path, config: &StoreConfig) -> Result<Replay<String>> {
    let options = ReplayOptions {
        tolerate_torn_tail: config.tolerate_torn_tail,
    };
    journal::replay_with(path, &RawCodec, options)
        .with_context(|| format!("failed to replay {}", path.display()))
}

fn stats(path: &Path, config: &StoreConfig) -> Result<()> {
    let replay = load(path, config)?;
    let report = serde_json::json!({
        "path": path.display().to_string(),
        "exists": replay.existed,
        "labels": replay.labels.len(),
        "valid_len": replay.valid_len,
        "stats": replay.stats,
        "duplication_ratio": replay.stats.duplication_ratio(),
        "would_compact": journal::should_compact(&replay.stats, config.duplication_ratio),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn compact(path: &Path, config: StoreConfig, force: bool) -> Result<()> {
    // Opening a store creates a missing journal.
    if !path.is_file() {
        bail!("no journal at {}", path.display());
    }

    let ratio = config.duplication_ratio;
    let mut store = LabelStore::open_with_config(
        path,
        RawCodec,
        StoreConfig {
            compact_on_open: false,
            ..config
        },
    )
    .with_context(|| format!("failed to open {}", path.display()))?;

    let stats = *store.stats();
    if !force && !journal::should_compact(&stats, ratio) {
        tracing::info!(
            duplicates = stats.duplicate_writes,
            distinct = stats.distinct_keys,
            "journal below compaction threshold, nothing to do"
        );
        return Ok(());
    }

    let result = store.compact()?;
    tracing::info!(
        records = result.records_written,
        bytes = result.bytes_written,
        duration_ms = result.duration_ms,
        "journal compacted"
    );
    Ok(())
}

fn dump(path: &Path, config: &StoreConfig, json: bool) -> Result<()> {
    let replay = load(path, config)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &replay.labels)?;
        writeln!(out)?;
    } else {
        for (example_id, label) in &replay.labels {
            journal::write_record(&mut out, example_id, label)?;
        }
    }
    Ok(())
}
