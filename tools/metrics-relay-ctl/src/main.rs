// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! metrics-relay-ctl - Inspect and drain metrics-relay buffer directories
//!
//! # Usage
//!
//! ```bash
//! # Append a record to the current hour's buffer file
//! metrics-relay-ctl push --dir /var/spool/metrics api.latency 12.5 --unit milliseconds
//!
//! # Show buffer files and their checkpoints
//! metrics-relay-ctl status --dir /var/spool/metrics
//!
//! # Drain to stdout as JSON lines until Ctrl+C
//! metrics-relay-ctl drain --dir /var/spool/metrics --namespace checkout
//!
//! # Single cycle using a YAML config
//! metrics-relay-ctl drain --config relay.yaml --once
//! ```
//!
//! Logs go to stderr; stdout only carries drained records.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use metrics_relay::buffer::{self, HourBucket};
use metrics_relay::{
    CheckpointStore, DurableBatcher, FileDrainer, FileState, FlushStats, JsonLinesSink,
    MetricRecord, RelayConfig, Unit,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "metrics-relay-ctl")]
#[command(about = "Inspect and drain metrics-relay buffer directories", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drain buffer files to stdout as JSON lines
    Drain {
        /// YAML configuration file (overrides --dir and --namespace)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Buffer directory
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Namespace passed to the sink
        #[arg(short, long, default_value = "metrics-relay")]
        namespace: String,

        /// Milliseconds between drain cycles
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Retention window in milliseconds for processed files
        #[arg(long)]
        retention_ms: Option<u64>,

        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },
    /// List buffer files with their checkpoints
    Status {
        /// Buffer directory
        #[arg(short, long)]
        dir: PathBuf,
    },
    /// Append one record to the current hour's buffer file
    Push {
        /// Buffer directory
        #[arg(short, long)]
        dir: PathBuf,

        /// Metric name
        name: String,

        /// Metric value
        value: f64,

        /// Metric unit
        #[arg(short, long, value_enum, default_value_t = UnitArg::Count)]
        unit: UnitArg,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum UnitArg {
    Count,
    Milliseconds,
}

impl From<UnitArg> for Unit {
    fn from(unit: UnitArg) -> Self {
        match unit {
            UnitArg::Count => Unit::Count,
            UnitArg::Milliseconds => Unit::Milliseconds,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Drain {
            config,
            dir,
            namespace,
            interval_ms,
            retention_ms,
            once,
        } => {
            let mut config = match (config, dir) {
                (Some(path), _) => RelayConfig::from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                (None, Some(dir)) => RelayConfig::builder()
                    .buffer_dir(dir)
                    .namespace(namespace)
                    .build(),
                (None, None) => bail!("either --config or --dir is required"),
            };
            if let Some(ms) = interval_ms {
                config.millis_between_run = ms;
            }
            if let Some(ms) = retention_ms {
                config.retention_period_millis = ms;
            }
            config.validate()?;

            if once {
                drain_once(&config)
            } else {
                drain(&config)
            }
        }
        Commands::Status { dir } => status(&dir),
        Commands::Push {
            dir,
            name,
            value,
            unit,
        } => push(&dir, name, value, unit.into()),
    }
}

fn drain_once(config: &RelayConfig) -> Result<()> {
    let sink = Arc::new(JsonLinesSink::new(std::io::stdout()));
    let drainer = FileDrainer::new(sink, config)?;
    drainer.run_cycle()?;
    log_stats(&drainer.stats());
    Ok(())
}

fn drain(config: &RelayConfig) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let sink = Arc::new(JsonLinesSink::new(std::io::stdout()));
    let batcher = DurableBatcher::new(sink, config)?;
    tracing::info!("Draining {} (Ctrl+C to stop)", config.buffer_dir.display());

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    batcher.shutdown();
    log_stats(&batcher.stats());
    Ok(())
}

fn log_stats(stats: &FlushStats) {
    tracing::info!(
        "{} cycles, {} records in {} batches, {} failed publishes, {} malformed lines, {} files deleted",
        stats.cycles,
        stats.records_published,
        stats.batches_published,
        stats.publish_failures,
        stats.malformed_lines,
        stats.files_deleted
    );
}

fn status(dir: &Path) -> Result<()> {
    let files = buffer::list_buffer_files(dir)
        .with_context(|| format!("listing {}", dir.display()))?;
    let store = CheckpointStore::new(dir);

    if files.is_empty() {
        println!("No buffer files in {}", dir.display());
        return Ok(());
    }

    println!(
        "{:<36} {:>12} {:>12} {:<16} LAST UPDATE",
        "FILE", "LENGTH", "CONSUMED", "STATE"
    );
    for file in files {
        let len = std::fs::metadata(&file.path)?.len();
        match store.load(&file.name) {
            Ok(checkpoint) => {
                let state = FileState::classify(store.exists(&file.name), checkpoint, len);
                println!(
                    "{:<36} {:>12} {:>12} {:<16} {}",
                    file.name,
                    len,
                    checkpoint.bytes_consumed,
                    state.to_string(),
                    format_millis(checkpoint.last_update_ms)
                );
            }
            Err(e) => println!("{:<36} {:>12} {:>12} {:<16} {}", file.name, len, "-", "corrupt", e),
        }
    }
    Ok(())
}

fn format_millis(millis: i64) -> String {
    if millis <= 0 {
        return "-".to_string();
    }
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn push(dir: &Path, name: String, value: f64, unit: Unit) -> Result<()> {
    buffer::prepare_dir(dir)?;
    let record = MetricRecord::now(name, value, unit)?;
    let bucket = HourBucket::current();
    let bytes = buffer::append_records(dir, bucket, std::slice::from_ref(&record))?;
    tracing::info!(
        "Appended {} ({} bytes) to {}",
        record.name(),
        bytes,
        bucket.file_name()
    );
    Ok(())
}
