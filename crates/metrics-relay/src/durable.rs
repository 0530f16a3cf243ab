// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Durable batcher
//!
//! Producers append JSON lines to the buffer file of the current hour. A
//! single worker drains the buffer directory at a fixed interval:
//!
//! ```text
//! producer -> metrics-logs-YYYY-MM-DD-HH.log -> FileDrainer -> Sink
//!                                                   |
//!                                                   v
//!                            metrics-logs-YYYY-MM-DD-HH.properties
//! ```
//!
//! The checkpoint of a file only moves after the sink accepted the records it
//! covers, so a crash or a failing sink replays lines instead of losing them.

use crate::buffer::{self, BufferFile, HourBucket};
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::codec::{self, LINE_TERMINATOR};
use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::policy;
use crate::publisher::MetricsPublisher;
use crate::record::{now_millis, MetricRecord};
use crate::sink::Sink;
use crate::stats::{FlushCounters, FlushStats};
use crate::worker::WorkerHandle;
use crossbeam::channel::{Receiver, RecvTimeoutError};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Processing state of a buffer file, derived from its checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// No sidecar yet
    New,
    /// Some bytes left to drain
    InProgress,
    /// Every byte flushed; eligible for deletion once retention elapsed
    FullyProcessed,
}

impl FileState {
    pub fn classify(has_sidecar: bool, checkpoint: Checkpoint, file_len: u64) -> Self {
        if !has_sidecar {
            Self::New
        } else if checkpoint.bytes_consumed >= file_len {
            Self::FullyProcessed
        } else {
            Self::InProgress
        }
    }
}

impl std::fmt::Display for FileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::InProgress => write!(f, "in-progress"),
            Self::FullyProcessed => write!(f, "fully-processed"),
        }
    }
}

/// Outcome of a flush attempt.
enum Flush {
    Advanced,
    SinkFailed,
}

/// Drains the buffer directory into a sink, one cycle at a time.
///
/// Usable standalone (one-shot drains) or driven by [`DurableBatcher`].
pub struct FileDrainer {
    dir: PathBuf,
    sink: Arc<dyn Sink>,
    namespace: String,
    max_batch_size: usize,
    retention_ms: AtomicU64,
    checkpoints: CheckpointStore,
    counters: FlushCounters,
    /// Serializes cycles so a single writer owns the checkpoints.
    cycle_lock: Mutex<()>,
}

impl FileDrainer {
    /// Validate `config` and prepare the buffer directory.
    pub fn new(sink: Arc<dyn Sink>, config: &RelayConfig) -> Result<Self> {
        config.validate()?;
        buffer::prepare_dir(&config.buffer_dir)?;

        Ok(Self {
            dir: config.buffer_dir.clone(),
            sink,
            namespace: config.namespace.clone(),
            max_batch_size: config.max_batch_size,
            retention_ms: AtomicU64::new(config.retention_period_millis),
            checkpoints: CheckpointStore::new(&config.buffer_dir),
            counters: FlushCounters::default(),
            cycle_lock: Mutex::new(()),
        })
    }

    pub fn buffer_dir(&self) -> &Path {
        &self.dir
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    pub fn stats(&self) -> FlushStats {
        self.counters.snapshot()
    }

    /// Override the retention window. Applies from the next cycle.
    pub fn set_retention_window(&self, retention: Duration) -> Result<()> {
        policy::validate_retention(retention)?;
        let millis = u64::try_from(retention.as_millis()).unwrap_or(u64::MAX);
        self.retention_ms.store(millis, Ordering::Relaxed);
        tracing::info!("Retention window set to {:?}", retention);
        Ok(())
    }

    pub fn retention_window(&self) -> Duration {
        Duration::from_millis(self.retention_ms.load(Ordering::Relaxed))
    }

    /// Run one cycle over every buffer file, oldest bucket first.
    ///
    /// Errors on one file are logged and do not stop the cycle. Only a
    /// failure to list the directory is returned.
    pub fn run_cycle(&self) -> Result<()> {
        let _guard = self.cycle_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.counters.cycle();

        let files = buffer::list_buffer_files(&self.dir)?;
        let current = HourBucket::current();

        for file in &files {
            if let Err(e) = self.process_file(file, current) {
                tracing::warn!("Failed to process {}: {}", file.name, e);
            }
        }
        Ok(())
    }

    fn process_file(&self, file: &BufferFile, current: HourBucket) -> Result<()> {
        let checkpoint = self.checkpoints.load(&file.name)?;
        let has_sidecar = self.checkpoints.exists(&file.name);
        let file_len = fs::metadata(&file.path)?.len();

        match FileState::classify(has_sidecar, checkpoint, file_len) {
            FileState::FullyProcessed => {
                if !checkpoint.is_fully_processed(file_len) {
                    tracing::warn!(
                        "Checkpoint of {} is past the end of the file ({} > {})",
                        file.name,
                        checkpoint.bytes_consumed,
                        file_len
                    );
                } else if self.is_expired(checkpoint) && file.bucket != current {
                    self.delete_file(file)?;
                }
                Ok(())
            }
            FileState::New | FileState::InProgress => {
                self.drain_file(file, checkpoint.bytes_consumed, file.bucket != current)
            }
        }
    }

    fn is_expired(&self, checkpoint: Checkpoint) -> bool {
        let idle = now_millis().saturating_sub(checkpoint.last_update_ms);
        idle > 0 && idle as u64 > self.retention_ms.load(Ordering::Relaxed)
    }

    fn delete_file(&self, file: &BufferFile) -> Result<()> {
        // Buffer file before sidecar; a buffer without its sidecar replays from 0.
        fs::remove_file(&file.path)?;
        self.checkpoints.delete(&file.name)?;
        self.counters.deleted();
        tracing::info!("Deleted fully processed buffer file {}", file.name);
        Ok(())
    }

    /// Drain `file` from `offset`.
    ///
    /// A file of a past hour is `sealed`: nothing appends to it anymore, so an
    /// unterminated tail is a torn write and is consumed like any other line.
    fn drain_file(&self, file: &BufferFile, offset: u64, sealed: bool) -> Result<()> {
        let mut reader = BufReader::new(File::open(&file.path)?);
        reader.seek(SeekFrom::Start(offset))?;

        let mut batch = Vec::with_capacity(self.max_batch_size);
        let mut pending_bytes = 0u64;
        let mut line = Vec::new();

        loop {
            line.clear();
            let n = reader.read_until(LINE_TERMINATOR, &mut line)?;
            if n == 0 {
                break;
            }
            if line.last() != Some(&LINE_TERMINATOR) {
                if !sealed {
                    tracing::trace!("Incomplete line at the end of {}, retrying", file.name);
                    break;
                }
                tracing::warn!("Torn write of {} bytes at the end of {}", n, file.name);
            }
            pending_bytes += n as u64;

            match codec::decode(&line) {
                Ok(record) => batch.push(record),
                Err(e) => {
                    self.counters.malformed();
                    tracing::warn!("Skipping malformed line in {}: {}", file.name, e);
                }
            }

            if batch.len() >= self.max_batch_size {
                if let Flush::SinkFailed = self.flush(file, &mut batch, &mut pending_bytes)? {
                    return Ok(());
                }
            }
        }

        if pending_bytes > 0 {
            self.flush(file, &mut batch, &mut pending_bytes)?;
        }
        Ok(())
    }

    /// Publish `batch` and advance the checkpoint by `pending_bytes`.
    ///
    /// An empty batch (only malformed lines) advances without a sink call.
    fn flush(
        &self,
        file: &BufferFile,
        batch: &mut Vec<MetricRecord>,
        pending_bytes: &mut u64,
    ) -> Result<Flush> {
        if !batch.is_empty() {
            if let Err(e) = self.sink.publish(&self.namespace, batch) {
                self.counters.failed();
                tracing::warn!(
                    "Sink rejected {} metrics from {}: {}. Retrying next cycle.",
                    batch.len(),
                    file.name,
                    e
                );
                return Ok(Flush::SinkFailed);
            }
            self.counters.published(batch.len());
            tracing::debug!("Published {} metrics from {}", batch.len(), file.name);
        }

        if let Err(e) = self.checkpoints.advance(&file.name, *pending_bytes) {
            tracing::error!(
                "Failed to persist checkpoint for {}: {}. Lines will be replayed.",
                file.name,
                e
            );
            return Err(e);
        }

        batch.clear();
        *pending_bytes = 0;
        Ok(Flush::Advanced)
    }
}

/// Crash-tolerant batcher backed by hour-bucketed buffer files.
pub struct DurableBatcher {
    drainer: Arc<FileDrainer>,
    closed: AtomicBool,
    worker: Mutex<WorkerHandle>,
}

impl DurableBatcher {
    /// Validate `config`, prepare the buffer directory and start the worker.
    pub fn new(sink: Arc<dyn Sink>, config: &RelayConfig) -> Result<Self> {
        let drainer = Arc::new(FileDrainer::new(sink, config)?);
        let interval = config.run_interval();

        let worker_drainer = Arc::clone(&drainer);
        let handle = WorkerHandle::spawn("metrics-relay-drain", move |stop_rx| {
            drain_loop(&worker_drainer, &stop_rx, interval)
        })?;

        tracing::info!(
            "DurableBatcher started (dir={}, interval={:?}, batch={})",
            config.buffer_dir.display(),
            interval,
            config.max_batch_size
        );

        Ok(Self {
            drainer,
            closed: AtomicBool::new(false),
            worker: Mutex::new(handle),
        })
    }

    /// Append one record to the current hour's buffer file.
    pub fn enqueue(&self, record: MetricRecord) -> Result<()> {
        self.append(std::slice::from_ref(&record))
    }

    fn append(&self, records: &[MetricRecord]) -> Result<()> {
        if self.is_closed() {
            return Err(RelayError::ChannelClosed);
        }
        let bytes =
            buffer::append_records(self.drainer.buffer_dir(), HourBucket::current(), records)?;
        tracing::trace!("Appended {} metrics ({} bytes)", records.len(), bytes);
        Ok(())
    }

    /// Override the retention window (default 3 h).
    pub fn set_retention_window(&self, retention: Duration) -> Result<()> {
        self.drainer.set_retention_window(retention)
    }

    /// Run one drain cycle on the calling thread.
    pub fn run_cycle_now(&self) -> Result<()> {
        self.drainer.run_cycle()
    }

    pub fn buffer_dir(&self) -> &Path {
        self.drainer.buffer_dir()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> FlushStats {
        self.drainer.stats()
    }

    /// Reject further appends, interrupt the sleep between cycles and join
    /// the worker once its current cycle is done.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut worker = self.worker.lock().unwrap_or_else(|e| e.into_inner());
        worker.stop();
        tracing::info!("DurableBatcher stopped");
    }
}

impl MetricsPublisher for DurableBatcher {
    fn publish(&self, records: &[MetricRecord]) -> Result<()> {
        self.append(records)
    }

    fn close(&self) {
        self.shutdown();
    }
}

impl Drop for DurableBatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn drain_loop(drainer: &FileDrainer, stop_rx: &Receiver<()>, interval: Duration) {
    loop {
        if let Err(e) = drainer.run_cycle() {
            tracing::warn!(
                "Drain cycle failed on {}: {}",
                drainer.buffer_dir().display(),
                e
            );
        }
        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            _ => break,
        }
    }
}
