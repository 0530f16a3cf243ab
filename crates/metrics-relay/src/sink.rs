// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sink abstraction
//!
//! A [`Sink`] is the remote ingestion endpoint. The batchers guarantee that
//! `publish` is never called with an empty batch or with more records than
//! the policy's `max_batch_size`. Sinks are not assumed idempotent: the
//! durable batcher may replay a batch after a failure.
//!
//! # Implementations
//!
//! - [`RecordingSink`] -- Keeps every batch in memory, can fail on demand
//! - [`JsonLinesSink`] -- Writes each record as a JSON line to a writer

use crate::codec;
use crate::record::MetricRecord;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Failure reported by a sink. Always treated as transient.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Endpoint could not be reached or timed out.
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// Endpoint refused the batch.
    #[error("sink rejected batch: {0}")]
    Rejected(String),
}

/// Remote ingestion endpoint.
pub trait Sink: Send + Sync {
    /// Publish one batch under `namespace`. Blocking.
    fn publish(&self, namespace: &str, batch: &[MetricRecord]) -> Result<(), SinkError>;
}

/// A batch captured by [`RecordingSink`].
#[derive(Debug, Clone)]
pub struct RecordedBatch {
    pub namespace: String,
    pub records: Vec<MetricRecord>,
    pub received_at: Instant,
}

/// In-memory sink that records every accepted batch.
///
/// Failures can be scripted with [`RecordingSink::fail_next`] or
/// [`RecordingSink::set_failing`]; a failed call records nothing.
#[derive(Debug, Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<RecordedBatch>>,
    published: Condvar,
    fail_next: AtomicUsize,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` publish calls.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Fail every publish call until switched off.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Total publish calls, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Accepted batches in arrival order.
    pub fn batches(&self) -> Vec<RecordedBatch> {
        self.lock().clone()
    }

    /// Sizes of accepted batches in arrival order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.lock().iter().map(|b| b.records.len()).collect()
    }

    /// All accepted records, flattened.
    pub fn records(&self) -> Vec<MetricRecord> {
        self.lock()
            .iter()
            .flat_map(|b| b.records.iter().cloned())
            .collect()
    }

    /// Block until at least `count` records were accepted or `timeout` elapses.
    ///
    /// Returns `true` if the count was reached.
    pub fn wait_for_records(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut batches = self.lock();
        loop {
            let total: usize = batches.iter().map(|b| b.records.len()).sum();
            if total >= count {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            batches = match self.published.wait_timeout(batches, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RecordedBatch>> {
        self.batches.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn should_fail(&self) -> bool {
        if self.failing.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Sink for RecordingSink {
    fn publish(&self, namespace: &str, batch: &[MetricRecord]) -> Result<(), SinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail() {
            return Err(SinkError::Unavailable("scripted failure".into()));
        }
        self.lock().push(RecordedBatch {
            namespace: namespace.to_string(),
            records: batch.to_vec(),
            received_at: Instant::now(),
        });
        self.published.notify_all();
        Ok(())
    }
}

/// Sink writing every record as one JSON line.
///
/// The writer is flushed after each batch so a downstream pipe sees whole
/// batches.
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Consume the sink and return the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<W: Write + Send> Sink for JsonLinesSink<W> {
    fn publish(&self, _namespace: &str, batch: &[MetricRecord]) -> Result<(), SinkError> {
        let mut buf = Vec::with_capacity(batch.len() * 96);
        for record in batch {
            codec::encode_line(record, &mut buf)
                .map_err(|e| SinkError::Rejected(e.to_string()))?;
        }

        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writer
            .write_all(&buf)
            .and_then(|()| writer.flush())
            .map_err(|e| SinkError::Unavailable(e.to_string()))
    }
}
