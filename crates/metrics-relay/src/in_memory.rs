// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory batcher
//!
//! Producers push records into an unbounded crossbeam queue. One worker
//! thread drains it in windows:
//!
//! 1. Open a window at `now`
//! 2. Pull records until `max_batch_size` are collected or `max_wait` elapsed
//! 3. Publish the batch if non-empty
//!
//! A failed publish drops the batch (logged, counted); there is no retry.

use crate::error::{RelayError, Result};
use crate::policy::BatchPolicy;
use crate::publisher::MetricsPublisher;
use crate::record::MetricRecord;
use crate::sink::Sink;
use crate::stats::{FlushCounters, FlushStats};
use crate::worker::WorkerHandle;
use crossbeam::channel::{self, select, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Low-latency, best-effort batcher backed by a concurrent queue.
pub struct InMemoryBatcher {
    tx: Sender<MetricRecord>,
    closed: AtomicBool,
    worker: Mutex<WorkerHandle>,
    counters: Arc<FlushCounters>,
}

impl InMemoryBatcher {
    /// Validate arguments and start the worker thread.
    pub fn new(
        sink: Arc<dyn Sink>,
        namespace: impl Into<String>,
        policy: BatchPolicy,
    ) -> Result<Self> {
        let namespace = namespace.into();
        if namespace.trim().is_empty() {
            return Err(RelayError::config("namespace cannot be blank"));
        }
        policy.validate()?;

        let (tx, rx) = channel::unbounded();
        let counters = Arc::new(FlushCounters::default());

        let worker = QueueWorker {
            rx,
            sink,
            namespace,
            policy,
            counters: Arc::clone(&counters),
        };
        let handle = WorkerHandle::spawn("metrics-relay-queue", move |stop_rx| {
            worker.run(&stop_rx)
        })?;

        tracing::info!(
            "InMemoryBatcher started (batch={}, wait={:?})",
            policy.max_batch_size,
            policy.max_wait
        );

        Ok(Self {
            tx,
            closed: AtomicBool::new(false),
            worker: Mutex::new(handle),
            counters,
        })
    }

    /// Queue one record. Never blocks beyond the queue insertion.
    pub fn enqueue(&self, record: MetricRecord) -> Result<()> {
        if self.is_closed() {
            return Err(RelayError::ChannelClosed);
        }
        self.tx.send(record).map_err(|_| RelayError::ChannelClosed)
    }

    /// Records waiting in the queue.
    pub fn pending(&self) -> usize {
        self.tx.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> FlushStats {
        self.counters.snapshot()
    }

    /// Reject further records, let the worker finish its window and join it.
    ///
    /// Records still queued when the worker exits are abandoned.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut worker = self.worker.lock().unwrap_or_else(|e| e.into_inner());
        worker.stop();
        tracing::info!("InMemoryBatcher stopped");
    }
}

impl MetricsPublisher for InMemoryBatcher {
    fn publish(&self, records: &[MetricRecord]) -> Result<()> {
        for record in records {
            self.enqueue(record.clone())?;
        }
        tracing::trace!("Queued {} metrics", records.len());
        Ok(())
    }

    fn close(&self) {
        self.shutdown();
    }
}

impl Drop for InMemoryBatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct QueueWorker {
    rx: Receiver<MetricRecord>,
    sink: Arc<dyn Sink>,
    namespace: String,
    policy: BatchPolicy,
    counters: Arc<FlushCounters>,
}

impl QueueWorker {
    fn run(&self, stop_rx: &Receiver<()>) {
        loop {
            let (batch, stop) = self.collect_window(stop_rx);
            self.counters.cycle();
            if !batch.is_empty() {
                self.flush(batch);
            }
            if stop {
                break;
            }
        }

        let abandoned = self.rx.len();
        if abandoned > 0 {
            self.counters.dropped(abandoned);
            tracing::warn!("Abandoning {} queued metrics on shutdown", abandoned);
        }
    }

    /// Collect one window. The flag is `true` when the worker must exit.
    fn collect_window(&self, stop_rx: &Receiver<()>) -> (Vec<MetricRecord>, bool) {
        let deadline = Instant::now() + self.policy.max_wait;
        let mut batch = Vec::with_capacity(self.policy.max_batch_size);

        while batch.len() < self.policy.max_batch_size {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            select! {
                recv(self.rx) -> msg => match msg {
                    Ok(record) => batch.push(record),
                    Err(_) => return (batch, true),
                },
                recv(stop_rx) -> _ => return (batch, true),
                default(remaining) => break,
            }
        }
        (batch, false)
    }

    fn flush(&self, batch: Vec<MetricRecord>) {
        let n = batch.len();
        match self.sink.publish(&self.namespace, &batch) {
            Ok(()) => {
                self.counters.published(n);
                tracing::debug!("Published {} metrics in a batch", n);
            }
            Err(e) => {
                self.counters.failed();
                self.counters.dropped(n);
                tracing::warn!("Dropping batch of {} metrics: {}", n, e);
            }
        }
    }
}
