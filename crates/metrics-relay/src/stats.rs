// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Flush statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a batcher's counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlushStats {
    /// Worker cycles (queue windows or directory scans) completed
    pub cycles: u64,
    /// Sink calls that succeeded
    pub batches_published: u64,
    /// Records delivered by successful sink calls
    pub records_published: u64,
    /// Sink calls that failed
    pub publish_failures: u64,
    /// Records lost to sink failures or shutdown (in-memory batcher only)
    pub records_dropped: u64,
    /// Buffer lines skipped because they did not decode
    pub malformed_lines: u64,
    /// Buffer files removed after retention
    pub files_deleted: u64,
}

/// Live counters shared between a batcher and its worker.
#[derive(Debug, Default)]
pub(crate) struct FlushCounters {
    cycles: AtomicU64,
    batches_published: AtomicU64,
    records_published: AtomicU64,
    publish_failures: AtomicU64,
    records_dropped: AtomicU64,
    malformed_lines: AtomicU64,
    files_deleted: AtomicU64,
}

impl FlushCounters {
    pub(crate) fn cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn published(&self, records: usize) {
        self.batches_published.fetch_add(1, Ordering::Relaxed);
        self.records_published
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    pub(crate) fn failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dropped(&self, records: usize) {
        self.records_dropped
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    pub(crate) fn malformed(&self) {
        self.malformed_lines.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn deleted(&self) {
        self.files_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> FlushStats {
        FlushStats {
            cycles: self.cycles.load(Ordering::Relaxed),
            batches_published: self.batches_published.load(Ordering::Relaxed),
            records_published: self.records_published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            malformed_lines: self.malformed_lines.load(Ordering::Relaxed),
            files_deleted: self.files_deleted.load(Ordering::Relaxed),
        }
    }
}
