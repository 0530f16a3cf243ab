// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Batching policy shared by both batchers.
//!
//! A batch is flushed when it holds `max_batch_size` records or when
//! `max_wait` has elapsed since the window opened. Fully processed buffer
//! files are kept for `retention` after their last checkpoint update.

use crate::error::{RelayError, Result};
use std::time::Duration;

/// Maximum records per sink call (the ingestion endpoint's per-call ceiling).
pub const DEFAULT_MAX_BATCH_SIZE: usize = 18;

/// Default window length for a partially filled batch.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(1000);

/// Default retention of fully processed buffer files (3 hours).
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(3 * 3600);

/// Immutable batching parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    /// Maximum records per batch.
    pub max_batch_size: usize,
    /// Maximum time a partially filled batch waits before flushing.
    pub max_wait: Duration,
    /// Idle time after which a fully processed buffer file is deleted.
    pub retention: Duration,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_wait: DEFAULT_MAX_WAIT,
            retention: DEFAULT_RETENTION,
        }
    }
}

impl BatchPolicy {
    /// Set the maximum batch size.
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Set the window length.
    pub fn with_max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = wait;
        self
    }

    /// Set the retention window.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Reject zero sizes and zero durations.
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(RelayError::config("max batch size must be positive"));
        }
        if self.max_wait.is_zero() {
            return Err(RelayError::config("max wait time must be positive"));
        }
        validate_retention(self.retention)
    }
}

pub(crate) fn validate_retention(retention: Duration) -> Result<()> {
    if retention.as_millis() == 0 {
        return Err(RelayError::config(
            "retention period must be at least one millisecond",
        ));
    }
    Ok(())
}
