// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Producer-facing publisher trait.

use crate::error::Result;
use crate::record::MetricRecord;

/// Hands records to a background batcher without waiting for the sink.
///
/// # Implementations
///
/// - [`crate::InMemoryBatcher`] -- queue, best effort
/// - [`crate::DurableBatcher`] -- buffer files, at least once
pub trait MetricsPublisher: Send + Sync {
    /// Accept `records` for asynchronous delivery.
    ///
    /// Fails with [`crate::RelayError::ChannelClosed`] after [`close`](Self::close).
    fn publish(&self, records: &[MetricRecord]) -> Result<()>;

    /// Stop accepting records and stop the worker after its current cycle.
    fn close(&self);
}
