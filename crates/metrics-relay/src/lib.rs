// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Metrics Relay
//!
//! Asynchronous batching of metric records toward a remote sink.
//!
//! # Features
//!
//! - **InMemoryBatcher** -- Concurrent queue drained in time/size windows, best effort
//! - **DurableBatcher** -- Hour-bucketed buffer files with byte-offset checkpoints,
//!   at-least-once delivery across crashes and sink outages
//! - **Retention** -- Fully processed buffer files are removed after an idle window
//! - **Metric facade** -- Timed metrics publishing through either batcher
//!
//! # Architecture
//!
//! ```text
//! producer --publish--> InMemoryBatcher --queue--> worker --> Sink
//!
//! producer --publish--> DurableBatcher --append--> metrics-logs-*.log
//!                                                      |
//!                                     FileDrainer <----+----> *.properties
//!                                          |
//!                                          v
//!                                         Sink
//! ```
//!
//! # Example
//!
//! ```no_run
//! use metrics_relay::{DurableBatcher, JsonLinesSink, MetricRecord, RelayConfig};
//! use std::sync::Arc;
//!
//! # fn main() -> metrics_relay::Result<()> {
//! let config = RelayConfig::builder()
//!     .buffer_dir("/var/spool/metrics")
//!     .namespace("checkout")
//!     .build();
//!
//! let sink = Arc::new(JsonLinesSink::new(std::io::stdout()));
//! let batcher = DurableBatcher::new(sink, &config)?;
//! batcher.enqueue(MetricRecord::count("orders.placed", 1.0)?)?;
//! batcher.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod checkpoint;
pub mod codec;
pub mod config;
pub mod durable;
pub mod error;
pub mod in_memory;
pub mod metric;
pub mod policy;
pub mod publisher;
pub mod record;
pub mod sink;
pub mod stats;
mod worker;

pub use buffer::{BufferFile, HourBucket};
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use codec::CodecError;
pub use config::{ConfigError, RelayConfig, RelayConfigBuilder};
pub use durable::{DurableBatcher, FileDrainer, FileState};
pub use error::{RelayError, Result};
pub use in_memory::InMemoryBatcher;
pub use metric::{Metric, MetricsFactory, NoOpMetric, PublisherMetricsFactory, TimedMetric};
pub use policy::BatchPolicy;
pub use publisher::MetricsPublisher;
pub use record::{MetricRecord, Unit};
pub use sink::{JsonLinesSink, RecordedBatch, RecordingSink, Sink, SinkError};
pub use stats::FlushStats;
