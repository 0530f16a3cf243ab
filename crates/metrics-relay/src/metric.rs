// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Timed metric facade over a [`MetricsPublisher`].
//!
//! ```rust,no_run
//! # use metrics_relay::{MetricsFactory, PublisherMetricsFactory, Metric};
//! # fn demo(factory: &PublisherMetricsFactory) -> metrics_relay::Result<()> {
//! let mut metric = factory.new_metric("checkout")?;
//! metric.open();
//! metric.add_measure("items", 3.0)?;
//! metric.close()?; // publishes checkout.items and checkout.Duration
//! # Ok(())
//! # }
//! ```

use crate::error::{RelayError, Result};
use crate::publisher::MetricsPublisher;
use crate::record::{now_millis, MetricRecord, Unit};
use std::sync::Arc;

const DURATION_SUFFIX: &str = "Duration";

/// A named unit of work that collects measures between `open` and `close`.
pub trait Metric {
    /// Start timing.
    fn open(&mut self);

    /// Record a `Count` measure named `<metric>.<name>`.
    fn add_measure(&mut self, name: &str, value: f64) -> Result<()>;

    /// Append `<metric>.Duration` and hand everything to the publisher.
    fn close(&mut self) -> Result<()>;

    /// Discard collected measures.
    fn reset_measures(&mut self);
}

/// Metric that publishes through a [`MetricsPublisher`] on `close`.
pub struct TimedMetric {
    publisher: Arc<dyn MetricsPublisher>,
    name: String,
    measures: Vec<MetricRecord>,
    opened_at_ms: Option<i64>,
}

impl TimedMetric {
    pub fn new(publisher: Arc<dyn MetricsPublisher>, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RelayError::InvalidRecord(
                "metric name cannot be blank".to_string(),
            ));
        }
        Ok(Self {
            publisher,
            name,
            measures: Vec::new(),
            opened_at_ms: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Measures collected since the last close or reset.
    pub fn measures(&self) -> &[MetricRecord] {
        &self.measures
    }

    fn opened_at(&self) -> Result<i64> {
        self.opened_at_ms.ok_or_else(|| {
            RelayError::InvalidRecord(format!("metric {} was not opened", self.name))
        })
    }
}

impl Metric for TimedMetric {
    fn open(&mut self) {
        self.opened_at_ms = Some(now_millis());
    }

    fn add_measure(&mut self, name: &str, value: f64) -> Result<()> {
        if name.trim().is_empty() {
            return Err(RelayError::InvalidRecord(
                "measure name cannot be blank".to_string(),
            ));
        }
        self.opened_at()?;
        let record = MetricRecord::now(format!("{}.{}", self.name, name), value, Unit::Count)?;
        self.measures.push(record);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let opened_at = self.opened_at()?;
        let now = now_millis();
        let elapsed = now.saturating_sub(opened_at).max(0) as f64;

        self.measures.push(MetricRecord::new(
            format!("{}.{}", self.name, DURATION_SUFFIX),
            elapsed,
            Unit::Milliseconds,
            now,
        )?);

        let result = self.publisher.publish(&self.measures);
        self.reset_measures();
        if let Err(e) = &result {
            tracing::info!("Failed to publish metric {}: {}", self.name, e);
        }
        result
    }

    fn reset_measures(&mut self) {
        self.measures.clear();
    }
}

/// Metric that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpMetric;

impl Metric for NoOpMetric {
    fn open(&mut self) {}

    fn add_measure(&mut self, _name: &str, _value: f64) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn reset_measures(&mut self) {}
}

/// Creates metrics by name.
pub trait MetricsFactory {
    type Metric: Metric;

    fn new_metric(&self, name: &str) -> Result<Self::Metric>;
}

/// Factory of [`TimedMetric`]s sharing one publisher.
#[derive(Clone)]
pub struct PublisherMetricsFactory {
    publisher: Arc<dyn MetricsPublisher>,
}

impl PublisherMetricsFactory {
    pub fn new(publisher: Arc<dyn MetricsPublisher>) -> Self {
        Self { publisher }
    }
}

impl MetricsFactory for PublisherMetricsFactory {
    type Metric = TimedMetric;

    fn new_metric(&self, name: &str) -> Result<TimedMetric> {
        TimedMetric::new(Arc::clone(&self.publisher), name)
    }
}
