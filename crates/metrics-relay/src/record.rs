// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Metric record model.
//!
//! A [`MetricRecord`] is a single named measurement. Records are validated
//! on construction and immutable afterwards; the serde representation is the
//! buffer wire format (see [`crate::codec`]).

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit attached to a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    /// Dimensionless count.
    Count,
    /// Duration in milliseconds.
    Milliseconds,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Count => write!(f, "Count"),
            Unit::Milliseconds => write!(f, "Milliseconds"),
        }
    }
}

/// A single measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRecord")]
pub struct MetricRecord {
    #[serde(rename = "MetricName")]
    name: String,
    #[serde(rename = "Value")]
    value: f64,
    #[serde(rename = "Unit")]
    unit: Unit,
    /// Unix epoch milliseconds.
    #[serde(rename = "Timestamp")]
    timestamp_ms: i64,
}

/// Unvalidated wire shape; converted through [`MetricRecord::new`].
#[derive(Deserialize)]
struct RawRecord {
    #[serde(rename = "MetricName")]
    name: String,
    #[serde(rename = "Value")]
    value: f64,
    #[serde(rename = "Unit")]
    unit: Unit,
    #[serde(rename = "Timestamp")]
    timestamp_ms: i64,
}

impl TryFrom<RawRecord> for MetricRecord {
    type Error = RelayError;

    fn try_from(raw: RawRecord) -> Result<Self> {
        MetricRecord::new(raw.name, raw.value, raw.unit, raw.timestamp_ms)
    }
}

impl MetricRecord {
    /// Create a record.
    ///
    /// Fails with [`RelayError::InvalidRecord`] if the name is blank or the
    /// value is not finite (JSON cannot carry NaN or infinities).
    pub fn new(name: impl Into<String>, value: f64, unit: Unit, timestamp_ms: i64) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RelayError::InvalidRecord(
                "metric name cannot be blank".into(),
            ));
        }
        if !value.is_finite() {
            return Err(RelayError::InvalidRecord(format!(
                "value of '{}' is not finite: {}",
                name, value
            )));
        }
        Ok(Self {
            name,
            value,
            unit,
            timestamp_ms,
        })
    }

    /// Create a record stamped with the current wall-clock time.
    pub fn now(name: impl Into<String>, value: f64, unit: Unit) -> Result<Self> {
        Self::new(name, value, unit, now_millis())
    }

    /// Shorthand for a [`Unit::Count`] record stamped now.
    pub fn count(name: impl Into<String>, value: f64) -> Result<Self> {
        Self::now(name, value, Unit::Count)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    /// Unix epoch milliseconds.
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }
}

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
