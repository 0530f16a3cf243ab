// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Relay configuration
//!
//! Can be built in code or loaded from YAML:
//!
//! ```yaml
//! buffer_dir: /var/spool/metrics
//! namespace: checkout-service
//! millis_between_run: 1000
//! max_millis_to_wait: 1000
//! retention_period_millis: 10800000
//! max_batch_size: 18
//! ```

use crate::error::{RelayError, Result};
use crate::policy::{self, BatchPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_MILLIS_BETWEEN_RUN: u64 = 1000;

fn default_millis_between_run() -> u64 {
    DEFAULT_MILLIS_BETWEEN_RUN
}

fn default_max_millis_to_wait() -> u64 {
    policy::DEFAULT_MAX_WAIT.as_millis() as u64
}

fn default_retention_period_millis() -> u64 {
    policy::DEFAULT_RETENTION.as_millis() as u64
}

fn default_max_batch_size() -> usize {
    policy::DEFAULT_MAX_BATCH_SIZE
}

/// Batcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Directory holding buffer files and checkpoint sidecars
    pub buffer_dir: PathBuf,

    /// Namespace passed to the sink with every batch
    pub namespace: String,

    /// Sleep between two drain cycles of the durable batcher
    #[serde(default = "default_millis_between_run")]
    pub millis_between_run: u64,

    /// Window length of the in-memory batcher
    #[serde(default = "default_max_millis_to_wait")]
    pub max_millis_to_wait: u64,

    /// Idle time before a fully processed buffer file is deleted
    #[serde(default = "default_retention_period_millis")]
    pub retention_period_millis: u64,

    /// Maximum records per sink call
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            buffer_dir: std::env::temp_dir().join("metrics-relay"),
            namespace: "metrics-relay".to_string(),
            millis_between_run: default_millis_between_run(),
            max_millis_to_wait: default_max_millis_to_wait(),
            retention_period_millis: default_retention_period_millis(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Invalid(#[from] RelayError),
}

impl RelayConfig {
    /// Create a new config builder
    pub fn builder() -> RelayConfigBuilder {
        RelayConfigBuilder::default()
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> std::result::Result<Self, ConfigError> {
        let config: RelayConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a YAML file.
    pub fn from_file(path: &Path) -> std::result::Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Reject blank strings and non-positive intervals.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_dir.as_os_str().is_empty() {
            return Err(RelayError::config("buffer directory cannot be empty"));
        }
        if self.namespace.trim().is_empty() {
            return Err(RelayError::config("namespace cannot be blank"));
        }
        if self.millis_between_run == 0 {
            return Err(RelayError::config("millis between run must be positive"));
        }
        self.policy().validate()
    }

    /// Batching policy described by this config.
    pub fn policy(&self) -> BatchPolicy {
        BatchPolicy {
            max_batch_size: self.max_batch_size,
            max_wait: Duration::from_millis(self.max_millis_to_wait),
            retention: Duration::from_millis(self.retention_period_millis),
        }
    }

    /// Sleep between drain cycles.
    pub fn run_interval(&self) -> Duration {
        Duration::from_millis(self.millis_between_run)
    }
}

/// Config builder for fluent API
#[derive(Debug, Default)]
pub struct RelayConfigBuilder {
    buffer_dir: Option<PathBuf>,
    namespace: Option<String>,
    millis_between_run: Option<u64>,
    max_millis_to_wait: Option<u64>,
    retention_period_millis: Option<u64>,
    max_batch_size: Option<usize>,
}

impl RelayConfigBuilder {
    pub fn buffer_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.buffer_dir = Some(dir.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn millis_between_run(mut self, millis: u64) -> Self {
        self.millis_between_run = Some(millis);
        self
    }

    pub fn max_millis_to_wait(mut self, millis: u64) -> Self {
        self.max_millis_to_wait = Some(millis);
        self
    }

    pub fn retention_period_millis(mut self, millis: u64) -> Self {
        self.retention_period_millis = Some(millis);
        self
    }

    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = Some(size);
        self
    }

    /// Build the configuration. Validation happens when a batcher is built.
    pub fn build(self) -> RelayConfig {
        let defaults = RelayConfig::default();

        RelayConfig {
            buffer_dir: self.buffer_dir.unwrap_or(defaults.buffer_dir),
            namespace: self.namespace.unwrap_or(defaults.namespace),
            millis_between_run: self
                .millis_between_run
                .unwrap_or(defaults.millis_between_run),
            max_millis_to_wait: self
                .max_millis_to_wait
                .unwrap_or(defaults.max_millis_to_wait),
            retention_period_millis: self
                .retention_period_millis
                .unwrap_or(defaults.retention_period_millis),
            max_batch_size: self.max_batch_size.unwrap_or(defaults.max_batch_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_YAML: &str = r#"
buffer_dir: "/var/spool/metrics"
namespace: "checkout"
"#;

    const FULL_YAML: &str = r#"
buffer_dir: "/tmp/relay"
namespace: "payments"
millis_between_run: 250
max_millis_to_wait: 100
retention_period_millis: 60000
max_batch_size: 10
"#;

    #[test]
    fn test_config_parse_minimal() {
        let config = RelayConfig::from_yaml(MINIMAL_YAML).expect("parse minimal yaml");

        assert_eq!(config.buffer_dir, PathBuf::from("/var/spool/metrics"));
        assert_eq!(config.namespace, "checkout");
        assert_eq!(config.millis_between_run, 1000);
        assert_eq!(config.max_millis_to_wait, 1000);
        assert_eq!(config.retention_period_millis, 10_800_000);
        assert_eq!(config.max_batch_size, 18);
    }

    #[test]
    fn test_config_parse_all_fields() {
        let config = RelayConfig::from_yaml(FULL_YAML).expect("parse full yaml");

        assert_eq!(config.millis_between_run, 250);
        assert_eq!(config.run_interval(), Duration::from_millis(250));

        let policy = config.policy();
        assert_eq!(policy.max_batch_size, 10);
        assert_eq!(policy.max_wait, Duration::from_millis(100));
        assert_eq!(policy.retention, Duration::from_secs(60));
    }

    #[test]
    fn test_config_rejects_invalid_values() {
        let zero_interval = "buffer_dir: /tmp/x\nnamespace: ns\nmillis_between_run: 0\n";
        assert!(matches!(
            RelayConfig::from_yaml(zero_interval),
            Err(ConfigError::Invalid(_))
        ));

        let blank_namespace = "buffer_dir: /tmp/x\nnamespace: '  '\n";
        assert!(RelayConfig::from_yaml(blank_namespace).is_err());

        let missing_namespace = "buffer_dir: /tmp/x\n";
        assert!(matches!(
            RelayConfig::from_yaml(missing_namespace),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_config_builder() {
        let config = RelayConfig::builder()
            .buffer_dir("/data/buffer")
            .namespace("search")
            .millis_between_run(500)
            .retention_period_millis(1)
            .build();

        assert_eq!(config.buffer_dir, PathBuf::from("/data/buffer"));
        assert_eq!(config.namespace, "search");
        assert_eq!(config.millis_between_run, 500);
        assert_eq!(config.retention_period_millis, 1);
        assert_eq!(config.max_batch_size, 18);
        assert!(config.validate().is_ok());
    }
}
