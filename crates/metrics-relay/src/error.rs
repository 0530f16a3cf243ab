// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types shared by both batchers.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Errors returned by the relay's public API.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A construction argument was rejected (blank string, zero interval...).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A metric record failed validation.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// The batcher has been shut down and no longer accepts records.
    #[error("Publisher channel is closed")]
    ChannelClosed,

    /// Filesystem failure (buffer directory, buffer file or sidecar).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded for the buffer file.
    #[error("Codec error: {0}")]
    Codec(#[from] crate::codec::CodecError),

    /// A checkpoint sidecar exists but cannot be parsed.
    #[error("Corrupt checkpoint {}: {reason}", path.display())]
    CorruptCheckpoint { path: PathBuf, reason: String },

    /// The background worker could not be started.
    #[error("Worker error: {0}")]
    Worker(String),
}

impl RelayError {
    /// Shorthand for [`RelayError::InvalidConfig`].
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        RelayError::InvalidConfig(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            RelayError::ChannelClosed.to_string(),
            "Publisher channel is closed"
        );
        assert_eq!(
            RelayError::config("namespace cannot be blank").to_string(),
            "Invalid configuration: namespace cannot be blank"
        );

        let err = RelayError::CorruptCheckpoint {
            path: PathBuf::from("/tmp/metrics-logs-2024-01-01-00.properties"),
            reason: "bytesRead is not a number".into(),
        };
        assert!(err.to_string().contains("metrics-logs-2024-01-01-00.properties"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: RelayError = io.into();
        assert!(matches!(err, RelayError::Io(_)));
    }
}
