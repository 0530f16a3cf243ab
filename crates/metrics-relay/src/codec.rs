// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Buffer line codec.
//!
//! Each buffered record is one JSON object followed by `\n`:
//!
//! ```text
//! {"MetricName":"api.Latency","Value":12.5,"Unit":"Milliseconds","Timestamp":1700000000000}
//! ```
//!
//! Decoding returns a [`CodecError`] instead of panicking so the drain loop
//! can skip malformed lines and keep going.

use crate::record::MetricRecord;
use thiserror::Error;

/// Line terminator used in buffer files.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Encode/decode failures.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The line is not a valid JSON record.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The line is empty (after stripping the terminator).
    #[error("empty line")]
    Empty,
}

/// Append the encoded record and its terminator to `buf`.
pub fn encode_line(record: &MetricRecord, buf: &mut Vec<u8>) -> Result<(), CodecError> {
    serde_json::to_writer(&mut *buf, record)?;
    buf.push(LINE_TERMINATOR);
    Ok(())
}

/// Encode a record as a JSON string without terminator.
pub fn encode(record: &MetricRecord) -> Result<String, CodecError> {
    Ok(serde_json::to_string(record)?)
}

/// Decode one buffer line. A trailing `\n` or `\r\n` is ignored.
pub fn decode(line: &[u8]) -> Result<MetricRecord, CodecError> {
    let line = strip_terminator(line);
    if line.iter().all(u8::is_ascii_whitespace) {
        return Err(CodecError::Empty);
    }
    Ok(serde_json::from_slice(line)?)
}

fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
