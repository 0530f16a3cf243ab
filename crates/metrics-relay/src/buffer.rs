// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hour-bucketed buffer files.
//!
//! Producers append to `metrics-logs-YYYY-MM-DD-HH.log` for the current UTC
//! hour. The drain worker orders files by the bucket parsed from the name,
//! never by directory traversal order.

use crate::codec;
use crate::error::{RelayError, Result};
use crate::record::MetricRecord;
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use regex::Regex;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const FILE_PREFIX: &str = "metrics-logs-";
const FILE_EXTENSION: &str = "log";

#[allow(clippy::expect_used)] // constant pattern
fn file_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^metrics-logs-(\d{4})-(\d{1,2})-(\d{1,2})-(\d{1,2})\.log$")
            .expect("buffer file pattern compiles")
    })
}

/// UTC hour a buffer file collects records for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HourBucket {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
}

impl HourBucket {
    /// Bucket containing `time`.
    pub fn of(time: DateTime<Utc>) -> Self {
        Self {
            year: time.year(),
            month: time.month(),
            day: time.day(),
            hour: time.hour(),
        }
    }

    /// Bucket for the current wall-clock hour.
    pub fn current() -> Self {
        Self::of(Utc::now())
    }

    /// Build a bucket from calendar fields; `None` if they are not a valid hour.
    pub fn from_parts(year: i32, month: u32, day: u32, hour: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day)?;
        (hour < 24).then_some(Self {
            year,
            month,
            day,
            hour,
        })
    }

    /// Buffer file name for this bucket.
    pub fn file_name(&self) -> String {
        format!(
            "{}{:04}-{:02}-{:02}-{:02}.{}",
            FILE_PREFIX, self.year, self.month, self.day, self.hour, FILE_EXTENSION
        )
    }

    /// Parse a buffer file name. Returns `None` for anything else
    /// (sidecars, temp files, foreign files).
    pub fn parse_file_name(name: &str) -> Option<Self> {
        let caps = file_name_pattern().captures(name)?;
        let field = |i: usize| caps.get(i).map(|m| m.as_str());
        Self::from_parts(
            field(1)?.parse().ok()?,
            field(2)?.parse().ok()?,
            field(3)?.parse().ok()?,
            field(4)?.parse().ok()?,
        )
    }
}

/// A buffer file found in the buffer directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferFile {
    pub name: String,
    pub path: PathBuf,
    pub bucket: HourBucket,
}

/// Create the buffer directory if absent; reject a path that is not a directory.
pub fn prepare_dir(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() {
        return Err(RelayError::config("buffer directory cannot be empty"));
    }
    if dir.exists() {
        if !dir.is_dir() {
            return Err(RelayError::config(format!(
                "invalid path {}: it must point to a directory, not a file",
                dir.display()
            )));
        }
        return Ok(());
    }
    fs::create_dir_all(dir)?;
    tracing::info!("Created buffer directory {}", dir.display());
    Ok(())
}

/// List buffer files in `dir`, oldest bucket first.
pub fn list_buffer_files(dir: &Path) -> Result<Vec<BufferFile>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(bucket) = HourBucket::parse_file_name(&name) else {
            tracing::trace!("Not a buffer file {}. Skipping.", name);
            continue;
        };
        if !entry.file_type()?.is_file() {
            continue;
        }
        files.push(BufferFile {
            path: entry.path(),
            name,
            bucket,
        });
    }
    files.sort_by(|a, b| a.bucket.cmp(&b.bucket).then_with(|| a.name.cmp(&b.name)));
    Ok(files)
}

/// Append `records` to the buffer file of `bucket` with a single write.
///
/// The file is opened in append mode for the duration of the call only.
/// Returns the number of bytes appended.
pub fn append_records(dir: &Path, bucket: HourBucket, records: &[MetricRecord]) -> Result<u64> {
    if records.is_empty() {
        return Ok(0);
    }

    let mut buf = Vec::with_capacity(records.len() * 96);
    for record in records {
        codec::encode_line(record, &mut buf)?;
    }

    let path = dir.join(bucket.file_name());
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    file.write_all(&buf)?;
    Ok(buf.len() as u64)
}
