// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Checkpoint store
//!
//! Each buffer file has a sidecar `<basename>.properties` recording how many
//! bytes of it were flushed and when:
//!
//! ```text
//! #metrics-relay checkpoint
//! bytesRead=4096
//! lastUpdate=1700000000000
//! ```
//!
//! The sidecar is written only by the drain worker, only after a sink call
//! succeeded, and always through a temp file + fsync + rename so a crash
//! leaves either the old or the new offset on disk.

use crate::error::{RelayError, Result};
use crate::record::now_millis;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const BYTES_READ: &str = "bytesRead";
const LAST_UPDATE: &str = "lastUpdate";

/// Sidecar extension.
pub const CHECKPOINT_EXTENSION: &str = "properties";

/// Replay progress of one buffer file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Checkpoint {
    /// Bytes of the buffer file already flushed (terminators included).
    pub bytes_consumed: u64,
    /// Unix epoch milliseconds of the last successful advance (0 = never).
    pub last_update_ms: i64,
}

impl Checkpoint {
    /// `true` once every byte of a file of `file_len` bytes was flushed.
    pub fn is_fully_processed(&self, file_len: u64) -> bool {
        self.bytes_consumed == file_len
    }

    fn to_properties(self) -> String {
        format!(
            "#metrics-relay checkpoint\n{}={}\n{}={}\n",
            BYTES_READ, self.bytes_consumed, LAST_UPDATE, self.last_update_ms
        )
    }

    fn parse(path: &Path, content: &str) -> Result<Self> {
        let corrupt = |reason: String| RelayError::CorruptCheckpoint {
            path: path.to_path_buf(),
            reason,
        };

        let mut checkpoint = Checkpoint::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let Some((key, value)) = line.split_once(['=', ':']) else {
                return Err(corrupt(format!("malformed line '{}'", line)));
            };
            match key.trim() {
                BYTES_READ => {
                    checkpoint.bytes_consumed = value
                        .trim()
                        .parse()
                        .map_err(|e| corrupt(format!("{}: {}", BYTES_READ, e)))?;
                }
                LAST_UPDATE => {
                    checkpoint.last_update_ms = value
                        .trim()
                        .parse()
                        .map_err(|e| corrupt(format!("{}: {}", LAST_UPDATE, e)))?;
                }
                _ => {}
            }
        }
        Ok(checkpoint)
    }
}

/// Sidecar file name for a buffer file name.
pub fn checkpoint_file_name(buffer_file_name: &str) -> String {
    Path::new(buffer_file_name)
        .with_extension(CHECKPOINT_EXTENSION)
        .to_string_lossy()
        .into_owned()
}

/// Directory-backed checkpoint sidecars.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Store sidecars next to the buffer files in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Sidecar path for a buffer file name.
    pub fn path_for(&self, buffer_file_name: &str) -> PathBuf {
        self.dir.join(checkpoint_file_name(buffer_file_name))
    }

    /// Whether a sidecar was ever persisted for this buffer file.
    pub fn exists(&self, buffer_file_name: &str) -> bool {
        self.path_for(buffer_file_name).is_file()
    }

    /// Load the checkpoint; `{0, 0}` if no sidecar exists yet.
    pub fn load(&self, buffer_file_name: &str) -> Result<Checkpoint> {
        let path = self.path_for(buffer_file_name);
        match fs::read_to_string(&path) {
            Ok(content) => Checkpoint::parse(&path, &content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Checkpoint::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Add `delta_bytes` to the offset, stamp it with the current time and
    /// persist before returning.
    pub fn advance(&self, buffer_file_name: &str, delta_bytes: u64) -> Result<Checkpoint> {
        self.advance_at(buffer_file_name, delta_bytes, now_millis())
    }

    pub(crate) fn advance_at(
        &self,
        buffer_file_name: &str,
        delta_bytes: u64,
        now_ms: i64,
    ) -> Result<Checkpoint> {
        let current = self.load(buffer_file_name)?;
        let next = Checkpoint {
            bytes_consumed: current.bytes_consumed + delta_bytes,
            last_update_ms: now_ms.max(current.last_update_ms),
        };
        self.persist(buffer_file_name, next)?;
        Ok(next)
    }

    /// Remove the sidecar. A missing sidecar is not an error.
    pub fn delete(&self, buffer_file_name: &str) -> Result<()> {
        match fs::remove_file(self.path_for(buffer_file_name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn persist(&self, buffer_file_name: &str, checkpoint: Checkpoint) -> Result<()> {
        let path = self.path_for(buffer_file_name);
        let mut tmp_name = path.clone().into_os_string();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        {
            let mut file = File::create(&tmp)?;
            file.write_all(checkpoint.to_properties().as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        #[cfg(unix)]
        if let Ok(dir) = File::open(&self.dir) {
            let _ = dir.sync_all();
        }

        tracing::trace!(
            "Checkpoint {} -> bytesRead={}",
            path.display(),
            checkpoint.bytes_consumed
        );
        Ok(())
    }
}
