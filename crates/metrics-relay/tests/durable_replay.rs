// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test readability
#![allow(clippy::float_cmp)] // Test assertions with constants
#![allow(clippy::unreadable_literal)] // Timestamps

//! Durable batcher integration tests.
//!
//! Drive a `FileDrainer` cycle by cycle over a scratch buffer directory and
//! check what reaches the sink and what the checkpoint sidecars say.

use metrics_relay::codec;
use metrics_relay::{
    CheckpointStore, DurableBatcher, FileDrainer, FileState, MetricRecord, MetricsPublisher,
    RecordingSink, RelayConfig, Sink, SinkError, Unit,
};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const FILE: &str = "metrics-logs-2024-03-01-07.log";

fn record(i: usize) -> MetricRecord {
    MetricRecord::new(format!("req.{}", i), i as f64, Unit::Milliseconds, 1_709_276_400_000)
        .unwrap()
}

fn records(range: std::ops::Range<usize>) -> Vec<MetricRecord> {
    range.map(record).collect()
}

fn config(dir: &Path) -> RelayConfig {
    RelayConfig::builder()
        .buffer_dir(dir)
        .namespace("integration")
        .millis_between_run(60_000)
        .build()
}

/// Append raw bytes to a buffer file, returning the byte count.
fn append_raw(dir: &Path, name: &str, bytes: &[u8]) -> u64 {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(name))
        .unwrap();
    file.write_all(bytes).unwrap();
    bytes.len() as u64
}

fn append_records(dir: &Path, name: &str, records: &[MetricRecord]) -> u64 {
    let mut buf = Vec::new();
    for r in records {
        codec::encode_line(r, &mut buf).unwrap();
    }
    append_raw(dir, name, &buf)
}

fn bytes_consumed(dir: &Path, name: &str) -> u64 {
    CheckpointStore::new(dir).load(name).unwrap().bytes_consumed
}

/// Sink failing the calls whose 0-based index is listed.
struct ScriptedSink {
    inner: RecordingSink,
    fail_calls: HashSet<usize>,
    calls: AtomicUsize,
}

impl ScriptedSink {
    fn failing_on(calls: &[usize]) -> Self {
        Self {
            inner: RecordingSink::new(),
            fail_calls: calls.iter().copied().collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl Sink for ScriptedSink {
    fn publish(&self, namespace: &str, batch: &[MetricRecord]) -> Result<(), SinkError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_calls.contains(&call) {
            return Err(SinkError::Unavailable(format!("scripted failure #{}", call)));
        }
        self.inner.publish(namespace, batch)
    }
}

#[test]
fn test_malformed_line_is_skipped_but_counted() {
    let tmp = TempDir::new().unwrap();
    let sink = Arc::new(RecordingSink::new());
    let drainer = FileDrainer::new(sink.clone(), &config(tmp.path())).unwrap();

    let valid = codec::encode(&record(1)).unwrap();
    append_raw(tmp.path(), FILE, format!("{}\nFooBar\n", valid).as_bytes());

    drainer.run_cycle().unwrap();

    assert_eq!(sink.records(), vec![record(1)]);
    assert_eq!(
        bytes_consumed(tmp.path(), FILE),
        valid.len() as u64 + 1 + 6 + 1
    );
    assert_eq!(drainer.stats().malformed_lines, 1);
}

#[test]
fn test_sink_failure_then_recovery() {
    let tmp = TempDir::new().unwrap();
    let sink = Arc::new(RecordingSink::new());
    let drainer = FileDrainer::new(sink.clone(), &config(tmp.path())).unwrap();
    let store = CheckpointStore::new(tmp.path());

    let len = append_records(tmp.path(), FILE, &[record(1)]);

    sink.set_failing(true);
    drainer.run_cycle().unwrap();
    assert_eq!(sink.calls(), 1);
    assert!(sink.records().is_empty());
    assert!(!store.exists(FILE));

    sink.set_failing(false);
    drainer.run_cycle().unwrap();
    assert_eq!(sink.records(), vec![record(1)]);
    assert_eq!(bytes_consumed(tmp.path(), FILE), len);

    let stats = drainer.stats();
    assert_eq!(stats.publish_failures, 1);
    assert_eq!(stats.records_published, 1);
}

#[test]
fn test_checkpoint_tracks_last_flushed_line() {
    let tmp = TempDir::new().unwrap();
    let sink = Arc::new(ScriptedSink::failing_on(&[1]));
    let drainer = FileDrainer::new(sink.clone(), &config(tmp.path())).unwrap();

    let first_batch = append_records(tmp.path(), FILE, &records(0..18));
    let rest = append_records(tmp.path(), FILE, &records(18..40));

    // Second publish fails: only the first 18 lines are covered.
    drainer.run_cycle().unwrap();
    assert_eq!(bytes_consumed(tmp.path(), FILE), first_batch);
    assert_eq!(sink.inner.records(), records(0..18));

    drainer.run_cycle().unwrap();
    assert_eq!(bytes_consumed(tmp.path(), FILE), first_batch + rest);
    assert_eq!(sink.inner.records(), records(0..40));
    assert_eq!(sink.inner.batch_sizes(), vec![18, 18, 4]);
}

#[test]
fn test_batch_size_boundary() {
    let tmp = TempDir::new().unwrap();
    let sink = Arc::new(RecordingSink::new());
    let drainer = FileDrainer::new(sink.clone(), &config(tmp.path())).unwrap();

    append_records(tmp.path(), FILE, &records(0..18));
    drainer.run_cycle().unwrap();
    assert_eq!(sink.batch_sizes(), vec![18]);

    append_records(tmp.path(), FILE, &records(18..37));
    drainer.run_cycle().unwrap();
    assert_eq!(sink.batch_sizes(), vec![18, 18, 1]);
    assert_eq!(sink.records(), records(0..37));
}

#[test]
fn test_cycle_without_new_data_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let sink = Arc::new(RecordingSink::new());
    let drainer = FileDrainer::new(sink.clone(), &config(tmp.path())).unwrap();
    let store = CheckpointStore::new(tmp.path());

    let len = append_records(tmp.path(), FILE, &records(0..5));
    drainer.run_cycle().unwrap();
    let before = store.load(FILE).unwrap();

    drainer.run_cycle().unwrap();
    drainer.run_cycle().unwrap();

    assert_eq!(sink.calls(), 1);
    assert_eq!(store.load(FILE).unwrap(), before);
    assert_eq!(before.bytes_consumed, len);
}

#[test]
fn test_retention_deletes_only_expired_files() {
    let tmp = TempDir::new().unwrap();
    let sink = Arc::new(RecordingSink::new());
    let drainer = FileDrainer::new(sink.clone(), &config(tmp.path())).unwrap();
    let store = CheckpointStore::new(tmp.path());

    append_records(tmp.path(), FILE, &records(0..3));
    drainer.run_cycle().unwrap();
    drainer.run_cycle().unwrap();

    // Default retention (3 h) keeps the processed file.
    assert!(tmp.path().join(FILE).exists());
    assert!(store.exists(FILE));

    drainer
        .set_retention_window(Duration::from_millis(1))
        .unwrap();
    std::thread::sleep(Duration::from_millis(20));
    drainer.run_cycle().unwrap();

    assert!(!tmp.path().join(FILE).exists());
    assert!(!store.exists(FILE));
    assert_eq!(drainer.stats().files_deleted, 1);
    assert_eq!(sink.records(), records(0..3));
}

#[test]
fn test_files_drain_in_bucket_order() {
    let tmp = TempDir::new().unwrap();
    let sink = Arc::new(RecordingSink::new());
    let drainer = FileDrainer::new(sink.clone(), &config(tmp.path())).unwrap();

    // Lexical order would put hour 10 before hour 9.
    append_records(tmp.path(), "metrics-logs-2024-03-01-10.log", &[record(10)]);
    append_records(tmp.path(), "metrics-logs-2024-03-01-9.log", &[record(9)]);
    append_records(tmp.path(), "metrics-logs-2023-12-31-23.log", &[record(1)]);
    append_raw(tmp.path(), "notes.txt", b"not a buffer file\n");

    drainer.run_cycle().unwrap();

    assert_eq!(sink.records(), vec![record(1), record(9), record(10)]);
}

#[test]
fn test_corrupt_sidecar_does_not_block_other_files() {
    let tmp = TempDir::new().unwrap();
    let sink = Arc::new(RecordingSink::new());
    let drainer = FileDrainer::new(sink.clone(), &config(tmp.path())).unwrap();
    let store = CheckpointStore::new(tmp.path());

    let broken = "metrics-logs-2024-03-01-06.log";
    append_records(tmp.path(), broken, &[record(0)]);
    fs::write(store.path_for(broken), "bytesRead=lots\nlastUpdate=0\n").unwrap();

    let len = append_records(tmp.path(), FILE, &[record(1)]);

    drainer.run_cycle().unwrap();

    assert_eq!(sink.records(), vec![record(1)]);
    assert_eq!(bytes_consumed(tmp.path(), FILE), len);
    assert!(store.load(broken).is_err());
}

#[cfg(unix)]
#[test]
fn test_unreadable_buffer_file_does_not_block_other_files() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new().unwrap();
    let sink = Arc::new(RecordingSink::new());
    let drainer = FileDrainer::new(sink.clone(), &config(tmp.path())).unwrap();

    let locked = "metrics-logs-2024-03-01-06.log";
    let locked_path = tmp.path().join(locked);
    append_records(tmp.path(), locked, &[record(0)]);
    fs::set_permissions(&locked_path, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::File::open(&locked_path).is_ok() {
        // Permission bits are not enforced for this user (root).
        fs::set_permissions(&locked_path, fs::Permissions::from_mode(0o644)).unwrap();
        return;
    }

    let len = append_records(tmp.path(), FILE, &[record(1)]);

    drainer.run_cycle().unwrap();

    assert_eq!(sink.records(), vec![record(1)]);
    assert_eq!(bytes_consumed(tmp.path(), FILE), len);
    assert!(!CheckpointStore::new(tmp.path()).exists(locked));

    // Readable again: drained on the next cycle.
    fs::set_permissions(&locked_path, fs::Permissions::from_mode(0o644)).unwrap();
    drainer.run_cycle().unwrap();
    assert_eq!(sink.records(), vec![record(1), record(0)]);
}

#[test]
fn test_unreadable_sidecar_does_not_block_other_files() {
    let tmp = TempDir::new().unwrap();
    let sink = Arc::new(RecordingSink::new());
    let drainer = FileDrainer::new(sink.clone(), &config(tmp.path())).unwrap();
    let store = CheckpointStore::new(tmp.path());

    // A directory in place of the sidecar fails every read with an I/O error.
    let blocked = "metrics-logs-2024-03-01-06.log";
    append_records(tmp.path(), blocked, &[record(0)]);
    fs::create_dir(store.path_for(blocked)).unwrap();

    let len = append_records(tmp.path(), FILE, &[record(1)]);

    drainer.run_cycle().unwrap();
    drainer.run_cycle().unwrap();

    assert_eq!(sink.records(), vec![record(1)]);
    assert_eq!(bytes_consumed(tmp.path(), FILE), len);
    assert!(tmp.path().join(blocked).exists());
}

#[test]
fn test_file_state_follows_checkpoint() {
    let tmp = TempDir::new().unwrap();
    let sink = Arc::new(ScriptedSink::failing_on(&[1]));
    let drainer = FileDrainer::new(sink, &config(tmp.path())).unwrap();
    let store = CheckpointStore::new(tmp.path());

    append_records(tmp.path(), FILE, &records(0..20));
    let len = fs::metadata(tmp.path().join(FILE)).unwrap().len();
    let state = || {
        FileState::classify(store.exists(FILE), store.load(FILE).unwrap(), len)
    };

    assert_eq!(state(), FileState::New);
    drainer.run_cycle().unwrap();
    assert_eq!(state(), FileState::InProgress);
    drainer.run_cycle().unwrap();
    assert_eq!(state(), FileState::FullyProcessed);
}

#[test]
fn test_restart_resumes_from_checkpoint() {
    let tmp = TempDir::new().unwrap();
    let sink = Arc::new(RecordingSink::new());

    {
        let batcher = DurableBatcher::new(sink.clone(), &config(tmp.path())).unwrap();
        batcher.publish(&records(0..3)).unwrap();
        batcher.run_cycle_now().unwrap();
        assert!(sink.wait_for_records(3, Duration::from_secs(5)));
        batcher.publish(&records(3..5)).unwrap();
        batcher.close();
    }

    // A fresh batcher over the same directory only sends what is left.
    let batcher = DurableBatcher::new(sink.clone(), &config(tmp.path())).unwrap();
    batcher.run_cycle_now().unwrap();
    batcher.shutdown();

    assert_eq!(sink.records(), records(0..5));
}

#[test]
fn test_concurrent_producers_all_delivered() {
    let tmp = TempDir::new().unwrap();
    let sink = Arc::new(RecordingSink::new());
    let mut cfg = config(tmp.path());
    cfg.millis_between_run = 10;
    let batcher = Arc::new(DurableBatcher::new(sink.clone(), &cfg).unwrap());

    let produced = Arc::new(Mutex::new(Vec::new()));
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let batcher = Arc::clone(&batcher);
            let produced = Arc::clone(&produced);
            std::thread::spawn(move || {
                for i in 0..25 {
                    let r = record(t * 100 + i);
                    batcher.enqueue(r.clone()).unwrap();
                    produced.lock().unwrap().push(r);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert!(sink.wait_for_records(100, Duration::from_secs(10)));
    batcher.shutdown();

    assert!(sink.batch_sizes().iter().all(|&n| n > 0 && n <= 18));
    let mut delivered: Vec<String> = sink.records().iter().map(|r| r.name().to_string()).collect();
    let mut expected: Vec<String> = produced
        .lock()
        .unwrap()
        .iter()
        .map(|r| r.name().to_string())
        .collect();
    delivered.sort();
    expected.sort();
    assert_eq!(delivered, expected);
}
