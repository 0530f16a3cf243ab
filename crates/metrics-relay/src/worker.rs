// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Background worker thread with a stop channel.

use crate::error::{RelayError, Result};
use crossbeam::channel::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

/// Owns a batcher's worker thread and its stop signal.
///
/// Stopping drops the sender, which disconnects the channel; the worker sees
/// the disconnect at its next wait point, finishes the iteration in progress
/// and returns. The thread is then joined.
pub(crate) struct WorkerHandle {
    /// Must be dropped BEFORE joining the thread.
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Spawn `body` on a named thread. `body` receives the stop receiver.
    pub(crate) fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(Receiver<()>) + Send + 'static,
    {
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(stop_rx))
            .map_err(|e| RelayError::Worker(format!("failed to spawn {}: {}", name, e)))?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Signal the worker and wait for it to exit. Safe to call twice.
    pub(crate) fn stop(&mut self) {
        drop(self.stop_tx.take());
        if let Some(handle) = self.thread.take() {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                tracing::error!("Worker thread {} panicked", name);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
