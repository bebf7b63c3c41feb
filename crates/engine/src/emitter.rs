// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event fan-out.
//!
//! Subscribers receive events over a bounded broadcast channel: a lagging
//! subscriber misses events but never blocks the producer or corrupts the
//! ordering of what it does receive. Each run additionally mirrors its events
//! into an NDJSON log file. Emission never fails the pipeline — log write
//! errors are traced and dropped.

use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::broadcast;
use wave_core::{Event, RunId};
use wave_storage::EventLogWriter;

const CHANNEL_CAPACITY: usize = 1024;

pub struct EventEmitter {
    tx: broadcast::Sender<Event>,
    logs: Mutex<HashMap<RunId, EventLogWriter>>,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventEmitter {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            logs: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to the live event stream. Consumers filter by `run_id`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Route a run's events into an NDJSON log until [`Self::detach_run_log`].
    pub fn attach_run_log(&self, run_id: RunId, writer: EventLogWriter) {
        self.logs.lock().insert(run_id, writer);
    }

    /// Stop logging a run (the file itself is kept).
    pub fn detach_run_log(&self, run_id: &RunId) {
        self.logs.lock().remove(run_id);
    }

    /// Emit one event. Best-effort on every path: no subscribers is fine,
    /// and a failed log write only produces a warning.
    pub fn emit(&self, event: Event, now_ms: u64) {
        if let Some(writer) = self.logs.lock().get_mut(event.run_id()) {
            if let Err(e) = writer.append(&event, now_ms) {
                tracing::warn!(
                    run_id = %event.run_id(),
                    error = %e,
                    "event log write failed"
                );
            }
        }

        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
#[path = "emitter_tests.rs"]
mod tests;
