// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only NDJSON event log.
//!
//! One file per run: `<log_dir>/<run_id>-<pipeline>-<started_at_ms>.ndjson`.
//! Each line is the event's flat serialization plus a `timestamp` envelope
//! field (UTC, millisecond precision). Credential scrubbing runs on every
//! line before it touches disk.

use crate::scrub::scrub_value;
use chrono::{SecondsFormat, TimeZone, Utc};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use wave_core::{Event, RunId};

/// Errors from event log writes.
#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Appends scrubbed event lines to the run's NDJSON log.
///
/// Log failures never fail the pipeline; the emitter traces and drops them.
pub struct EventLogWriter {
    file: File,
    path: PathBuf,
}

impl EventLogWriter {
    /// Open (creating if needed) the log file for a run.
    pub fn create(
        log_dir: &Path,
        run_id: &RunId,
        pipeline: &str,
        started_at_ms: u64,
    ) -> Result<Self, EventLogError> {
        std::fs::create_dir_all(log_dir)?;
        let path = log_dir.join(format!("{}-{}-{}.ndjson", run_id, pipeline, started_at_ms));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { file, path })
    }

    /// Path of the underlying log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event line with the given emission timestamp.
    pub fn append(&mut self, event: &Event, timestamp_ms: u64) -> Result<(), EventLogError> {
        let mut value = serde_json::to_value(event)?;
        scrub_value(&mut value);

        if let Value::Object(map) = &mut value {
            map.insert(
                "timestamp".to_string(),
                Value::String(format_timestamp(timestamp_ms)),
            );
        }

        let mut line = serde_json::to_vec(&value)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.flush()?;
        Ok(())
    }
}

/// Format an epoch-ms timestamp as RFC 3339 UTC with millisecond precision.
fn format_timestamp(epoch_ms: u64) -> String {
    match Utc.timestamp_millis_opt(epoch_ms as i64) {
        chrono::LocalResult::Single(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        _ => epoch_ms.to_string(),
    }
}

/// Read all event lines from a log file (test and inspection helper).
pub fn read_lines(path: &Path) -> Result<Vec<Value>, EventLogError> {
    let content = std::fs::read_to_string(path)?;
    let mut lines = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        lines.push(serde_json::from_str(trimmed)?);
    }
    Ok(lines)
}

#[cfg(test)]
#[path = "event_log_tests.rs"]
mod tests;
