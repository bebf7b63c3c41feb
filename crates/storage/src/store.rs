// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Embedded SQLite state store.
//!
//! Single-writer / multi-reader: the engine owns the writing [`StateStore`]
//! (connection behind a mutex, WAL journal mode), while dashboards and resume
//! read through [`StateReader`] connections opened read-only. SQLite's
//! snapshot isolation gives readers a consistent view per query.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use wave_core::{RunId, RunState, StepId, StepState};

/// Errors from the state store.
///
/// Any write failure is fatal for the current run; the run is resumable once
/// the store is repaired.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("run not found: {0}")]
    RunNotFound(String),
}

/// Persisted run record.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub pipeline: String,
    pub input: String,
    pub state: RunState,
    pub started_at_ms: u64,
    pub completed_at_ms: Option<u64>,
    pub total_tokens: u64,
}

/// Persisted step-state record.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StepStateRecord {
    pub run_id: RunId,
    pub step_id: StepId,
    pub state: StepState,
    pub error: Option<String>,
    pub started_at_ms: Option<u64>,
    pub completed_at_ms: Option<u64>,
    pub tokens_used: u64,
}

/// Persisted artifact record.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ArtifactRecord {
    pub run_id: RunId,
    pub step_id: StepId,
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub created_at_ms: u64,
}

/// Consistent point-in-time view of a run's progress.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub run: RunRecord,
    pub steps: Vec<StepStateRecord>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS runs (
    run_id TEXT PRIMARY KEY,
    pipeline TEXT NOT NULL,
    input TEXT NOT NULL,
    state TEXT NOT NULL,
    started_at_ms INTEGER NOT NULL,
    completed_at_ms INTEGER,
    total_tokens INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS step_states (
    run_id TEXT NOT NULL,
    step_id TEXT NOT NULL,
    state TEXT NOT NULL,
    error TEXT,
    started_at_ms INTEGER,
    completed_at_ms INTEGER,
    tokens_used INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (run_id, step_id)
);

CREATE TABLE IF NOT EXISTS artifacts (
    run_id TEXT NOT NULL,
    step_id TEXT NOT NULL,
    name TEXT NOT NULL,
    path TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    created_at_ms INTEGER NOT NULL,
    PRIMARY KEY (run_id, step_id, name)
);

CREATE INDEX IF NOT EXISTS idx_step_states_run ON step_states(run_id);
CREATE INDEX IF NOT EXISTS idx_artifacts_run ON artifacts(run_id);
";

/// Writing handle to the state store. One per process; writes are serialised
/// behind the connection mutex.
#[derive(Clone)]
pub struct StateStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl StateStore {
    /// Open (creating if needed) the store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!(path = %path.display(), "state store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_owned()),
        })
    }

    /// In-memory store for tests that never need a reader connection.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Open a read-only reader against the same database file.
    pub fn reader(&self) -> Result<StateReader, StoreError> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| StoreError::Corrupt("in-memory store has no reader".to_string()))?;
        StateReader::open(path)
    }

    pub fn create_run(
        &self,
        run_id: &RunId,
        pipeline: &str,
        input: &str,
        started_at_ms: u64,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO runs (run_id, pipeline, input, state, started_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run_id.as_str(),
                pipeline,
                input,
                RunState::Running.to_string(),
                started_at_ms
            ],
        )?;
        Ok(())
    }

    pub fn update_run_state(
        &self,
        run_id: &RunId,
        state: RunState,
        completed_at_ms: Option<u64>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE runs SET state = ?2, completed_at_ms = COALESCE(?3, completed_at_ms)
             WHERE run_id = ?1",
            params![run_id.as_str(), state.to_string(), completed_at_ms],
        )?;
        if updated == 0 {
            return Err(StoreError::RunNotFound(run_id.to_string()));
        }
        Ok(())
    }

    /// Persist a step-state transition.
    ///
    /// Re-writing the same terminal state is a no-op (resume replays terminal
    /// transitions). A step re-entering `running` (resume of a failed or
    /// crashed step) clears its error and completion timestamp.
    pub fn save_step_state(
        &self,
        run_id: &RunId,
        step_id: &StepId,
        state: StepState,
        error: Option<&str>,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();

        let existing: Option<String> = conn
            .query_row(
                "SELECT state FROM step_states WHERE run_id = ?1 AND step_id = ?2",
                params![run_id.as_str(), step_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(current) = existing {
            let current: StepState = current.parse().map_err(StoreError::Corrupt)?;
            if current == state && state.is_terminal() {
                return Ok(());
            }
        }

        let started_at = (state == StepState::Running).then_some(now_ms);
        let completed_at = state.is_terminal().then_some(now_ms);

        conn.execute(
            "INSERT INTO step_states (run_id, step_id, state, error, started_at_ms, completed_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(run_id, step_id) DO UPDATE SET
                 state = excluded.state,
                 error = excluded.error,
                 started_at_ms = COALESCE(step_states.started_at_ms, excluded.started_at_ms),
                 completed_at_ms = excluded.completed_at_ms",
            params![
                run_id.as_str(),
                step_id.as_str(),
                state.to_string(),
                error,
                started_at,
                completed_at
            ],
        )?;
        Ok(())
    }

    pub fn record_artifact(
        &self,
        run_id: &RunId,
        step_id: &StepId,
        name: &str,
        path: &Path,
        size_bytes: u64,
        created_at_ms: u64,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO artifacts
                 (run_id, step_id, name, path, size_bytes, created_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run_id.as_str(),
                step_id.as_str(),
                name,
                path.to_string_lossy(),
                size_bytes,
                created_at_ms
            ],
        )?;
        Ok(())
    }

    /// Add streamed token usage to a step and to the run total, atomically.
    pub fn append_step_progress(
        &self,
        run_id: &RunId,
        step_id: &StepId,
        token_delta: u64,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE step_states SET tokens_used = tokens_used + ?3
             WHERE run_id = ?1 AND step_id = ?2",
            params![run_id.as_str(), step_id.as_str(), token_delta],
        )?;
        tx.execute(
            "UPDATE runs SET total_tokens = total_tokens + ?2 WHERE run_id = ?1",
            params![run_id.as_str(), token_delta],
        )?;
        tx.commit()?;
        Ok(())
    }
}

/// Read-only view of the state store.
pub struct StateReader {
    conn: Mutex<Connection>,
}

impl StateReader {
    /// Open a read-only connection to the store file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn list_runs(&self) -> Result<Vec<RunRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT run_id, pipeline, input, state, started_at_ms, completed_at_ms, total_tokens
             FROM runs ORDER BY started_at_ms DESC",
        )?;
        let rows = stmt.query_map([], run_record_from_row)?;
        collect_records(rows)
    }

    pub fn get_run(&self, run_id: &RunId) -> Result<Option<RunRecord>, StoreError> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT run_id, pipeline, input, state, started_at_ms, completed_at_ms, total_tokens
                 FROM runs WHERE run_id = ?1",
                params![run_id.as_str()],
                run_record_from_row,
            )
            .optional()?;
        record.map(finish_run_record).transpose()
    }

    pub fn get_step_states(&self, run_id: &RunId) -> Result<Vec<StepStateRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT run_id, step_id, state, error, started_at_ms, completed_at_ms, tokens_used
             FROM step_states WHERE run_id = ?1 ORDER BY step_id",
        )?;
        let rows = stmt.query_map(params![run_id.as_str()], step_record_from_row)?;
        collect_records(rows)
    }

    pub fn get_artifacts(&self, run_id: &RunId) -> Result<Vec<ArtifactRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT run_id, step_id, name, path, size_bytes, created_at_ms
             FROM artifacts WHERE run_id = ?1 ORDER BY step_id, name",
        )?;
        let rows = stmt.query_map(params![run_id.as_str()], |row| {
            Ok(ArtifactRecord {
                run_id: RunId::new(row.get::<_, String>(0)?),
                step_id: StepId::new(row.get::<_, String>(1)?),
                name: row.get(2)?,
                path: PathBuf::from(row.get::<_, String>(3)?),
                size_bytes: row.get(4)?,
                created_at_ms: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// One consistent snapshot of a run and its steps.
    pub fn get_progress_snapshot(&self, run_id: &RunId) -> Result<ProgressSnapshot, StoreError> {
        let run = self
            .get_run(run_id)?
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))?;
        let steps = self.get_step_states(run_id)?;
        Ok(ProgressSnapshot { run, steps })
    }
}

/// Raw row shape before enum parsing (rusqlite errors cannot carry our
/// parse failures, so parsing happens in a second pass).
struct RawRun {
    run_id: String,
    pipeline: String,
    input: String,
    state: String,
    started_at_ms: u64,
    completed_at_ms: Option<u64>,
    total_tokens: u64,
}

fn run_record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRun> {
    Ok(RawRun {
        run_id: row.get(0)?,
        pipeline: row.get(1)?,
        input: row.get(2)?,
        state: row.get(3)?,
        started_at_ms: row.get(4)?,
        completed_at_ms: row.get(5)?,
        total_tokens: row.get(6)?,
    })
}

fn finish_run_record(raw: RawRun) -> Result<RunRecord, StoreError> {
    Ok(RunRecord {
        state: raw.state.parse().map_err(StoreError::Corrupt)?,
        run_id: RunId::new(raw.run_id),
        pipeline: raw.pipeline,
        input: raw.input,
        started_at_ms: raw.started_at_ms,
        completed_at_ms: raw.completed_at_ms,
        total_tokens: raw.total_tokens,
    })
}

struct RawStep {
    run_id: String,
    step_id: String,
    state: String,
    error: Option<String>,
    started_at_ms: Option<u64>,
    completed_at_ms: Option<u64>,
    tokens_used: u64,
}

fn step_record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawStep> {
    Ok(RawStep {
        run_id: row.get(0)?,
        step_id: row.get(1)?,
        state: row.get(2)?,
        error: row.get(3)?,
        started_at_ms: row.get(4)?,
        completed_at_ms: row.get(5)?,
        tokens_used: row.get(6)?,
    })
}

trait FinishRecord: Sized {
    type Out;
    fn finish(self) -> Result<Self::Out, StoreError>;
}

impl FinishRecord for RawRun {
    type Out = RunRecord;
    fn finish(self) -> Result<RunRecord, StoreError> {
        finish_run_record(self)
    }
}

impl FinishRecord for RawStep {
    type Out = StepStateRecord;
    fn finish(self) -> Result<StepStateRecord, StoreError> {
        Ok(StepStateRecord {
            state: self.state.parse().map_err(StoreError::Corrupt)?,
            run_id: RunId::new(self.run_id),
            step_id: StepId::new(self.step_id),
            error: self.error,
            started_at_ms: self.started_at_ms,
            completed_at_ms: self.completed_at_ms,
            tokens_used: self.tokens_used,
        })
    }
}

fn collect_records<R: FinishRecord>(
    rows: impl Iterator<Item = rusqlite::Result<R>>,
) -> Result<Vec<R::Out>, StoreError> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?.finish()?);
    }
    Ok(out)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
