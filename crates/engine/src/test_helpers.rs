// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests.

use crate::emitter::EventEmitter;
use crate::runner::EngineCtx;
use crate::workspace::WorkspaceManager;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use wave_adapters::{CancelToken, FakeAdapter};
use wave_core::test_support::builder_persona;
use wave_core::{Clock, FakeClock, PipelineExecution, RunId};
use wave_storage::StateStore;

pub(crate) struct TestCtx {
    /// Keeps the tempdir alive for the duration of the test.
    pub dir: TempDir,
    pub ctx: EngineCtx<FakeAdapter, FakeClock>,
}

pub(crate) fn test_ctx() -> TestCtx {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::open(dir.path().join("state.db")).unwrap();
    let persona = builder_persona();

    let ctx = EngineCtx {
        adapter: FakeAdapter::new(),
        clock: FakeClock::new(1_000),
        store,
        emitter: Arc::new(EventEmitter::new()),
        workspaces: WorkspaceManager::new(dir.path().join("workspaces")),
        personas: HashMap::from([(persona.name.clone(), persona)]),
        skills: HashMap::new(),
        cancel: CancelToken::new(),
        adapter_binary: None,
    };
    TestCtx { dir, ctx }
}

/// Fresh execution with its run record already created.
pub(crate) fn new_exec(t: &TestCtx, run_id: &str) -> PipelineExecution {
    let run_id = RunId::new(run_id);
    t.ctx
        .store
        .create_run(&run_id, "demo", "fix the bug", t.ctx.clock.epoch_ms())
        .unwrap();
    PipelineExecution::new(run_id, "demo", "fix the bug", t.ctx.clock.epoch_ms())
}

/// Collect all events currently buffered on a subscription.
pub(crate) fn drain_events(
    rx: &mut tokio::sync::broadcast::Receiver<wave_core::Event>,
) -> Vec<wave_core::Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
