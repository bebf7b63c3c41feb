// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Public engine API.
//!
//! A [`Runner`] owns the adapter, clock, state store, event emitter, and
//! workspace manager for one process, and drives pipeline runs through
//! preflight, the scheduler walk, terminal persistence, recovery hints, and
//! worktree cleanup. The CLI, TUI, and dashboard are consumers of this API
//! and of the event stream it emits.

use crate::emitter::EventEmitter;
use crate::error::RuntimeError;
use crate::hints::{build_hints, classify, RecoveryHint};
use crate::preflight::run_preflight;
use crate::repo_lock::DEFAULT_LOCK_TIMEOUT;
use crate::resume::{reconstruct_execution, reset_for_resume};
use crate::scheduler::{walk_pipeline, WalkOutcome};
use crate::topo::runtime_steps;
use crate::workspace::WorkspaceManager;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use wave_adapters::{Adapter, CancelToken};
use wave_core::{
    Clock, Event, IdGen, PersonaDef, PipelineDef, PipelineExecution, RunId, RunState, SkillDef,
    StepId, UuidIdGen,
};
use wave_storage::{EventLogWriter, StateReader, StateStore};

/// Filesystem layout for a runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Root for per-step workspaces (`<root>/<run>/<step>/`).
    pub workspace_root: PathBuf,
    /// Directory for per-run NDJSON event logs.
    pub log_dir: PathBuf,
    /// State store database file.
    pub db_path: PathBuf,
}

impl RunnerConfig {
    /// Project-local layout under `<base>/.wave/`.
    pub fn in_dir(base: impl Into<PathBuf>) -> Self {
        let wave = base.into().join(".wave");
        Self {
            workspace_root: wave.join("workspaces"),
            log_dir: wave.join("logs"),
            db_path: wave.join("state.db"),
        }
    }

    /// User-level layout under the platform state directory.
    pub fn user_default() -> Self {
        let base = dirs::state_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".local/state")))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::in_dir(base.join("wave"))
    }
}

/// Terminal result of a run, for the CLI to map onto exit codes.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub state: RunState,
    pub total_tokens: u64,
    /// Non-empty only on failure.
    pub hints: Vec<RecoveryHint>,
}

#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Resume the latest run of this pipeline from the given step instead of
    /// starting fresh.
    pub from_step: Option<StepId>,
    /// Skip contract validation on re-executed steps.
    pub force: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ResumeOptions {
    pub from_step: Option<StepId>,
    pub force: bool,
}

/// Shared engine dependencies, one per runner.
pub(crate) struct EngineCtx<A: Adapter, C: Clock> {
    pub adapter: A,
    pub clock: C,
    pub store: StateStore,
    pub emitter: Arc<EventEmitter>,
    pub workspaces: WorkspaceManager,
    pub personas: HashMap<String, PersonaDef>,
    pub skills: HashMap<String, SkillDef>,
    pub cancel: CancelToken,
    /// Adapter binary override, mainly for stub adapters in tests.
    pub adapter_binary: Option<PathBuf>,
}

/// The pipeline execution engine.
pub struct Runner<A: Adapter, C: Clock, G: IdGen = UuidIdGen> {
    ctx: EngineCtx<A, C>,
    id_gen: G,
    config: RunnerConfig,
}

impl<A: Adapter, C: Clock, G: IdGen> Runner<A, C, G> {
    pub fn new(
        adapter: A,
        clock: C,
        id_gen: G,
        config: RunnerConfig,
        personas: Vec<PersonaDef>,
        skills: Vec<SkillDef>,
    ) -> Result<Self, RuntimeError> {
        let store = StateStore::open(&config.db_path)?;
        let ctx = EngineCtx {
            adapter,
            clock,
            store,
            emitter: Arc::new(EventEmitter::new()),
            workspaces: WorkspaceManager::new(&config.workspace_root),
            personas: personas.into_iter().map(|p| (p.name.clone(), p)).collect(),
            skills: skills.into_iter().map(|s| (s.name.clone(), s)).collect(),
            cancel: CancelToken::new(),
            adapter_binary: None,
        };
        Ok(Self {
            ctx,
            id_gen,
            config,
        })
    }

    /// Point the concrete adapter at an explicit binary (stub scripts in
    /// tests, alternative installs in production).
    pub fn with_adapter_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.ctx.adapter_binary = Some(binary.into());
        self
    }

    /// Live event stream. Consumers filter by run ID.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.ctx.emitter.subscribe()
    }

    /// Cancellation handle shared by every run of this runner.
    pub fn cancel_token(&self) -> CancelToken {
        self.ctx.cancel.clone()
    }

    /// Read-only view of the state store (list/inspect runs).
    pub fn reader(&self) -> Result<StateReader, RuntimeError> {
        Ok(self.ctx.store.reader()?)
    }

    /// Start a run of `pipeline` with the given input.
    pub async fn execute(
        &self,
        pipeline: &PipelineDef,
        input: &str,
        options: ExecuteOptions,
    ) -> Result<RunOutcome, RuntimeError> {
        if let Some(from_step) = options.from_step {
            // Starting "from a step" means resuming the latest run.
            let latest = self
                .reader()?
                .list_runs()?
                .into_iter()
                .find(|r| r.pipeline == pipeline.name)
                .ok_or_else(|| {
                    RuntimeError::RunNotFound(format!(
                        "no prior run of {} to start from step {}",
                        pipeline.name, from_step
                    ))
                })?;
            return self
                .resume(
                    pipeline,
                    &latest.run_id,
                    ResumeOptions {
                        from_step: Some(from_step),
                        force: options.force,
                    },
                )
                .await;
        }

        // Cycles are fatal before any state is created.
        let steps = runtime_steps(pipeline)?;

        let run_id = RunId::new(self.id_gen.next());
        let now = self.ctx.clock.epoch_ms();
        let mut exec = PipelineExecution::new(run_id.clone(), pipeline.name.as_str(), input, now);

        self.ctx
            .store
            .create_run(&run_id, &pipeline.name, input, now)?;
        self.attach_log(&run_id, &pipeline.name, now);

        self.ctx.emitter.emit(
            Event::PipelineStart {
                run_id: run_id.clone(),
                pipeline: pipeline.name.clone(),
                input: input.to_string(),
            },
            now,
        );

        if let Err(e) = run_preflight(
            &pipeline.requires,
            &self.ctx.skills,
            &self.ctx.emitter,
            &run_id,
            &self.ctx.clock,
        )
        .await
        {
            let now = self.ctx.clock.epoch_ms();
            self.ctx
                .store
                .update_run_state(&run_id, RunState::Failed, Some(now))?;
            self.ctx.emitter.emit(
                Event::PipelineFailed {
                    run_id: run_id.clone(),
                    pipeline: pipeline.name.clone(),
                    step_id: None,
                    message: e.to_string(),
                    data: serde_json::Value::Null,
                },
                now,
            );
            self.ctx.emitter.detach_run_log(&run_id);
            return Err(e);
        }

        self.drive(pipeline, &steps, &mut exec, options.force).await
    }

    /// Resume a persisted run.
    pub async fn resume(
        &self,
        pipeline: &PipelineDef,
        run_id: &RunId,
        options: ResumeOptions,
    ) -> Result<RunOutcome, RuntimeError> {
        let reader = self.reader()?;
        let record = reader
            .get_run(run_id)?
            .ok_or_else(|| RuntimeError::RunNotFound(run_id.to_string()))?;

        // Resuming a completed run is a no-op: no step re-executes, no event
        // is emitted.
        if record.state == RunState::Completed {
            return Ok(RunOutcome {
                run_id: run_id.clone(),
                state: RunState::Completed,
                total_tokens: record.total_tokens,
                hints: Vec::new(),
            });
        }

        let steps = runtime_steps(pipeline)?;
        if let Some(from_step) = &options.from_step {
            let known = steps.iter().any(|s| &s.id == from_step)
                || pipeline.get_step(from_step).is_some();
            if !known {
                return Err(RuntimeError::UnknownStep(from_step.to_string()));
            }
        }
        let mut exec = reconstruct_execution(&reader, run_id)?;
        reset_for_resume(&mut exec);
        exec.overall = RunState::Running;

        self.ctx
            .store
            .update_run_state(run_id, RunState::Running, None)?;
        self.attach_log(run_id, &pipeline.name, exec.started_at_ms);

        self.drive(pipeline, &steps, &mut exec, options.force).await
    }

    /// Walk the pipeline and finalise: run state, hints, cleanup, log
    /// detach. Cleanup runs on every exit path.
    async fn drive(
        &self,
        pipeline: &PipelineDef,
        steps: &[wave_core::StepDef],
        exec: &mut PipelineExecution,
        skip_validation: bool,
    ) -> Result<RunOutcome, RuntimeError> {
        let outcome = walk_pipeline(&self.ctx, steps, exec, skip_validation).await;
        let now = self.ctx.clock.epoch_ms();
        let run_id = exec.run_id.clone();

        let result = self.finalize(pipeline, exec, outcome, now);

        // Worktrees always come down, whatever the outcome — including a
        // failing finalise write.
        self.ctx
            .workspaces
            .cleanup_run(exec, DEFAULT_LOCK_TIMEOUT)
            .await;
        self.ctx.emitter.detach_run_log(&run_id);

        result
    }

    fn finalize(
        &self,
        pipeline: &PipelineDef,
        exec: &mut PipelineExecution,
        outcome: WalkOutcome,
        now: u64,
    ) -> Result<RunOutcome, RuntimeError> {
        let run_id = exec.run_id.clone();
        match outcome {
            WalkOutcome::Completed => {
                exec.finish(RunState::Completed, now);
                self.ctx
                    .store
                    .update_run_state(&run_id, RunState::Completed, Some(now))?;
                self.ctx.emitter.emit(
                    Event::PipelineComplete {
                        run_id: run_id.clone(),
                        pipeline: pipeline.name.clone(),
                        total_tokens: exec.total_tokens,
                    },
                    now,
                );
                Ok(RunOutcome {
                    run_id,
                    state: RunState::Completed,
                    total_tokens: exec.total_tokens,
                    hints: Vec::new(),
                })
            }
            WalkOutcome::Cancelled => {
                exec.finish(RunState::Cancelled, now);
                self.ctx
                    .store
                    .update_run_state(&run_id, RunState::Cancelled, Some(now))?;
                Ok(RunOutcome {
                    run_id,
                    state: RunState::Cancelled,
                    total_tokens: exec.total_tokens,
                    hints: Vec::new(),
                })
            }
            WalkOutcome::Failed(step_error) => {
                exec.finish(RunState::Failed, now);
                self.ctx
                    .store
                    .update_run_state(&run_id, RunState::Failed, Some(now))?;

                let hints = build_hints(
                    &pipeline.name,
                    &exec.input,
                    &run_id,
                    &step_error.step_id,
                    classify(&step_error.source),
                    exec.workspace_paths
                        .get(&step_error.step_id)
                        .map(|p| p.as_path()),
                );
                self.ctx.emitter.emit(
                    Event::PipelineFailed {
                        run_id: run_id.clone(),
                        pipeline: pipeline.name.clone(),
                        step_id: Some(step_error.step_id.clone()),
                        message: step_error.to_string(),
                        data: serde_json::json!({ "hints": hints }),
                    },
                    now,
                );
                Ok(RunOutcome {
                    run_id,
                    state: RunState::Failed,
                    total_tokens: exec.total_tokens,
                    hints,
                })
            }
        }
    }

    fn attach_log(&self, run_id: &RunId, pipeline: &str, started_at_ms: u64) {
        match EventLogWriter::create(&self.config.log_dir, run_id, pipeline, started_at_ms) {
            Ok(writer) => self.ctx.emitter.attach_run_log(run_id.clone(), writer),
            Err(e) => {
                tracing::warn!(run_id = %run_id, error = %e, "event log unavailable for run");
            }
        }
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
