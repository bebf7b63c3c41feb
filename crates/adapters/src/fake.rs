// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake adapter for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::stream::StreamEvent;
use crate::{Adapter, AdapterError, AdapterOutput, RunConfig};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use wave_core::{PersonaDef, SkillDef, StepId};

/// Recorded call to FakeAdapter
#[derive(Debug, Clone)]
pub enum FakeCall {
    Prepare { workspace: PathBuf, persona: String },
    Run { step_id: StepId, prompt: String },
}

/// Fake adapter with scripted per-step results.
///
/// Each `run` pops the next scripted result for the step (falling back to a
/// default success), emits any scripted stream events, and writes the result
/// document to `output/result.json` so artifact scanning behaves like a real
/// adapter. All calls are recorded.
#[derive(Clone)]
pub struct FakeAdapter {
    inner: Arc<Mutex<FakeState>>,
}

struct FakeState {
    scripts: HashMap<String, VecDeque<Result<AdapterOutput, AdapterError>>>,
    stream_events: HashMap<String, Vec<StreamEvent>>,
    calls: Vec<FakeCall>,
    prepare_error: Option<AdapterError>,
}

impl Default for FakeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeAdapter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeState {
                scripts: HashMap::new(),
                stream_events: HashMap::new(),
                calls: Vec::new(),
                prepare_error: None,
            })),
        }
    }

    /// Queue a successful result for a step.
    pub fn enqueue_success(&self, step_id: &str, output: serde_json::Value, tokens: u64) {
        self.inner
            .lock()
            .scripts
            .entry(step_id.to_string())
            .or_default()
            .push_back(Ok(AdapterOutput {
                tokens_used: tokens,
                output: Some(output),
            }));
    }

    /// Queue a failure for a step.
    pub fn enqueue_error(&self, step_id: &str, error: AdapterError) {
        self.inner
            .lock()
            .scripts
            .entry(step_id.to_string())
            .or_default()
            .push_back(Err(error));
    }

    /// Stream events emitted on every run of the step.
    pub fn set_stream_events(&self, step_id: &str, events: Vec<StreamEvent>) {
        self.inner
            .lock()
            .stream_events
            .insert(step_id.to_string(), events);
    }

    /// Error returned by the next `prepare` call.
    pub fn set_prepare_error(&self, error: AdapterError) {
        self.inner.lock().prepare_error = Some(error);
    }

    /// All recorded calls.
    pub fn calls(&self) -> Vec<FakeCall> {
        self.inner.lock().calls.clone()
    }

    /// Number of `run` calls for a step.
    pub fn run_count(&self, step_id: &str) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, FakeCall::Run { step_id: id, .. } if id == step_id))
            .count()
    }
}

#[async_trait]
impl Adapter for FakeAdapter {
    async fn prepare(
        &self,
        workspace: &Path,
        persona: &PersonaDef,
        _skills: &[SkillDef],
    ) -> Result<(), AdapterError> {
        let mut inner = self.inner.lock();
        inner.calls.push(FakeCall::Prepare {
            workspace: workspace.to_owned(),
            persona: persona.name.clone(),
        });
        if let Some(error) = inner.prepare_error.take() {
            return Err(error);
        }
        drop(inner);

        std::fs::create_dir_all(workspace.join("artifacts"))
            .and_then(|_| std::fs::create_dir_all(workspace.join("output")))
            .map_err(|e| AdapterError::WorkspaceError(e.to_string()))
    }

    async fn run(
        &self,
        config: RunConfig,
        events: mpsc::Sender<StreamEvent>,
    ) -> Result<AdapterOutput, AdapterError> {
        let (result, scripted_events) = {
            let mut inner = self.inner.lock();
            inner.calls.push(FakeCall::Run {
                step_id: config.step_id.clone(),
                prompt: config.prompt.clone(),
            });
            let result = inner
                .scripts
                .get_mut(config.step_id.as_str())
                .and_then(|queue| queue.pop_front())
                .unwrap_or(Ok(AdapterOutput {
                    tokens_used: 10,
                    output: Some(serde_json::json!({"status": "ok"})),
                }));
            let scripted = inner
                .stream_events
                .get(config.step_id.as_str())
                .cloned()
                .unwrap_or_default();
            (result, scripted)
        };

        for event in scripted_events {
            let _ = events.send(event).await;
        }

        if let Ok(output) = &result {
            if let Some(value) = &output.output {
                let out_dir = config.workspace.join("output");
                std::fs::create_dir_all(&out_dir)
                    .map_err(|e| AdapterError::WorkspaceError(e.to_string()))?;
                let content = serde_json::to_vec_pretty(value)
                    .map_err(|e| AdapterError::WorkspaceError(e.to_string()))?;
                std::fs::write(out_dir.join("result.json"), content)
                    .map_err(|e| AdapterError::WorkspaceError(e.to_string()))?;
            }
        }

        result
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
