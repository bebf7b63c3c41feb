// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Adapter layer for the Wave engine
//!
//! An adapter is the external coding-agent CLI a step invokes. This crate
//! defines the [`Adapter`] contract — prepare the step workspace, run the
//! subprocess, translate its NDJSON stream into events — and the concrete
//! Claude implementation. Engine code is generic over the trait so tests run
//! against [`FakeAdapter`].

mod cancel;
mod claude;
pub mod env;
mod prepare;
pub mod stream;

pub use cancel::CancelToken;
pub use claude::ClaudeAdapter;
pub use prepare::{prepare_workspace, BASE_PROTOCOL};
pub use stream::StreamEvent;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeAdapter, FakeCall};

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use wave_core::{FailureReason, PersonaDef, RunId, SkillDef, StepId};

/// Errors from adapter operations.
///
/// A tagged sum so retry policy and recovery hints switch on the variant,
/// never on message text. Payloads are plain data to keep the type `Clone`
/// for scripted test playback.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    #[error("adapter timed out")]
    Timeout { tokens_used: u64 },
    #[error("adapter exited with code {code}")]
    NonzeroExit { code: i32, tokens_used: u64 },
    #[error("adapter killed by signal {signal}")]
    Signal { signal: i32, tokens_used: u64 },
    #[error("adapter stream unparseable: {message}")]
    StreamParse { message: String, tokens_used: u64 },
    #[error("adapter ran out of context")]
    ContextExhausted { tokens_used: u64 },
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("workspace error: {0}")]
    WorkspaceError(String),
}

impl AdapterError {
    /// Classified failure reason for events and recovery hints.
    pub fn reason(&self) -> FailureReason {
        match self {
            AdapterError::Timeout { .. } => FailureReason::Timeout,
            AdapterError::Signal { .. } => FailureReason::Signal,
            AdapterError::StreamParse { .. } => FailureReason::StreamParseError,
            AdapterError::ContextExhausted { .. } => FailureReason::ContextExhausted,
            AdapterError::NonzeroExit { .. }
            | AdapterError::SpawnFailed(_)
            | AdapterError::WorkspaceError(_) => FailureReason::NonzeroExit,
        }
    }

    /// Whether the executor's retry loop may re-attempt this failure.
    pub fn is_retryable(&self) -> bool {
        self.reason().is_retryable()
    }

    /// Tokens consumed before the failure (partial usage survives timeouts).
    pub fn tokens_used(&self) -> u64 {
        match self {
            AdapterError::Timeout { tokens_used }
            | AdapterError::NonzeroExit { tokens_used, .. }
            | AdapterError::Signal { tokens_used, .. }
            | AdapterError::StreamParse { tokens_used, .. }
            | AdapterError::ContextExhausted { tokens_used } => *tokens_used,
            AdapterError::SpawnFailed(_) | AdapterError::WorkspaceError(_) => 0,
        }
    }

    /// Actionable hint for the failure class, if one exists.
    pub fn remediation(&self) -> Option<String> {
        match self {
            AdapterError::ContextExhausted { .. } => {
                Some("re-run with smaller input or split the step".to_string())
            }
            AdapterError::Timeout { .. } => {
                Some("increase the step timeout or reduce the step's scope".to_string())
            }
            _ => None,
        }
    }
}

/// Configuration for a single adapter invocation.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub run_id: RunId,
    pub step_id: StepId,
    pub persona: String,
    /// Step workspace; also the subprocess working directory.
    pub workspace: PathBuf,
    /// Prompt delivered to the adapter.
    pub prompt: String,
    pub timeout: Duration,
    /// Environment variables forwarded on top of the curated base set.
    pub env_passthrough: Vec<String>,
    /// Adapter binary override (tests point this at a stub script).
    pub binary: Option<PathBuf>,
    /// Cancellation signal for the whole run.
    pub cancel: CancelToken,
}

/// Successful adapter invocation.
#[derive(Debug, Clone)]
pub struct AdapterOutput {
    pub tokens_used: u64,
    /// Final structured output, when the adapter produced one.
    pub output: Option<serde_json::Value>,
}

/// Contract for invoking an external coding-agent CLI.
#[async_trait]
pub trait Adapter: Clone + Send + Sync + 'static {
    /// Stage the step workspace: system prompt, permission restrictions,
    /// skill command files.
    async fn prepare(
        &self,
        workspace: &Path,
        persona: &PersonaDef,
        skills: &[SkillDef],
    ) -> Result<(), AdapterError>;

    /// Run the adapter to completion (or timeout), forwarding stream events.
    ///
    /// Stream events carry content deltas, token-usage deltas, and tool
    /// activity; the engine translates them into progress events. On timeout
    /// the implementation must still report partial token usage.
    async fn run(
        &self,
        config: RunConfig,
        events: mpsc::Sender<StreamEvent>,
    ) -> Result<AdapterOutput, AdapterError>;
}
