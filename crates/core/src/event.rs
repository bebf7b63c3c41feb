// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event types for the Wave engine
//!
//! Serializes with `{"type": "event_name", ...fields}` so an NDJSON line
//! carries a flat discriminator. Within a single run/step, emission order is
//! preserved; subscribers that lag drop events but never reorder them.

use crate::pipeline::StepId;
use crate::run::RunId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classified adapter failure.
///
/// Classification happens at stream-close time from the adapter's own result
/// subtypes plus the process exit status; downstream code (retry policy,
/// recovery hints) switches on this variant, never on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    ContextExhausted,
    NonzeroExit,
    StreamParseError,
    Signal,
}

impl FailureReason {
    /// Whether the executor's retry loop may re-attempt this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureReason::Timeout | FailureReason::StreamParseError)
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::Timeout => "timeout",
            FailureReason::ContextExhausted => "context_exhausted",
            FailureReason::NonzeroExit => "nonzero_exit",
            FailureReason::StreamParseError => "stream_parse_error",
            FailureReason::Signal => "signal",
        };
        write!(f, "{}", s)
    }
}

/// A single contract-validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractIssue {
    /// JSON pointer-ish location of the violation.
    pub path: String,
    pub message: String,
}

/// Events emitted over the run's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    PipelineStart {
        run_id: RunId,
        pipeline: String,
        input: String,
    },

    PipelineComplete {
        run_id: RunId,
        pipeline: String,
        total_tokens: u64,
    },

    PipelineFailed {
        run_id: RunId,
        pipeline: String,
        /// Absent when the run failed before any step (preflight).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_id: Option<StepId>,
        message: String,
        /// Structured recovery hints (see the hint builder).
        #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
        data: serde_json::Value,
    },

    Preflight {
        run_id: RunId,
        message: String,
        #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
        data: serde_json::Value,
    },

    StepStart {
        run_id: RunId,
        step_id: StepId,
        persona: String,
        optional: bool,
    },

    StepProgress {
        run_id: RunId,
        step_id: StepId,
        tokens_used: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    StepComplete {
        run_id: RunId,
        step_id: StepId,
        tokens_used: u64,
        optional: bool,
    },

    StepFailed {
        run_id: RunId,
        step_id: StepId,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        failure_reason: Option<FailureReason>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        remediation: Option<String>,
    },

    StepFailedOptional {
        run_id: RunId,
        step_id: StepId,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        failure_reason: Option<FailureReason>,
    },

    StepSkipped {
        run_id: RunId,
        step_id: StepId,
        message: String,
    },

    Retry {
        run_id: RunId,
        step_id: StepId,
        attempt: u32,
        delay_ms: u64,
        message: String,
    },

    ToolActivity {
        run_id: RunId,
        step_id: StepId,
        message: String,
    },

    ContractValidation {
        run_id: RunId,
        step_id: StepId,
        ok: bool,
        attempt: u32,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        errors: Vec<ContractIssue>,
    },
}

impl Event {
    /// The run this event belongs to.
    pub fn run_id(&self) -> &RunId {
        match self {
            Event::PipelineStart { run_id, .. }
            | Event::PipelineComplete { run_id, .. }
            | Event::PipelineFailed { run_id, .. }
            | Event::Preflight { run_id, .. }
            | Event::StepStart { run_id, .. }
            | Event::StepProgress { run_id, .. }
            | Event::StepComplete { run_id, .. }
            | Event::StepFailed { run_id, .. }
            | Event::StepFailedOptional { run_id, .. }
            | Event::StepSkipped { run_id, .. }
            | Event::Retry { run_id, .. }
            | Event::ToolActivity { run_id, .. }
            | Event::ContractValidation { run_id, .. } => run_id,
        }
    }

    /// The step this event concerns, if any.
    pub fn step_id(&self) -> Option<&StepId> {
        match self {
            Event::StepStart { step_id, .. }
            | Event::StepProgress { step_id, .. }
            | Event::StepComplete { step_id, .. }
            | Event::StepFailed { step_id, .. }
            | Event::StepFailedOptional { step_id, .. }
            | Event::StepSkipped { step_id, .. }
            | Event::Retry { step_id, .. }
            | Event::ToolActivity { step_id, .. }
            | Event::ContractValidation { step_id, .. } => Some(step_id),
            Event::PipelineFailed { step_id, .. } => step_id.as_ref(),
            Event::PipelineStart { .. }
            | Event::PipelineComplete { .. }
            | Event::Preflight { .. } => None,
        }
    }

    /// Wire name of the event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::PipelineStart { .. } => "pipeline_start",
            Event::PipelineComplete { .. } => "pipeline_complete",
            Event::PipelineFailed { .. } => "pipeline_failed",
            Event::Preflight { .. } => "preflight",
            Event::StepStart { .. } => "step_start",
            Event::StepProgress { .. } => "step_progress",
            Event::StepComplete { .. } => "step_complete",
            Event::StepFailed { .. } => "step_failed",
            Event::StepFailedOptional { .. } => "step_failed_optional",
            Event::StepSkipped { .. } => "step_skipped",
            Event::Retry { .. } => "retry",
            Event::ToolActivity { .. } => "tool_activity",
            Event::ContractValidation { .. } => "contract_validation",
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
