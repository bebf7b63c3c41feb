// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn run() -> RunId {
    RunId::new("run-1")
}

fn step() -> StepId {
    StepId::new("build")
}

// ── Serialization ───────────────────────────────────────────────────────────

#[test]
fn events_serialize_with_flat_type_tag() {
    let event = Event::StepStart {
        run_id: run(),
        step_id: step(),
        persona: "builder".to_string(),
        optional: false,
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "step_start");
    assert_eq!(json["run_id"], "run-1");
    assert_eq!(json["step_id"], "build");
    assert_eq!(json["persona"], "builder");
}

#[test]
fn events_round_trip() {
    let event = Event::Retry {
        run_id: run(),
        step_id: step(),
        attempt: 2,
        delay_ms: 2_000,
        message: "adapter timeout".to_string(),
    };
    let json = serde_json::to_string(&event).unwrap();
    let back: Event = serde_json::from_str(&json).unwrap();
    assert_eq!(back, event);
}

#[test]
fn optional_fields_are_omitted_when_absent() {
    let event = Event::StepFailed {
        run_id: run(),
        step_id: step(),
        message: "boom".to_string(),
        failure_reason: None,
        remediation: None,
    };
    let json = serde_json::to_value(&event).unwrap();
    assert!(json.get("failure_reason").is_none());
    assert!(json.get("remediation").is_none());
}

#[test]
fn failure_reason_serializes_snake_case() {
    let json = serde_json::to_string(&FailureReason::ContextExhausted).unwrap();
    assert_eq!(json, "\"context_exhausted\"");
}

// ── Accessors ───────────────────────────────────────────────────────────────

#[test]
fn run_id_accessor_covers_pipeline_events() {
    let event = Event::PipelineComplete {
        run_id: run(),
        pipeline: "demo".to_string(),
        total_tokens: 10,
    };
    assert_eq!(event.run_id(), &run());
    assert_eq!(event.step_id(), None);
    assert_eq!(event.event_type(), "pipeline_complete");
}

#[test]
fn step_id_accessor_covers_step_events() {
    let event = Event::StepSkipped {
        run_id: run(),
        step_id: step(),
        message: "upstream failed_optional".to_string(),
    };
    assert_eq!(event.step_id(), Some(&step()));
    assert_eq!(event.event_type(), "step_skipped");
}

// ── Retry classification ────────────────────────────────────────────────────

#[parameterized(
    timeout = { FailureReason::Timeout, true },
    parse = { FailureReason::StreamParseError, true },
    nonzero = { FailureReason::NonzeroExit, false },
    signal = { FailureReason::Signal, false },
    context = { FailureReason::ContextExhausted, false },
)]
fn retryability(reason: FailureReason, expected: bool) {
    assert_eq!(reason.is_retryable(), expected);
}
