// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn assistant_usage_becomes_token_delta() {
    let line = r#"{"type":"assistant","message":{"usage":{"output_tokens":42}}}"#;
    assert_eq!(parse_line(line), Some(StreamEvent::TokenUsage { delta: 42 }));
}

#[test]
fn tool_use_block_becomes_tool_event() {
    let line = r#"{"type":"assistant","message":{"content":[
        {"type":"tool_use","name":"Read","input":{"file_path":"/src/main.rs"}}
    ],"usage":{"output_tokens":5}}}"#
        .replace('\n', "");
    assert_eq!(
        parse_line(&line),
        Some(StreamEvent::ToolUse {
            tool: "Read".to_string(),
            detail: "/src/main.rs".to_string(),
        })
    );
}

#[test]
fn long_tool_detail_is_truncated() {
    let long = "x".repeat(200);
    let line = format!(
        r#"{{"type":"assistant","message":{{"content":[{{"type":"tool_use","name":"Bash","input":{{"command":"{long}"}}}}]}}}}"#
    );
    match parse_line(&line) {
        Some(StreamEvent::ToolUse { detail, .. }) => {
            assert_eq!(detail.len(), 80);
            assert!(detail.ends_with("..."));
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn result_success_carries_parsed_output() {
    let line = r#"{"type":"result","subtype":"success","usage":{"output_tokens":100},"result":"{\"verdict\":\"pass\"}"}"#;
    match parse_line(line) {
        Some(StreamEvent::Result {
            subtype,
            tokens,
            output,
            is_error,
        }) => {
            assert_eq!(subtype.as_deref(), Some("success"));
            assert_eq!(tokens, Some(100));
            assert!(!is_error);
            assert_eq!(output.unwrap()["verdict"], "pass");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn non_json_result_string_is_kept_verbatim() {
    let line = r#"{"type":"result","subtype":"success","result":"all done"}"#;
    match parse_line(line) {
        Some(StreamEvent::Result { output, .. }) => {
            assert_eq!(output, Some(serde_json::Value::String("all done".to_string())));
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn error_subtype_marks_result_as_error() {
    let line = r#"{"type":"result","subtype":"error_during_execution"}"#;
    match parse_line(line) {
        Some(StreamEvent::Result { is_error, .. }) => assert!(is_error),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn delta_records_carry_text() {
    let line = r#"{"type":"content_block_delta","delta":{"text":"thinking"}}"#;
    assert_eq!(
        parse_line(line),
        Some(StreamEvent::Delta {
            text: "thinking".to_string()
        })
    );
}

#[parameterized(
    blank = { "" },
    garbage = { "not json at all" },
    unknown_type = { r#"{"type":"system","message":"hello"}"# },
    missing_type = { r#"{"message":"hello"}"# },
)]
fn unparseable_or_unknown_lines_are_skipped(line: &str) {
    assert_eq!(parse_line(line), None);
}

#[parameterized(
    context = { "error_context_exhausted", Some(FailureReason::ContextExhausted) },
    context_window = { "error_context_window", Some(FailureReason::ContextExhausted) },
    during_execution = { "error_during_execution", Some(FailureReason::NonzeroExit) },
    max_turns = { "error_max_turns", Some(FailureReason::NonzeroExit) },
    success = { "success", None },
)]
fn error_subtype_classification(subtype: &str, expected: Option<FailureReason>) {
    assert_eq!(classify_error_subtype(subtype), expected);
}
