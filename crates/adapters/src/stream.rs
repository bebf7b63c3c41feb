// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! NDJSON stream parsing for adapter output.
//!
//! The adapter writes one JSON record per line to stdout. Each line is a
//! content delta, a token-usage delta, tool activity, or the terminal result
//! record. The sequence is finite and non-restartable; on timeout the runner
//! makes one final pass over the buffered remainder so partial token counts
//! are still reported.

use wave_core::FailureReason;

/// One parsed line of adapter output.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Assistant content delta.
    Delta { text: String },
    /// Output-token delta since the previous usage record.
    TokenUsage { delta: u64 },
    /// A tool invocation observed in the stream.
    ToolUse { tool: String, detail: String },
    /// Terminal result record.
    Result {
        subtype: Option<String>,
        tokens: Option<u64>,
        output: Option<serde_json::Value>,
        is_error: bool,
    },
}

/// Extract a string value from a JSON object by key.
fn get_str<'a>(obj: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(|v| v.as_str())
}

/// Parse one NDJSON line. Unknown or malformed records return `None`; the
/// stream stays tolerant of record types added by newer adapter versions.
pub fn parse_line(line: &str) -> Option<StreamEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let json: serde_json::Value = serde_json::from_str(trimmed).ok()?;

    match get_str(&json, "type")? {
        "assistant" => parse_assistant(&json),
        "result" => parse_result(&json),
        "content_block_delta" | "stream_event" => {
            let text = json
                .pointer("/delta/text")
                .and_then(|t| t.as_str())
                .unwrap_or_default();
            Some(StreamEvent::Delta {
                text: text.to_string(),
            })
        }
        _ => None,
    }
}

/// Assistant records carry usage deltas and tool_use blocks.
fn parse_assistant(json: &serde_json::Value) -> Option<StreamEvent> {
    let message = json.get("message")?;

    // Tool use takes precedence for activity reporting.
    if let Some(content) = message.get("content").and_then(|c| c.as_array()) {
        for block in content {
            if get_str(block, "type") != Some("tool_use") {
                continue;
            }
            let Some(tool) = get_str(block, "name") else {
                continue;
            };
            let detail = block
                .get("input")
                .map(summarize_tool_input)
                .unwrap_or_default();
            return Some(StreamEvent::ToolUse {
                tool: tool.to_string(),
                detail,
            });
        }
    }

    let delta = message
        .get("usage")
        .and_then(|u| u.get("output_tokens"))
        .and_then(|t| t.as_u64())?;
    Some(StreamEvent::TokenUsage { delta })
}

fn parse_result(json: &serde_json::Value) -> Option<StreamEvent> {
    let subtype = get_str(json, "subtype").map(String::from);
    let is_error = json
        .get("is_error")
        .and_then(|v| v.as_bool())
        .unwrap_or_else(|| {
            subtype
                .as_deref()
                .map(|s| s.starts_with("error"))
                .unwrap_or(false)
        });
    let tokens = json
        .pointer("/usage/output_tokens")
        .and_then(|t| t.as_u64());

    // The result payload is either a JSON document or a string that may
    // itself contain JSON.
    let output = json.get("result").cloned().map(|value| match value {
        serde_json::Value::String(s) => {
            serde_json::from_str(&s).unwrap_or(serde_json::Value::String(s))
        }
        other => other,
    });

    Some(StreamEvent::Result {
        subtype,
        tokens,
        output,
        is_error,
    })
}

/// Short human-readable summary of a tool input for activity events.
fn summarize_tool_input(input: &serde_json::Value) -> String {
    for key in ["file_path", "command", "path", "pattern"] {
        if let Some(value) = get_str(input, key) {
            let mut s = value.to_string();
            if s.len() > 80 {
                s.truncate(77);
                s.push_str("...");
            }
            return s;
        }
    }
    String::new()
}

/// Map a terminal result subtype onto a failure classification.
///
/// Only subtypes the engine knows get a specific class; any other error
/// subtype falls back to nonzero-exit semantics.
pub fn classify_error_subtype(subtype: &str) -> Option<FailureReason> {
    if !subtype.starts_with("error") {
        return None;
    }
    if subtype.contains("context") {
        Some(FailureReason::ContextExhausted)
    } else {
        Some(FailureReason::NonzeroExit)
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
