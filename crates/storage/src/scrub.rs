// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential scrubbing applied before anything reaches the event log.
//!
//! Two layers: object keys matching the sensitive suffixes have their values
//! replaced wholesale, and free-form strings are checked for inline
//! `NAME=value` assignments of sensitive names.

use regex::Regex;
use std::sync::OnceLock;

const REDACTED: &str = "[REDACTED]";

const SENSITIVE_SUFFIXES: [&str; 4] = ["_KEY", "_TOKEN", "_SECRET", "_PASSWORD"];

/// True if the key names a credential (`*_KEY|*_TOKEN|*_SECRET|*_PASSWORD`,
/// case-insensitive).
pub fn is_sensitive_key(key: &str) -> bool {
    let upper = key.to_ascii_uppercase();
    SENSITIVE_SUFFIXES.iter().any(|s| upper.ends_with(s))
}

// The pattern is a compile-time constant; a parse failure is unreachable.
#[allow(clippy::unwrap_used)]
fn assignment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // NAME=value where NAME carries a sensitive suffix. Value runs to the
        // next whitespace or quote.
        Regex::new(r#"(?i)\b([A-Z0-9_]*_(?:KEY|TOKEN|SECRET|PASSWORD))=([^\s'"]+)"#).unwrap()
    })
}

/// Redact inline `NAME=value` credential assignments in a line of text.
pub fn scrub_line(line: &str) -> String {
    assignment_pattern()
        .replace_all(line, format!("${{1}}={REDACTED}"))
        .into_owned()
}

/// Recursively scrub a JSON value in place.
pub fn scrub_value(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if is_sensitive_key(key) {
                    *val = serde_json::Value::String(REDACTED.to_string());
                } else {
                    scrub_value(val);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items.iter_mut() {
                scrub_value(item);
            }
        }
        serde_json::Value::String(s) => {
            let scrubbed = scrub_line(s);
            if scrubbed != *s {
                *s = scrubbed;
            }
        }
        _ => {}
    }
}

#[cfg(test)]
#[path = "scrub_tests.rs"]
mod tests;
