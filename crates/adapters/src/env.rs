// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Curated subprocess environment.
//!
//! Adapter subprocesses never inherit the parent environment wholesale: only
//! a small base set plus variables the step explicitly enumerates are passed
//! through. Everything else — including credentials — stays out.

/// Variables every adapter subprocess receives when set in the parent.
const BASE_VARS: [&str; 4] = ["HOME", "PATH", "TERM", "TMPDIR"];

/// Build the environment for an adapter subprocess.
///
/// Returns base variables plus `passthrough` names resolved from the current
/// process, skipping names that are unset. Duplicate names keep the first
/// occurrence.
pub fn curated_env(passthrough: &[String]) -> Vec<(String, String)> {
    let mut env = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for name in BASE_VARS.iter().copied().chain(passthrough.iter().map(String::as_str)) {
        if !seen.insert(name.to_string()) {
            continue;
        }
        if let Ok(value) = std::env::var(name) {
            env.push((name.to_string(), value));
        }
    }

    env
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
