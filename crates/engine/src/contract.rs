// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handover contract validation.
//!
//! A step's declared contract is a JSON Schema applied to the adapter's final
//! output. Adapters sometimes wrap their real payload in an error-reporting
//! envelope (`{error_type, raw_output, ...}`); the validator unwraps that
//! shape and validates the payload inside it.

use std::borrow::Cow;
use std::fmt;
use wave_core::ContractIssue;

/// A failed validation with its deterministic finding list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub errors: Vec<ContractIssue>,
    /// Document-level violations are retryable (the adapter can produce a
    /// corrected document); schema or I/O problems are not.
    pub retryable: bool,
    pub attempt: u32,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} violation(s) on attempt {}", self.errors.len(), self.attempt)?;
        if let Some(first) = self.errors.first() {
            write!(f, "; first: {} at {}", first.message, first.path)?;
        }
        Ok(())
    }
}

/// Validation outcome classification.
#[derive(Debug, Clone)]
pub enum ContractError {
    /// The document does not satisfy the schema.
    Failed(ValidationFailure),
    /// The schema itself is unusable; retrying cannot help.
    Fatal(String),
}

/// Validate an output document against a step's contract schema.
pub fn validate_contract(
    schema: &serde_json::Value,
    output: &serde_json::Value,
    attempt: u32,
) -> Result<(), ContractError> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| ContractError::Fatal(format!("invalid contract schema: {e}")))?;

    let document = unwrap_error_envelope(output);

    let mut errors: Vec<ContractIssue> = validator
        .iter_errors(&document)
        .map(|e| ContractIssue {
            path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect();

    if errors.is_empty() {
        return Ok(());
    }

    // Deterministic order for events and tests.
    errors.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.message.cmp(&b.message)));

    Err(ContractError::Failed(ValidationFailure {
        errors,
        retryable: true,
        attempt,
    }))
}

/// If the output is a known error envelope, validate its `raw_output` payload
/// instead of the envelope itself. A string payload that parses as JSON is
/// validated in parsed form.
fn unwrap_error_envelope(output: &serde_json::Value) -> Cow<'_, serde_json::Value> {
    let Some(obj) = output.as_object() else {
        return Cow::Borrowed(output);
    };
    if !obj.contains_key("error_type") {
        return Cow::Borrowed(output);
    }
    match obj.get("raw_output") {
        Some(serde_json::Value::String(s)) => match serde_json::from_str(s) {
            Ok(parsed) => Cow::Owned(parsed),
            Err(_) => Cow::Owned(serde_json::Value::String(s.clone())),
        },
        Some(raw) => Cow::Borrowed(raw),
        None => Cow::Borrowed(output),
    }
}

#[cfg(test)]
#[path = "contract_tests.rs"]
mod tests;
