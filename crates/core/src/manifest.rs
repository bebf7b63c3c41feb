// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolved manifest model: personas and skills
//!
//! Manifest YAML parsing is an external collaborator; the engine receives
//! these already-resolved shapes.

use serde::{Deserialize, Serialize};

/// Tool permission lists written into the step workspace for the adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

/// A named role with its own system prompt and permission set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaDef {
    pub name: String,
    /// Adapter binary this persona runs under (e.g. "claude").
    pub adapter: String,
    #[serde(default)]
    pub description: String,
    /// Resolved system prompt content (the loader reads the prompt file).
    pub system_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub permissions: Permissions,
}

/// A declarable external command family, auto-installable during preflight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillDef {
    pub name: String,
    /// Probe command; zero exit means the skill is available.
    pub check: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<String>,
    /// One-time setup command run after a successful install.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<String>,
    /// Glob of command files staged into step workspaces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands_glob: Option<String>,
}
