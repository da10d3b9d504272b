//! Shared deterministic types for ralph core logic.
//!
//! These types define stable contracts between the loop, the composer and the
//! I/O adapters. They carry no I/O of their own.

use serde::{Deserialize, Serialize};

/// Captured result of one non-interactive agent session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResult {
    pub output: String,
    pub error_output: String,
    /// Process exit code; `-1` when the process was terminated by a signal.
    pub exit_code: i32,
}

impl InvocationResult {
    pub fn successful(&self) -> bool {
        self.exit_code == 0
    }

    /// Raw substring test against captured stdout.
    pub fn contains_signal(&self, marker: &str) -> bool {
        self.output.contains(marker)
    }
}

/// A check the agent must run itself before declaring an item done.
///
/// Ralph never executes gates; enabled gates are rendered into the prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QualityGate {
    pub name: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

fn enabled_by_default() -> bool {
    true
}

impl QualityGate {
    pub fn new(name: &str, command: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            command: command.to_string(),
            label: Some(label.to_string()),
            enabled: true,
            fallback: None,
        }
    }

    /// Display label, falling back to the raw command.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.command)
    }
}

/// An open issue pulled from the external tracker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalIssue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub labels: Vec<IssueLabel>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssueLabel {
    pub name: String,
}
