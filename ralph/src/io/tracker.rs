//! Issue tracker adapter (GitHub via the `gh` CLI).

use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::core::types::ExternalIssue;
use crate::io::process::{CommandOutput, run_captured};

/// Operations ralph needs from an external issue tracker.
pub trait IssueTracker {
    /// Open issues carrying `label`.
    fn pull_issues(&self, label: &str) -> Result<Vec<ExternalIssue>>;

    fn comment(&self, number: u64, body: &str) -> Result<()>;

    fn close(&self, number: u64) -> Result<()>;
}

/// Tracker backed by the GitHub CLI in the current directory's repository.
#[derive(Debug, Clone)]
pub struct GhTracker {
    binary: String,
}

impl GhTracker {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        let output = run_captured(cmd, None).with_context(|| {
            format!(
                "run {} (install it from https://cli.github.com and run `gh auth login`)",
                self.binary
            )
        })?;
        if !output.status.success() {
            return Err(anyhow!(
                "{} {} failed: {}",
                self.binary,
                args.first().copied().unwrap_or_default(),
                output.stderr_lossy().trim()
            ));
        }
        Ok(output)
    }
}

impl IssueTracker for GhTracker {
    #[instrument(skip_all, fields(label))]
    fn pull_issues(&self, label: &str) -> Result<Vec<ExternalIssue>> {
        let output = self.run(&[
            "issue",
            "list",
            "--label",
            label,
            "--state",
            "open",
            "--json",
            "number,title,body,labels",
            "--limit",
            "100",
        ])?;
        let issues: Vec<ExternalIssue> =
            serde_json::from_slice(&output.stdout).context("parse gh issue list output")?;
        debug!(count = issues.len(), "pulled issues");
        Ok(issues)
    }

    #[instrument(skip_all, fields(number))]
    fn comment(&self, number: u64, body: &str) -> Result<()> {
        let number = number.to_string();
        self.run(&["issue", "comment", &number, "--body", body])?;
        Ok(())
    }

    #[instrument(skip_all, fields(number))]
    fn close(&self, number: u64) -> Result<()> {
        let number = number.to_string();
        self.run(&["issue", "close", &number])?;
        Ok(())
    }
}
