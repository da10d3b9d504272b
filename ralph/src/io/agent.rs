//! Agent abstraction for invoking the external coding agent.
//!
//! The [`Agent`] trait decouples the loop from the actual agent backend
//! (currently the `claude` CLI). Tests use scripted agents that return
//! predetermined results without spawning processes.

use std::process::Command;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::types::InvocationResult;
use crate::io::config::AgentConfig;
use crate::io::process::{run_captured, run_inherited};

/// Abstraction over agent execution backends.
pub trait Agent {
    /// Run one non-interactive session with `prompt` on stdin and wait for it.
    ///
    /// A non-zero exit is reported through [`InvocationResult::exit_code`];
    /// only a failure to start the process is an error.
    fn invoke(&self, prompt: &str) -> Result<InvocationResult>;

    /// Run an interactive session on the operator's terminal.
    fn passthrough(&self, prompt: &str) -> Result<i32>;
}

/// Agent that spawns the `claude` CLI.
#[derive(Debug, Clone)]
pub struct ClaudeAgent {
    config: AgentConfig,
}

impl ClaudeAgent {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    /// Arguments for a non-interactive `--print` session.
    pub fn print_args(&self) -> Vec<String> {
        let mut args = vec![
            "--print".to_string(),
            "--permission-mode".to_string(),
            self.config.permission_mode.clone(),
        ];
        self.push_optional_args(&mut args);
        args
    }

    /// Arguments for an interactive session seeded with `prompt`.
    pub fn interactive_args(&self, prompt: &str) -> Vec<String> {
        let mut args = vec![
            "--permission-mode".to_string(),
            self.config.permission_mode.clone(),
            "-p".to_string(),
            prompt.to_string(),
        ];
        self.push_optional_args(&mut args);
        args
    }

    fn push_optional_args(&self, args: &mut Vec<String>) {
        if let Some(model) = &self.config.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if let Some(max_turns) = self.config.max_turns {
            args.push("--max-turns".to_string());
            args.push(max_turns.to_string());
        }
    }
}

impl Agent for ClaudeAgent {
    #[instrument(skip_all, fields(binary = %self.config.binary, prompt_bytes = prompt.len()))]
    fn invoke(&self, prompt: &str) -> Result<InvocationResult> {
        info!("starting agent session");
        let mut cmd = Command::new(&self.config.binary);
        cmd.args(self.print_args());

        let output = run_captured(cmd, Some(prompt.as_bytes()))
            .with_context(|| format!("run {}", self.config.binary))?;
        let result = InvocationResult {
            output: output.stdout_lossy(),
            error_output: output.stderr_lossy(),
            exit_code: output.exit_code(),
        };
        if !result.successful() {
            warn!(exit_code = result.exit_code, "agent session exited non-zero");
        }
        Ok(result)
    }

    #[instrument(skip_all, fields(binary = %self.config.binary))]
    fn passthrough(&self, prompt: &str) -> Result<i32> {
        let mut cmd = Command::new(&self.config.binary);
        cmd.args(self.interactive_args(prompt));
        run_inherited(cmd).with_context(|| format!("run {}", self.config.binary))
    }
}
