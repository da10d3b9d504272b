//! Ralph configuration stored in `ralph.toml` at the project root.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::QualityGate;

/// Ralph configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields take the
/// defaults below; paths are relative to the project root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RalphConfig {
    pub backlog_path: PathBuf,
    pub journal_path: PathBuf,
    /// One-line file remembering the branch label the journal belongs to.
    pub branch_marker_path: PathBuf,
    pub archive_dir: PathBuf,

    /// Upper bound on agent invocations per `ralph run`.
    pub max_iterations: u32,
    pub sleep_between_iterations_secs: u64,

    /// Exact text the agent prints once every item passes.
    pub completion_signal: String,

    pub agent: AgentConfig,
    pub tracker: TrackerConfig,

    /// Checks rendered into every iteration prompt, in order.
    pub gates: Vec<QualityGate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    pub binary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
    pub permission_mode: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            binary: "claude".to_string(),
            model: None,
            max_turns: None,
            permission_mode: "bypassPermissions".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TrackerConfig {
    pub enabled: bool,
    /// GitHub CLI executable.
    pub binary: String,
    /// Only issues carrying this label are pulled.
    pub label: String,
    pub close_on_pass: bool,
    pub comment_on_progress: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            binary: "gh".to_string(),
            label: "ralph".to_string(),
            close_on_pass: true,
            comment_on_progress: true,
        }
    }
}

impl Default for RalphConfig {
    fn default() -> Self {
        Self {
            backlog_path: PathBuf::from("prd.json"),
            journal_path: PathBuf::from("progress.txt"),
            branch_marker_path: PathBuf::from(".ralph-branch"),
            archive_dir: PathBuf::from("archive"),
            max_iterations: 10,
            sleep_between_iterations_secs: 2,
            completion_signal: "<promise>COMPLETE</promise>".to_string(),
            agent: AgentConfig::default(),
            tracker: TrackerConfig::default(),
            gates: default_gates(),
        }
    }
}

fn default_gates() -> Vec<QualityGate> {
    vec![
        QualityGate::new(
            "clippy",
            "cargo clippy --all-targets -- -D warnings",
            "Clippy",
        ),
        QualityGate::new("tests", "cargo test", "Tests"),
    ]
}

impl RalphConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.completion_signal.trim().is_empty() {
            return Err(anyhow!("completion_signal must not be empty"));
        }
        if self.agent.binary.trim().is_empty() {
            return Err(anyhow!("agent.binary must not be empty"));
        }
        if self.tracker.enabled && self.tracker.binary.trim().is_empty() {
            return Err(anyhow!("tracker.binary must not be empty"));
        }
        let mut names = HashSet::new();
        for (index, gate) in self.gates.iter().enumerate() {
            if gate.name.trim().is_empty() {
                return Err(anyhow!("gates[{index}].name must not be empty"));
            }
            if gate.command.trim().is_empty() {
                return Err(anyhow!("gate '{}' has an empty command", gate.name));
            }
            if !names.insert(gate.name.as_str()) {
                return Err(anyhow!("duplicate gate name '{}'", gate.name));
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RalphConfig::default()`.
pub fn load_config(path: &Path) -> Result<RalphConfig> {
    if !path.exists() {
        let cfg = RalphConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RalphConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RalphConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
