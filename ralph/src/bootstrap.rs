//! Backlog generation through the agent (`ralph prd`).

use std::sync::LazyLock;

use anyhow::{Result, anyhow};
use regex::Regex;
use serde_json::Value;
use tracing::{info, instrument};

use crate::backlog::Backlog;
use crate::core::prompt::{BootstrapOrigin, PromptComposer};
use crate::core::types::ExternalIssue;
use crate::io::agent::Agent;
use crate::io::archive::Archiver;
use crate::io::backlog_store::{BacklogStore, parse_backlog};

/// Free-text or tracker input a backlog is generated from.
#[derive(Debug, Clone)]
pub enum BootstrapSource {
    Description(String),
    Document(String),
    Issues(Vec<ExternalIssue>),
}

impl BootstrapSource {
    fn prompt(&self, composer: &PromptComposer) -> Result<String> {
        match self {
            BootstrapSource::Description(text) => {
                composer.bootstrap_prompt(text, BootstrapOrigin::Description)
            }
            BootstrapSource::Document(text) => {
                composer.bootstrap_prompt(text, BootstrapOrigin::Document)
            }
            BootstrapSource::Issues(issues) => composer.import_prompt(issues),
        }
    }
}

/// Pull a JSON document out of agent output: the first fenced block if there
/// is one, otherwise the whole trimmed text. `None` when it does not parse.
pub fn extract_json(output: &str) -> Option<String> {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)```(?:json)?\s*\n(.*?)\n```").expect("fence regex is valid")
    });

    let candidate = FENCE_RE
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map_or(output, |m| m.as_str())
        .trim();
    serde_json::from_str::<Value>(candidate).ok()?;
    Some(candidate.to_string())
}

/// Ask the agent for a backlog, archive the old state when the branch label
/// changes, and save the result.
#[instrument(skip_all)]
pub fn generate_backlog<A: Agent>(
    agent: &A,
    composer: &PromptComposer,
    store: &BacklogStore,
    archiver: &Archiver,
    source: &BootstrapSource,
) -> Result<Backlog> {
    let prompt = source.prompt(composer)?;
    let result = agent.invoke(&prompt)?;
    if !result.successful() {
        return Err(anyhow!(
            "agent session failed with exit code {}: {}",
            result.exit_code,
            result.error_output.trim()
        ));
    }

    let json = extract_json(&result.output).ok_or_else(|| {
        anyhow!(
            "could not extract valid JSON from agent output:\n{}",
            result.output.trim()
        )
    })?;
    let backlog = parse_backlog(store.path(), &json)?;

    if let Some(folder) = archiver.archive_if_switched(&backlog.branch_label)? {
        info!(archive = %folder.display(), "archived previous backlog before overwrite");
    }
    store.save(&backlog)?;
    info!(items = backlog.total_count(), "saved generated backlog");
    Ok(backlog)
}
