//! Prompt composition for agent sessions.
//!
//! Everything here is pure: the same backlog, item, journal text and iteration
//! number always render the same prompt, so prompts can be diffed across
//! iterations. The iteration prompt is assembled from marked sections and a
//! section that renders empty contributes nothing (not even its heading).
//!
//! The bootstrap and import prompts share one schema template; editing
//! `prompts/backlog_schema.md` changes all three prompts at once.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::backlog::{Backlog, Item};
use crate::core::types::{ExternalIssue, QualityGate};

const ITERATION_TEMPLATE: &str = include_str!("prompts/iteration.md");
const BOOTSTRAP_TEMPLATE: &str = include_str!("prompts/bootstrap.md");
const IMPORT_TEMPLATE: &str = include_str!("prompts/import.md");
const BACKLOG_SCHEMA_TEMPLATE: &str = include_str!("prompts/backlog_schema.md");

/// Where the free text fed to a bootstrap prompt came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOrigin {
    /// A description typed by the operator.
    Description,
    /// A requirements document read from disk.
    Document,
}

impl BootstrapOrigin {
    fn as_str(self) -> &'static str {
        match self {
            BootstrapOrigin::Description => "description",
            BootstrapOrigin::Document => "document",
        }
    }
}

/// Selected item context for template rendering.
#[derive(Debug, Clone, Serialize)]
struct ItemContext {
    id: String,
    title: String,
    description: String,
    acceptance_criteria: Vec<String>,
}

impl ItemContext {
    fn from_item(item: &Item) -> Self {
        Self {
            id: item.id.clone(),
            title: item.title.clone(),
            description: item.description.trim().to_string(),
            acceptance_criteria: item.acceptance_criteria.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct GateContext {
    label: String,
    command: String,
    fallback: Option<String>,
}

/// Renders every prompt ralph sends to the agent.
pub struct PromptComposer {
    env: Environment<'static>,
    gates: Vec<GateContext>,
    completion_signal: String,
    backlog_file: String,
    journal_file: String,
}

impl PromptComposer {
    /// Build a composer for the enabled subset of `gates`.
    pub fn new(gates: &[QualityGate], completion_signal: impl Into<String>) -> Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_template("iteration", ITERATION_TEMPLATE)
            .context("load iteration template")?;
        env.add_template("bootstrap", BOOTSTRAP_TEMPLATE)
            .context("load bootstrap template")?;
        env.add_template("import", IMPORT_TEMPLATE)
            .context("load import template")?;
        env.add_template("backlog_schema", BACKLOG_SCHEMA_TEMPLATE)
            .context("load backlog schema template")?;

        let gates = gates
            .iter()
            .filter(|gate| gate.enabled)
            .map(|gate| GateContext {
                label: gate.display_label().to_string(),
                command: gate.command.clone(),
                fallback: gate.fallback.clone(),
            })
            .collect();

        Ok(Self {
            env,
            gates,
            completion_signal: completion_signal.into(),
            backlog_file: "prd.json".to_string(),
            journal_file: "progress.txt".to_string(),
        })
    }

    /// Override the file names the instructions refer to.
    pub fn with_file_names(
        mut self,
        backlog_file: impl Into<String>,
        journal_file: impl Into<String>,
    ) -> Self {
        self.backlog_file = backlog_file.into();
        self.journal_file = journal_file.into();
        self
    }

    pub fn completion_signal(&self) -> &str {
        &self.completion_signal
    }

    /// Prompt for one loop iteration working on `item`.
    pub fn iteration_prompt(
        &self,
        backlog: &Backlog,
        item: &Item,
        journal: &str,
        iteration: u32,
    ) -> Result<String> {
        let backlog_json =
            serde_json::to_string_pretty(backlog).context("serialize backlog for prompt")?;
        let journal = journal.trim();
        let rendered = self.env.get_template("iteration")?.render(context! {
            backlog_json => backlog_json,
            item => ItemContext::from_item(item),
            iteration => iteration,
            gates => &self.gates,
            journal => (!journal.is_empty()).then_some(journal),
            completion_signal => &self.completion_signal,
            backlog_file => &self.backlog_file,
            journal_file => &self.journal_file,
        })?;

        let sections = parse_sections(&rendered);
        debug!(
            item = %item.id,
            sections = ?sections.iter().map(|s| s.key.as_str()).collect::<Vec<_>>(),
            "composed iteration prompt"
        );
        Ok(render_sections(&sections))
    }

    /// Prompt asking the agent to turn free text into a backlog document.
    pub fn bootstrap_prompt(&self, input: &str, origin: BootstrapOrigin) -> Result<String> {
        let rendered = self.env.get_template("bootstrap")?.render(context! {
            origin => origin.as_str(),
            input => input.trim(),
            gates => &self.gates,
            backlog_file => &self.backlog_file,
        })?;
        Ok(rendered.trim().to_string())
    }

    /// Prompt asking the agent to turn tracker issues into backlog items, one
    /// item per issue.
    pub fn import_prompt(&self, issues: &[ExternalIssue]) -> Result<String> {
        let issues_json =
            serde_json::to_string_pretty(issues).context("serialize issues for prompt")?;
        let rendered = self.env.get_template("import")?.render(context! {
            issues_json => issues_json,
            gates => &self.gates,
            backlog_file => &self.backlog_file,
        })?;
        Ok(rendered.trim().to_string())
    }
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    /// Section identifier (e.g., "preamble", "journal").
    key: String,
    /// Section content without its marker.
    content: String,
}

/// Parse sections from rendered template output using HTML comment markers.
///
/// Markers follow format: `<!-- section:KEY -->`. Sections that render empty are
/// dropped.
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"<!--\s*section:(\w+)\s*-->").expect("section marker regex is valid")
    });

    let markers: Vec<(String, usize, usize)> = SECTION_RE
        .captures_iter(rendered)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let key = caps.get(1)?.as_str().to_string();
            Some((key, whole.start(), whole.end()))
        })
        .collect();

    let mut sections = Vec::new();
    for (i, (key, _, content_start)) in markers.iter().enumerate() {
        let content_end = markers
            .get(i + 1)
            .map(|(_, next_start, _)| *next_start)
            .unwrap_or(rendered.len());
        let content = rendered[*content_start..content_end].trim().to_string();
        if content.is_empty() {
            debug!(section = %key, "omitting empty prompt section");
            continue;
        }
        sections.push(ParsedSection {
            key: key.clone(),
            content,
        });
    }
    sections
}

/// Render sections back to a single string.
fn render_sections(sections: &[ParsedSection]) -> String {
    let mut out = sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{backlog_with, item};

    const SIGNAL: &str = "<promise>COMPLETE</promise>";

    fn gates() -> Vec<QualityGate> {
        let mut tests = QualityGate::new("tests", "cargo test", "Tests");
        tests.fallback = Some("cargo test --workspace".to_string());
        let mut disabled = QualityGate::new("fmt", "cargo fmt --check", "Format");
        disabled.enabled = false;
        vec![
            QualityGate::new("clippy", "cargo clippy -- -D warnings", "Clippy"),
            tests,
            disabled,
        ]
    }

    fn composer() -> PromptComposer {
        PromptComposer::new(&gates(), SIGNAL).expect("composer")
    }

    fn selected() -> Item {
        let mut item = item("US-002", 1, false);
        item.title = "Add login form".to_string();
        item.acceptance_criteria = vec![
            "Form posts to /login".to_string(),
            "Invalid password shows an error".to_string(),
        ];
        item
    }

    /// Sections must appear in a fixed order so prompts diff cleanly across
    /// iterations.
    #[test]
    fn iteration_sections_appear_in_fixed_order() {
        let backlog = backlog_with(vec![item("US-001", 2, false), selected()]);
        let prompt = composer()
            .iteration_prompt(&backlog, &selected(), "learned: use sqlx", 3)
            .expect("compose");

        let preamble = prompt.find("autonomous coding agent").expect("preamble");
        let state = prompt.find("## Current Backlog State").expect("backlog");
        let task = prompt.find("## Your Task (Iteration 3)").expect("task");
        let gates = prompt.find("## Quality Gates").expect("gates");
        let journal = prompt.find("## Progress Log").expect("journal");
        let instructions = prompt.find("## Instructions").expect("instructions");

        assert!(preamble < state);
        assert!(state < task);
        assert!(task < gates);
        assert!(gates < journal);
        assert!(journal < instructions);
        assert!(prompt.contains("\"id\": \"US-001\""));
        assert!(prompt.contains("- Form posts to /login"));
        assert!(prompt.contains("learned: use sqlx"));
    }

    #[test]
    fn empty_journal_contributes_no_heading() {
        let backlog = backlog_with(vec![selected()]);
        let prompt = composer()
            .iteration_prompt(&backlog, &selected(), "  \n", 1)
            .expect("compose");
        assert!(!prompt.contains("## Progress Log"));
        assert!(!prompt.contains("\n\n\n"));
    }

    #[test]
    fn only_enabled_gates_are_rendered() {
        let backlog = backlog_with(vec![selected()]);
        let prompt = composer()
            .iteration_prompt(&backlog, &selected(), "", 1)
            .expect("compose");
        assert!(prompt.contains("- **Clippy**: `cargo clippy -- -D warnings`"));
        assert!(prompt.contains("- **Tests**: `cargo test`"));
        assert!(prompt.contains("  - Fallback: `cargo test --workspace`"));
        assert!(!prompt.contains("cargo fmt --check"));
    }

    #[test]
    fn no_enabled_gates_drops_the_gate_section() {
        let composer = PromptComposer::new(&[], SIGNAL).expect("composer");
        let backlog = backlog_with(vec![selected()]);
        let prompt = composer
            .iteration_prompt(&backlog, &selected(), "", 1)
            .expect("compose");
        assert!(!prompt.contains("## Quality Gates"));
        assert!(prompt.contains("Run the project's own checks"));
    }

    #[test]
    fn instructions_end_with_the_completion_sentinel() {
        let backlog = backlog_with(vec![selected()]);
        let prompt = composer()
            .with_file_names("work/prd.json", "work/progress.txt")
            .iteration_prompt(&backlog, &selected(), "", 1)
            .expect("compose");
        let last_line = prompt.trim_end().lines().last().expect("last line");
        assert!(last_line.ends_with(SIGNAL));
        assert!(last_line.contains("every item passes"));
        assert!(prompt.contains("Update work/prd.json"));
        assert!(prompt.contains("to work/progress.txt"));
    }

    #[test]
    fn iteration_prompt_is_deterministic() {
        let backlog = backlog_with(vec![item("US-001", 2, false), selected()]);
        let composer = composer();
        let first = composer
            .iteration_prompt(&backlog, &selected(), "journal", 2)
            .expect("first");
        let second = composer
            .iteration_prompt(&backlog, &selected(), "journal", 2)
            .expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn bootstrap_framing_differs_by_origin_but_schema_does_not() {
        let composer = composer();
        let described = composer
            .bootstrap_prompt("a todo app", BootstrapOrigin::Description)
            .expect("described");
        let documented = composer
            .bootstrap_prompt("# Requirements\n- todo", BootstrapOrigin::Document)
            .expect("documented");

        assert!(described.contains("User's description:\na todo app"));
        assert!(documented.contains("Requirements:\n# Requirements"));
        assert!(described.contains("Include \"Tests passes\""));
        assert!(!described.contains("Format passes"));

        let schema = BACKLOG_SCHEMA_TEMPLATE.trim();
        assert!(described.contains(schema));
        assert!(documented.contains(schema));
    }

    #[test]
    fn import_prompt_preserves_issue_numbers() {
        let issues = vec![ExternalIssue {
            number: 17,
            title: "Export CSV".to_string(),
            body: "Users want CSV export".to_string(),
            labels: Vec::new(),
        }];
        let prompt = composer().import_prompt(&issues).expect("import");
        assert!(prompt.contains("exactly one item"));
        assert!(prompt.contains("\"issueNumber\""));
        assert!(prompt.contains("\"number\": 17"));
        assert!(prompt.contains(BACKLOG_SCHEMA_TEMPLATE.trim()));
        assert!(prompt.contains("independently verifiable"));
    }
}
