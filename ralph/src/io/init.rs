//! Project paths and `ralph init` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::backlog::default_backlog;
use crate::io::backlog_store::BacklogStore;
use crate::io::config::{RalphConfig, write_config};
use crate::io::journal::ProgressJournal;

/// Config file name at the project root.
pub const CONFIG_FILE: &str = "ralph.toml";
/// Agent instruction file the `claude` CLI reads on startup.
pub const AGENT_NOTES_FILE: &str = "CLAUDE.md";

const AGENT_NOTES_MARKER: &str = "# Ralph Agent Instructions";
const AGENT_NOTES: &str = "\
# Ralph Agent Instructions

This project is worked by an autonomous loop. Each session implements exactly one
backlog item from `prd.json`.

- Read `progress.txt` before starting; earlier sessions left learnings there.
- Keep changes scoped to the selected item.
- Run every quality gate listed in the prompt before committing.
- Set the item's `passes` field to true only after the gates pass.
- Append what you did and what you learned to `progress.txt`; never rewrite it.
";

/// All canonical paths for a project root under a given config.
#[derive(Debug, Clone)]
pub struct RalphPaths {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub backlog_path: PathBuf,
    pub journal_path: PathBuf,
    pub branch_marker_path: PathBuf,
    pub archive_dir: PathBuf,
    pub agent_notes_path: PathBuf,
}

impl RalphPaths {
    pub fn new(root: impl Into<PathBuf>, config: &RalphConfig) -> Self {
        let root = root.into();
        Self {
            config_path: root.join(CONFIG_FILE),
            backlog_path: root.join(&config.backlog_path),
            journal_path: root.join(&config.journal_path),
            branch_marker_path: root.join(&config.branch_marker_path),
            archive_dir: root.join(&config.archive_dir),
            agent_notes_path: root.join(AGENT_NOTES_FILE),
            root,
        }
    }
}

/// Options for `init_project`.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// If true, overwrite existing ralph-owned files.
    pub force: bool,
}

/// What `init_project` did to each file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitAction {
    Created(PathBuf),
    Appended(PathBuf),
    Skipped(PathBuf),
}

/// Scaffold config, stub backlog, journal and agent notes in `root`.
///
/// Existing files are skipped unless `options.force` is set. The agent notes
/// file is never overwritten; instructions are appended when missing.
pub fn init_project(root: &Path, options: &InitOptions) -> Result<(RalphPaths, Vec<InitAction>)> {
    let config_path = root.join(CONFIG_FILE);
    let mut actions = Vec::new();

    let config = if config_path.exists() && !options.force {
        actions.push(InitAction::Skipped(config_path.clone()));
        crate::io::config::load_config(&config_path)?
    } else {
        let config = RalphConfig::default();
        write_config(&config_path, &config)?;
        actions.push(InitAction::Created(config_path.clone()));
        config
    };
    let paths = RalphPaths::new(root, &config);

    let store = BacklogStore::new(&paths.backlog_path);
    if store.exists() && !options.force {
        actions.push(InitAction::Skipped(paths.backlog_path.clone()));
    } else {
        store.save(&default_backlog(&project_name(root)))?;
        actions.push(InitAction::Created(paths.backlog_path.clone()));
    }

    let journal = ProgressJournal::new(&paths.journal_path);
    if journal.exists() && !options.force {
        actions.push(InitAction::Skipped(paths.journal_path.clone()));
    } else {
        journal.clear()?;
        journal.initialize()?;
        actions.push(InitAction::Created(paths.journal_path.clone()));
    }

    actions.push(scaffold_agent_notes(&paths.agent_notes_path)?);
    debug!(root = %root.display(), "initialized project");
    Ok((paths, actions))
}

fn scaffold_agent_notes(path: &Path) -> Result<InitAction> {
    if !path.exists() {
        fs::write(path, AGENT_NOTES).with_context(|| format!("write {}", path.display()))?;
        return Ok(InitAction::Created(path.to_path_buf()));
    }
    let existing = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    if existing.contains(AGENT_NOTES_MARKER) {
        return Ok(InitAction::Skipped(path.to_path_buf()));
    }
    let mut combined = existing;
    combined.push_str("\n\n");
    combined.push_str(AGENT_NOTES);
    fs::write(path, combined).with_context(|| format!("write {}", path.display()))?;
    Ok(InitAction::Appended(path.to_path_buf()))
}

fn project_name(root: &Path) -> String {
    root.canonicalize()
        .ok()
        .and_then(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "project".to_string())
}
