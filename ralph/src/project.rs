//! A project root opened with its config: the stores and adapters every
//! command works with.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;

use crate::core::prompt::PromptComposer;
use crate::io::agent::ClaudeAgent;
use crate::io::archive::Archiver;
use crate::io::backlog_store::BacklogStore;
use crate::io::config::{RalphConfig, load_config};
use crate::io::init::{CONFIG_FILE, RalphPaths};
use crate::io::journal::ProgressJournal;
use crate::io::tracker::GhTracker;
use crate::looping::LoopSettings;
use crate::sync::PushPolicy;

#[derive(Debug, Clone)]
pub struct Project {
    pub config: RalphConfig,
    pub paths: RalphPaths,
    pub store: BacklogStore,
    pub journal: ProgressJournal,
    pub archiver: Archiver,
}

impl Project {
    /// Load `ralph.toml` from `root` (defaults when absent).
    pub fn open(root: &Path) -> Result<Self> {
        let config = load_config(&root.join(CONFIG_FILE))?;
        Ok(Self::with_config(root, config))
    }

    pub fn with_config(root: &Path, config: RalphConfig) -> Self {
        let paths = RalphPaths::new(root, &config);
        let store = BacklogStore::new(&paths.backlog_path);
        let journal = ProgressJournal::new(&paths.journal_path);
        let archiver = Archiver::new(
            store.clone(),
            journal.clone(),
            &paths.branch_marker_path,
            &paths.archive_dir,
        );
        Self {
            config,
            paths,
            store,
            journal,
            archiver,
        }
    }

    pub fn composer(&self) -> Result<PromptComposer> {
        Ok(
            PromptComposer::new(&self.config.gates, self.config.completion_signal.clone())?
                .with_file_names(
                    self.config.backlog_path.display().to_string(),
                    self.config.journal_path.display().to_string(),
                ),
        )
    }

    pub fn agent(&self) -> ClaudeAgent {
        ClaudeAgent::new(self.config.agent.clone())
    }

    /// Tracker adapter, when tracker integration is enabled.
    pub fn tracker(&self) -> Option<GhTracker> {
        self.config
            .tracker
            .enabled
            .then(|| GhTracker::new(self.config.tracker.binary.clone()))
    }

    pub fn push_policy(&self) -> PushPolicy {
        PushPolicy {
            close_on_pass: self.config.tracker.close_on_pass,
            comment_on_progress: self.config.tracker.comment_on_progress,
        }
    }

    pub fn loop_settings(&self, max_iterations: Option<u32>, target: Option<String>) -> LoopSettings {
        LoopSettings {
            max_iterations: max_iterations.unwrap_or(self.config.max_iterations),
            sleep_between_iterations: Duration::from_secs(
                self.config.sleep_between_iterations_secs,
            ),
            target,
            comment_on_progress: self.config.tracker.comment_on_progress,
        }
    }
}
