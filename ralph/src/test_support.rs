//! Test-only builders and scripted doubles.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::backlog::{Backlog, Item};
use crate::core::types::InvocationResult;
use crate::io::agent::Agent;
use crate::io::backlog_store::BacklogStore;
use crate::io::journal::ProgressJournal;

/// Create a deterministic item with default fields.
pub fn item(id: &str, priority: i64, passes: bool) -> Item {
    Item {
        id: id.to_string(),
        title: format!("{id} title"),
        description: format!("{id} description"),
        acceptance_criteria: Vec::new(),
        priority,
        passes,
        notes: String::new(),
        tracker_ref: None,
    }
}

/// Create a backlog holding `items` in the given storage order.
pub fn backlog_with(items: Vec<Item>) -> Backlog {
    Backlog {
        project_name: "demo".to_string(),
        branch_label: "ralph/demo".to_string(),
        description: "demo backlog".to_string(),
        items,
    }
}

/// One scripted agent session.
#[derive(Debug, Clone)]
pub struct ScriptedStep {
    pub result: InvocationResult,
    /// Backlog the "agent" writes during the session.
    pub backlog_update: Option<Backlog>,
}

impl ScriptedStep {
    pub fn with_result(output: &str, exit_code: i32) -> Self {
        Self {
            result: InvocationResult {
                output: output.to_string(),
                error_output: String::new(),
                exit_code,
            },
            backlog_update: None,
        }
    }

    pub fn succeed(output: &str) -> Self {
        Self::with_result(output, 0)
    }

    pub fn fail(exit_code: i32) -> Self {
        Self::with_result("", exit_code)
    }

    pub fn with_backlog(mut self, backlog: Backlog) -> Self {
        self.backlog_update = Some(backlog);
        self
    }
}

/// Agent that replays canned sessions in order and records every prompt.
#[derive(Debug, Default)]
pub struct ScriptedAgent {
    steps: RefCell<VecDeque<ScriptedStep>>,
    prompts: RefCell<Vec<String>>,
    backlog_path: Option<PathBuf>,
}

impl ScriptedAgent {
    pub fn new(steps: Vec<ScriptedStep>) -> Self {
        Self {
            steps: RefCell::new(steps.into()),
            prompts: RefCell::new(Vec::new()),
            backlog_path: None,
        }
    }

    /// Apply each step's backlog update to the file at `path`.
    pub fn writing_to(mut self, path: &Path) -> Self {
        self.backlog_path = Some(path.to_path_buf());
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }

    pub fn remaining(&self) -> usize {
        self.steps.borrow().len()
    }
}

impl Agent for ScriptedAgent {
    fn invoke(&self, prompt: &str) -> Result<InvocationResult> {
        self.prompts.borrow_mut().push(prompt.to_string());
        let step = self
            .steps
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted agent has no more sessions"))?;
        if let Some(backlog) = &step.backlog_update {
            let path = self
                .backlog_path
                .as_ref()
                .ok_or_else(|| anyhow!("scripted backlog update without a backlog path"))?;
            BacklogStore::new(path).save(backlog)?;
        }
        Ok(step.result)
    }

    fn passthrough(&self, prompt: &str) -> Result<i32> {
        Ok(self.invoke(prompt)?.exit_code)
    }
}

/// Scratch project with a saved backlog and an initialized journal.
pub struct TestProject {
    temp: TempDir,
    pub store: BacklogStore,
    pub journal: ProgressJournal,
}

impl TestProject {
    pub fn new(backlog: Backlog) -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let store = BacklogStore::new(temp.path().join("prd.json"));
        let journal = ProgressJournal::new(temp.path().join("progress.txt"));
        store.save(&backlog)?;
        journal.initialize()?;
        Ok(Self {
            temp,
            store,
            journal,
        })
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }
}
