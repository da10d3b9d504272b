//! The iteration loop behind `ralph run`.
//!
//! One agent session per iteration, strictly sequential. The backlog is
//! reloaded from the store at every step that reads it because the agent edits
//! the file during its session; the orchestrator itself never flips `passes`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::backlog::Item;
use crate::core::prompt::PromptComposer;
use crate::io::agent::Agent;
use crate::io::backlog_store::BacklogStore;
use crate::io::journal::ProgressJournal;
use crate::io::tracker::IssueTracker;
use crate::select::{SelectOutcome, select_item};

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Cooperative cancellation token shared with the signal handler.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress callbacks for a running loop.
pub trait LoopObserver {
    fn on_iteration(&mut self, iteration: u32, max_iterations: u32, item: &Item);
    fn on_output(&mut self, output: &str);
}

/// Observer that ignores every notification.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl LoopObserver for NoopObserver {
    fn on_iteration(&mut self, _iteration: u32, _max_iterations: u32, _item: &Item) {}
    fn on_output(&mut self, _output: &str) {}
}

/// Reason why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// The agent printed the completion signal.
    AllComplete,
    /// `max_iterations` sessions ran without a completion signal.
    MaxIterationsReached,
    /// A stop was requested between iterations.
    Interrupted,
    /// The requested item already passed before any session ran for it.
    TargetAlreadyDone { id: String },
    /// A session for the requested item exited successfully.
    TargetCompleted { id: String },
    /// No open item was left to select.
    NoRemainingWork,
}

impl LoopStop {
    pub fn reason(&self) -> String {
        match self {
            LoopStop::AllComplete => "all items complete (completion signal received)".to_string(),
            LoopStop::MaxIterationsReached => "max iterations reached".to_string(),
            LoopStop::Interrupted => "interrupted by signal".to_string(),
            LoopStop::TargetAlreadyDone { id } => format!("item {id} already passes"),
            LoopStop::TargetCompleted { id } => format!("item {id} completed"),
            LoopStop::NoRemainingWork => "no remaining work".to_string(),
        }
    }
}

/// Summary of a loop invocation; counts come from a fresh reload at the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub stop: LoopStop,
    pub completed: bool,
    pub iterations_run: u32,
    pub items_completed: usize,
    pub items_total: usize,
}

impl LoopOutcome {
    pub fn reason(&self) -> String {
        self.stop.reason()
    }
}

/// Per-run loop settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSettings {
    pub max_iterations: u32,
    pub sleep_between_iterations: Duration,
    /// Work only on this item id instead of the priority order.
    pub target: Option<String>,
    /// Post a comment on the linked issue after every session.
    pub comment_on_progress: bool,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            sleep_between_iterations: Duration::from_secs(2),
            target: None,
            comment_on_progress: true,
        }
    }
}

/// Prompt ready to hand to the agent for the selected item.
#[derive(Debug, Clone)]
pub struct PreparedPrompt {
    pub item: Item,
    pub prompt: String,
}

/// Compose the prompt the next iteration would send, without invoking anything.
///
/// Returns the selection outcome instead when there is nothing to work on.
pub fn prepare_prompt(
    store: &BacklogStore,
    journal: &ProgressJournal,
    composer: &PromptComposer,
    target: Option<&str>,
    iteration: u32,
) -> Result<std::result::Result<PreparedPrompt, SelectOutcome>> {
    let backlog = store.load()?;
    let item = match select_item(&backlog, target)? {
        SelectOutcome::Open(item) => item,
        other => return Ok(Err(other)),
    };
    let journal_text = journal.read()?;
    let prompt = composer.iteration_prompt(&backlog, &item, &journal_text, iteration)?;
    Ok(Ok(PreparedPrompt { item, prompt }))
}

/// Drives the agent through the backlog.
pub struct Orchestrator<'a, A: Agent> {
    store: &'a BacklogStore,
    journal: &'a ProgressJournal,
    agent: &'a A,
    composer: &'a PromptComposer,
    tracker: Option<&'a dyn IssueTracker>,
    settings: LoopSettings,
}

impl<'a, A: Agent> Orchestrator<'a, A> {
    pub fn new(
        store: &'a BacklogStore,
        journal: &'a ProgressJournal,
        agent: &'a A,
        composer: &'a PromptComposer,
        settings: LoopSettings,
    ) -> Self {
        Self {
            store,
            journal,
            agent,
            composer,
            tracker: None,
            settings,
        }
    }

    /// Attach an issue tracker for per-iteration progress comments.
    pub fn with_tracker(mut self, tracker: &'a dyn IssueTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Run until completion, the iteration budget, a stop request, or an
    /// empty backlog.
    ///
    /// Errors only on state that cannot be read or an agent that cannot be
    /// started.
    #[instrument(skip_all, fields(max_iterations = self.settings.max_iterations, requested = ?self.settings.target))]
    pub fn run(&self, stop: &StopFlag, observer: &mut dyn LoopObserver) -> Result<LoopOutcome> {
        self.journal.initialize()?;
        let max = self.settings.max_iterations;
        let target = self.settings.target.as_deref();
        let mut iterations_run = 0u32;

        for iteration in 1..=max {
            if stop.is_set() {
                return self.finish(LoopStop::Interrupted, iterations_run);
            }

            let backlog = self
                .store
                .load()
                .with_context(|| format!("load backlog for iteration {iteration}"))?;
            let item = match select_item(&backlog, target)? {
                SelectOutcome::Open(item) => item,
                SelectOutcome::AlreadyDone(item) => {
                    return self.finish(LoopStop::TargetAlreadyDone { id: item.id }, iterations_run);
                }
                SelectOutcome::NoRemainingWork => {
                    return self.finish(LoopStop::NoRemainingWork, iterations_run);
                }
            };

            info!(iteration, item = %item.id, "starting iteration");
            observer.on_iteration(iteration, max, &item);

            let backlog = self.store.load()?;
            let journal_text = self.journal.read()?;
            let prompt = self
                .composer
                .iteration_prompt(&backlog, &item, &journal_text, iteration)?;

            let result = self.agent.invoke(&prompt)?;
            iterations_run += 1;
            observer.on_output(&result.output);

            self.journal.append(&format!(
                "Iteration {iteration} - Item {}\nResult: {}",
                item.id,
                if result.successful() {
                    "Success"
                } else {
                    "In progress"
                }
            ))?;
            self.report_progress(&item, iteration, result.successful());

            if result.contains_signal(self.composer.completion_signal()) {
                return self.finish(LoopStop::AllComplete, iterations_run);
            }
            if let Some(id) = target
                && result.successful()
            {
                return self.finish(
                    LoopStop::TargetCompleted { id: id.to_string() },
                    iterations_run,
                );
            }

            if iteration < max {
                sleep_unless_stopped(self.settings.sleep_between_iterations, stop);
            }
        }

        self.finish(LoopStop::MaxIterationsReached, iterations_run)
    }

    fn report_progress(&self, item: &Item, iteration: u32, successful: bool) {
        let (Some(tracker), Some(number)) = (self.tracker, item.tracker_ref) else {
            return;
        };
        if !self.settings.comment_on_progress {
            return;
        }
        let status = if successful { "completed" } else { "in progress" };
        if let Err(err) = tracker.comment(number, &format!("Ralph iteration {iteration}: {status}")) {
            warn!(issue = number, err = %format!("{err:#}"), "failed to post progress comment");
        }
    }

    fn finish(&self, stop: LoopStop, iterations_run: u32) -> Result<LoopOutcome> {
        let backlog = self.store.load().context("reload backlog for loop summary")?;
        let outcome = LoopOutcome {
            completed: backlog.all_pass(),
            items_completed: backlog.completed_count(),
            items_total: backlog.total_count(),
            iterations_run,
            stop,
        };
        debug!(reason = %outcome.reason(), iterations_run, "loop finished");
        Ok(outcome)
    }
}

fn sleep_unless_stopped(total: Duration, stop: &StopFlag) {
    let deadline = Instant::now() + total;
    loop {
        let now = Instant::now();
        if now >= deadline || stop.is_set() {
            return;
        }
        thread::sleep(STOP_POLL_INTERVAL.min(deadline - now));
    }
}
