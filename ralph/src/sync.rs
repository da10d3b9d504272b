//! Two-way sync between backlog items and tracker issues (`ralph sync`).

use anyhow::{Result, anyhow};
use tracing::{info, instrument, warn};

use crate::backlog::{Backlog, Item};
use crate::bootstrap::extract_json;
use crate::core::prompt::PromptComposer;
use crate::io::agent::Agent;
use crate::io::backlog_store::{BacklogStore, parse_backlog};
use crate::io::tracker::IssueTracker;

/// Tracker behavior for pushing item status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushPolicy {
    pub close_on_pass: bool,
    pub comment_on_progress: bool,
}

/// Result of pushing status for one linked item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushedItem {
    pub id: String,
    pub issue: u64,
    pub action: PushAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushAction {
    Closed,
    Commented,
    Skipped,
    Failed(String),
}

/// Push every linked item's status to its issue.
///
/// A failure on one issue does not stop the others; it is reported as
/// [`PushAction::Failed`].
#[instrument(skip_all)]
pub fn push_status(
    store: &BacklogStore,
    tracker: &dyn IssueTracker,
    policy: PushPolicy,
) -> Result<Vec<PushedItem>> {
    let backlog = store.load()?;
    let mut pushed = Vec::new();
    for item in &backlog.items {
        let Some(issue) = item.tracker_ref else {
            continue;
        };
        let action = match push_one(item, issue, tracker, policy) {
            Ok(action) => action,
            Err(err) => {
                warn!(item = %item.id, issue, err = %format!("{err:#}"), "status push failed");
                PushAction::Failed(format!("{err:#}"))
            }
        };
        pushed.push(PushedItem {
            id: item.id.clone(),
            issue,
            action,
        });
    }
    Ok(pushed)
}

fn push_one(
    item: &Item,
    issue: u64,
    tracker: &dyn IssueTracker,
    policy: PushPolicy,
) -> Result<PushAction> {
    if item.passes && policy.close_on_pass {
        tracker.close(issue)?;
        if policy.comment_on_progress {
            tracker.comment(
                issue,
                &format!(
                    "Ralph: item {} ({}) has all acceptance criteria passing. Closing.",
                    item.id, item.title
                ),
            )?;
        }
        return Ok(PushAction::Closed);
    }
    if !policy.comment_on_progress {
        return Ok(PushAction::Skipped);
    }
    let status = if item.passes { "passing" } else { "in progress" };
    tracker.comment(
        issue,
        &format!("Ralph status update: item {} is {status}.", item.id),
    )?;
    Ok(PushAction::Commented)
}

/// Import open issues not yet linked to any item.
///
/// The agent converts the new issues into items; their priorities are shifted
/// past the current maximum so imported work queues behind existing work.
/// Returns the appended items.
#[instrument(skip_all, fields(label))]
pub fn pull_issues<A: Agent>(
    agent: &A,
    composer: &PromptComposer,
    store: &BacklogStore,
    tracker: &dyn IssueTracker,
    label: &str,
) -> Result<Vec<Item>> {
    let issues = tracker.pull_issues(label)?;
    let mut backlog = store.load()?;
    let new_issues: Vec<_> = issues
        .into_iter()
        .filter(|issue| backlog.find_by_tracker_ref(issue.number).is_none())
        .collect();
    if new_issues.is_empty() {
        info!("no new issues to import");
        return Ok(Vec::new());
    }

    let prompt = composer.import_prompt(&new_issues)?;
    let result = agent.invoke(&prompt)?;
    if !result.successful() {
        return Err(anyhow!(
            "agent session failed with exit code {}: {}",
            result.exit_code,
            result.error_output.trim()
        ));
    }
    let json = extract_json(&result.output)
        .ok_or_else(|| anyhow!("could not extract valid JSON from agent output"))?;
    let converted = parse_backlog(store.path(), &json)?;

    let offset = backlog.max_priority();
    let mut appended = Vec::new();
    for mut item in converted.items {
        if let Some(number) = item.tracker_ref
            && backlog.find_by_tracker_ref(number).is_some()
        {
            warn!(item = %item.id, issue = number, "issue already linked; skipping");
            continue;
        }
        if backlog.find_by_id(&item.id).is_some() {
            let renamed = unused_id(&backlog, &item);
            info!(from = %item.id, to = %renamed, "imported id already taken; renaming");
            item.id = renamed;
        }
        item.priority += offset;
        item.passes = false;
        backlog.items.push(item.clone());
        appended.push(item);
    }
    store.save(&backlog)?;
    info!(count = appended.len(), "imported issues");
    Ok(appended)
}

/// Fresh id for an imported item whose id collides with an existing one:
/// `GH-<issue>` when linked, otherwise the original id; a numeric suffix is
/// added until the id is free.
fn unused_id(backlog: &Backlog, item: &Item) -> String {
    let base = item
        .tracker_ref
        .map_or_else(|| item.id.clone(), |number| format!("GH-{number}"));
    if backlog.find_by_id(&base).is_none() {
        return base;
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| backlog.find_by_id(candidate).is_none())
        .unwrap_or(base)
}
