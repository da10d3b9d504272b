//! Item selection for `ralph run` and `ralph session`.

use anyhow::Result;
use tracing::debug;

use crate::backlog::{Backlog, Item};

/// Structured selection outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    /// An open item to work on.
    Open(Item),
    /// The requested item already passes.
    AlreadyDone(Item),
    /// No open items remain.
    NoRemainingWork,
}

/// Select the requested item, or the next open item by priority.
///
/// A `target` id the backlog does not contain has no candidate, so it selects
/// [`SelectOutcome::NoRemainingWork`].
pub fn select_item(backlog: &Backlog, target: Option<&str>) -> Result<SelectOutcome> {
    if let Some(id) = target {
        let Some(item) = backlog.find_by_id(id) else {
            debug!(target_id = id, "requested item not in backlog");
            return Ok(SelectOutcome::NoRemainingWork);
        };
        if item.passes {
            return Ok(SelectOutcome::AlreadyDone(item.clone()));
        }
        return Ok(SelectOutcome::Open(item.clone()));
    }
    Ok(match backlog.next_item() {
        Some(item) => SelectOutcome::Open(item.clone()),
        None => SelectOutcome::NoRemainingWork,
    })
}
