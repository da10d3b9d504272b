use serde::{Deserialize, Serialize};

/// The prioritized work list persisted in `prd.json`.
///
/// `items` keep storage order; priority order is only ever derived.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Backlog {
    #[serde(rename = "project", default)]
    pub project_name: String,
    #[serde(rename = "branchName", default)]
    pub branch_label: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "userStories", default)]
    pub items: Vec<Item>,
}

/// One unit of work handed to the agent.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    pub priority: i64,
    #[serde(default)]
    pub passes: bool,
    #[serde(default)]
    pub notes: String,
    #[serde(
        rename = "issueNumber",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub tracker_ref: Option<u64>,
}

impl Backlog {
    /// First open item with the lowest priority; ties keep storage order.
    pub fn next_item(&self) -> Option<&Item> {
        // `min_by_key` yields the first of several equal minima.
        self.items
            .iter()
            .filter(|item| !item.passes)
            .min_by_key(|item| item.priority)
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn find_by_id_mut(&mut self, id: &str) -> Option<&mut Item> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    pub fn find_by_tracker_ref(&self, tracker_ref: u64) -> Option<&Item> {
        self.items
            .iter()
            .find(|item| item.tracker_ref == Some(tracker_ref))
    }

    /// True only when there is at least one item and every item passes.
    pub fn all_pass(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(|item| item.passes)
    }

    pub fn completed_count(&self) -> usize {
        self.items.iter().filter(|item| item.passes).count()
    }

    pub fn total_count(&self) -> usize {
        self.items.len()
    }

    /// Highest priority number in use (0 for an empty backlog).
    pub fn max_priority(&self) -> i64 {
        self.items.iter().map(|item| item.priority).max().unwrap_or(0)
    }
}

/// Placeholder backlog written by `ralph init`.
pub fn default_backlog(project_name: &str) -> Backlog {
    Backlog {
        project_name: project_name.to_string(),
        branch_label: String::new(),
        description: "Describe the feature set here, or run `ralph prd`.".to_string(),
        items: Vec::new(),
    }
}
