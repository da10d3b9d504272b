//! Semantic invariants not expressible via JSON Schema.

use std::collections::HashSet;

use crate::backlog::Backlog;

/// Check backlog invariants:
/// - No duplicate item ids
/// - No tracker ref claimed by more than one item
/// - No empty ids
pub fn validate_invariants(backlog: &Backlog) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen_ids = HashSet::new();
    let mut seen_refs = HashSet::new();

    for (index, item) in backlog.items.iter().enumerate() {
        if item.id.trim().is_empty() {
            errors.push(format!("userStories[{index}]: id must not be empty"));
        }
        if !seen_ids.insert(item.id.as_str()) {
            errors.push(format!("duplicate id '{}' at userStories[{index}]", item.id));
        }
        if let Some(tracker_ref) = item.tracker_ref
            && !seen_refs.insert(tracker_ref)
        {
            errors.push(format!(
                "issueNumber {tracker_ref} claimed by more than one item (again by '{}')",
                item.id
            ));
        }
    }

    errors
}
