//! Typed failures that callers are expected to tell apart.
//!
//! Functions across the crate return `anyhow::Result`; the variants here are
//! constructed at the failure site so callers can `downcast_ref::<RalphError>()`
//! when they need to react to a specific condition (for example, telling the
//! operator to bootstrap when the backlog is missing).

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RalphError {
    /// The backlog file is absent where a load is required.
    #[error(
        "backlog not found at {} (run `ralph init` or `ralph prd` first)",
        path.display()
    )]
    StateNotFound { path: PathBuf },

    /// The backlog content does not parse as the expected document.
    #[error("malformed backlog {}: {reason}", path.display())]
    MalformedState { path: PathBuf, reason: String },

    /// An id-addressed operation was given an id the backlog does not contain.
    #[error("item not found: {id}")]
    ItemNotFound { id: String },

    /// An external process could not be started at all.
    #[error("failed to launch `{program}`: {source}")]
    LaunchFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl RalphError {
    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedState {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
