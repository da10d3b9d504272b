//! Backlog load/save helpers with schema + invariant validation.
//!
//! The store never caches: every call re-reads or rewrites the file, since the
//! agent edits the same file between calls.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use jsonschema::{Validator, validator_for};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::backlog::{Backlog, Item};
use crate::core::invariants::validate_invariants;
use crate::error::RalphError;

const BACKLOG_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/backlog.schema.json"
));

static SCHEMA_VALIDATOR: LazyLock<Result<Validator, String>> = LazyLock::new(|| {
    let schema: Value = serde_json::from_str(BACKLOG_SCHEMA).map_err(|err| err.to_string())?;
    validator_for(&schema).map_err(|err| err.to_string())
});

/// Durable home of the backlog document.
#[derive(Debug, Clone)]
pub struct BacklogStore {
    path: PathBuf,
}

impl BacklogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read and validate the backlog from disk.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn load(&self) -> Result<Backlog> {
        if !self.exists() {
            return Err(RalphError::StateNotFound {
                path: self.path.clone(),
            }
            .into());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read backlog {}", self.path.display()))?;
        let backlog = parse_backlog(&self.path, &contents)?;
        debug!(items = backlog.items.len(), "loaded backlog");
        Ok(backlog)
    }

    /// Write the backlog as pretty JSON (temp file + rename).
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn save(&self, backlog: &Backlog) -> Result<()> {
        let errors = validate_invariants(backlog);
        if !errors.is_empty() {
            return Err(anyhow!(
                "refusing to save backlog {}: {}",
                self.path.display(),
                errors.join("; ")
            ));
        }
        let mut buf = serde_json::to_string_pretty(backlog).context("serialize backlog")?;
        buf.push('\n');
        write_atomic(&self.path, &buf)?;
        debug!(items = backlog.items.len(), "saved backlog");
        Ok(())
    }

    /// Validate agent-produced JSON text and save it in canonical form.
    pub fn save_raw(&self, text: &str) -> Result<Backlog> {
        let backlog = parse_backlog(&self.path, text)?;
        self.save(&backlog)?;
        Ok(backlog)
    }

    /// Set `passes = true` on one item. Unknown ids leave the file untouched.
    pub fn mark_passing(&self, id: &str) -> Result<()> {
        let mut backlog = self.load()?;
        let item = backlog
            .find_by_id_mut(id)
            .ok_or_else(|| RalphError::ItemNotFound { id: id.to_string() })?;
        item.passes = true;
        self.save(&backlog)
    }

    /// Force every item back to `passes = false`.
    pub fn reset_all(&self) -> Result<usize> {
        let mut backlog = self.load()?;
        for item in &mut backlog.items {
            item.passes = false;
        }
        self.save(&backlog)?;
        Ok(backlog.items.len())
    }

    pub fn append(&self, item: Item) -> Result<()> {
        let mut backlog = self.load()?;
        backlog.items.push(item);
        self.save(&backlog)
    }
}

/// Parse backlog text in three layers: JSON syntax, schema, then semantic
/// invariants. Every failure is reported as [`RalphError::MalformedState`].
pub fn parse_backlog(path: &Path, text: &str) -> Result<Backlog> {
    let value: Value = serde_json::from_str(text)
        .map_err(|err| RalphError::malformed(path, format!("invalid JSON: {err}")))?;

    let validator = SCHEMA_VALIDATOR
        .as_ref()
        .map_err(|err| anyhow!("invalid embedded backlog schema: {err}"))?;
    let messages = validator
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect::<Vec<_>>();
    if !messages.is_empty() {
        return Err(RalphError::malformed(
            path,
            format!("schema validation failed: {}", messages.join("; ")),
        )
        .into());
    }

    let backlog: Backlog = serde_json::from_value(value)
        .map_err(|err| RalphError::malformed(path, err.to_string()))?;

    let errors = validate_invariants(&backlog);
    if !errors.is_empty() {
        return Err(RalphError::malformed(path, errors.join("; ")).into());
    }
    Ok(backlog)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp backlog {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace backlog {}", path.display()))?;
    Ok(())
}
