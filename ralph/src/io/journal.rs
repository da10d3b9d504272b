//! Append-only progress journal (`progress.txt`).
//!
//! The journal is both the audit trail of a run and the learning context fed
//! back into the next prompt. Entries are only ever appended; the file is
//! removed only by an explicit clear or an archive rollover.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use tracing::debug;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct ProgressJournal {
    path: PathBuf,
}

impl ProgressJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Write the header if the journal does not exist yet.
    pub fn initialize(&self) -> Result<()> {
        if self.exists() {
            return Ok(());
        }
        let header = format!(
            "# Ralph Progress Log\n# Created: {}\n# This file is append-only. Do not delete entries.\n\n",
            timestamp()
        );
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&self.path, header)
            .with_context(|| format!("write journal {}", self.path.display()))?;
        debug!(path = %self.path.display(), "initialized journal");
        Ok(())
    }

    /// Append one timestamped entry, creating the file if needed.
    pub fn append(&self, entry: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open journal {}", self.path.display()))?;
        write!(file, "\n---\n## [{}]\n\n{}\n", timestamp(), entry)
            .with_context(|| format!("append journal {}", self.path.display()))?;
        Ok(())
    }

    /// Full journal text, or an empty string when there is no journal.
    pub fn read(&self) -> Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(err) => Err(err).with_context(|| format!("read journal {}", self.path.display())),
        }
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("remove journal {}", self.path.display()))
            }
        }
    }
}

fn timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}
