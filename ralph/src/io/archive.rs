//! Archive rollover when the backlog moves to a new branch of work.
//!
//! A one-line marker file remembers the branch label the current journal
//! belongs to. When the backlog's label changes, the old backlog and journal
//! are copied into `archive/<date>-<label>/` and the journal starts over.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use tracing::{debug, info, instrument, warn};

use crate::error::RalphError;
use crate::io::backlog_store::BacklogStore;
use crate::io::journal::ProgressJournal;

#[derive(Debug, Clone)]
pub struct Archiver {
    store: BacklogStore,
    journal: ProgressJournal,
    marker_path: PathBuf,
    archive_dir: PathBuf,
}

impl Archiver {
    pub fn new(
        store: BacklogStore,
        journal: ProgressJournal,
        marker_path: impl Into<PathBuf>,
        archive_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            journal,
            marker_path: marker_path.into(),
            archive_dir: archive_dir.into(),
        }
    }

    /// Compare the stored backlog's label against the marker and roll over on
    /// a change. Returns the archive folder when one was written.
    #[instrument(skip_all)]
    pub fn check_and_archive(&self) -> Result<Option<PathBuf>> {
        if !self.store.exists() {
            return Ok(None);
        }
        let label = self.store.load()?.branch_label;
        self.switch_to(&label, Local::now().date_naive())
    }

    /// Same check against a label that is about to replace the stored one.
    ///
    /// When no label is tracked yet, the stored backlog's label is recorded
    /// first so the state being replaced still gets its snapshot.
    #[instrument(skip_all, fields(label))]
    pub fn archive_if_switched(&self, label: &str) -> Result<Option<PathBuf>> {
        self.track_branch()?;
        self.switch_to(label, Local::now().date_naive())
    }

    /// Record the stored backlog's label when no label is tracked yet.
    ///
    /// A backlog that no longer parses has no label to record and is skipped.
    pub fn track_branch(&self) -> Result<()> {
        if !self.store.exists() || self.recorded_label()?.is_some() {
            return Ok(());
        }
        let label = match self.store.load() {
            Ok(backlog) => backlog.branch_label,
            Err(err)
                if matches!(
                    err.downcast_ref::<RalphError>(),
                    Some(RalphError::MalformedState { .. })
                ) =>
            {
                warn!(err = %format!("{err:#}"), "stored backlog unreadable; branch not tracked");
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        if !label.trim().is_empty() {
            self.write_marker(label.trim())?;
        }
        Ok(())
    }

    /// Label recorded in the marker file, if any.
    pub fn recorded_label(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.marker_path) {
            Ok(contents) => {
                let label = contents.trim();
                Ok((!label.is_empty()).then(|| label.to_string()))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("read marker {}", self.marker_path.display()))
            }
        }
    }

    fn switch_to(&self, label: &str, date: NaiveDate) -> Result<Option<PathBuf>> {
        let label = label.trim();
        let Some(previous) = self.recorded_label()? else {
            if !label.is_empty() {
                self.write_marker(label)?;
            }
            return Ok(None);
        };
        if label.is_empty() || label == previous {
            return Ok(None);
        }

        let folder = self.archive_state(&previous, date)?;
        self.journal.clear()?;
        self.journal.initialize()?;
        self.write_marker(label)?;
        info!(
            previous = %previous,
            current = %label,
            archive = %folder.display(),
            "archived previous branch of work"
        );
        Ok(Some(folder))
    }

    fn archive_state(&self, previous: &str, date: NaiveDate) -> Result<PathBuf> {
        let name = format!("{}-{}", date.format("%Y-%m-%d"), sanitize_label(previous));
        let folder = self.unused_folder(&name);
        fs::create_dir_all(&folder)
            .with_context(|| format!("create archive {}", folder.display()))?;
        copy_into(self.store.path(), &folder)?;
        copy_into(self.journal.path(), &folder)?;
        Ok(folder)
    }

    /// `name`, or `name-2`, `name-3`, ... when earlier snapshots exist.
    fn unused_folder(&self, name: &str) -> PathBuf {
        let first = self.archive_dir.join(name);
        if !first.exists() {
            return first;
        }
        (2..)
            .map(|n| self.archive_dir.join(format!("{name}-{n}")))
            .find(|candidate| !candidate.exists())
            .unwrap_or(first)
    }

    fn write_marker(&self, label: &str) -> Result<()> {
        debug!(label, "recording branch label");
        fs::write(&self.marker_path, label)
            .with_context(|| format!("write marker {}", self.marker_path.display()))
    }
}

/// Folder-safe form of a branch label: drop a leading `ralph/` and collapse
/// every run of non-alphanumeric characters to one `-`.
pub fn sanitize_label(label: &str) -> String {
    let stripped = label.strip_prefix("ralph/").unwrap_or(label);
    let mut out = String::with_capacity(stripped.len());
    for ch in stripped.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

fn copy_into(source: &Path, folder: &Path) -> Result<()> {
    if !source.is_file() {
        return Ok(());
    }
    let Some(name) = source.file_name() else {
        return Ok(());
    };
    let target = folder.join(name);
    fs::copy(source, &target)
        .with_context(|| format!("copy {} to {}", source.display(), target.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{backlog_with, item};

    struct Fixture {
        _temp: tempfile::TempDir,
        root: PathBuf,
        store: BacklogStore,
        journal: ProgressJournal,
        archiver: Archiver,
    }

    fn fixture() -> Fixture {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().to_path_buf();
        let store = BacklogStore::new(root.join("prd.json"));
        let journal = ProgressJournal::new(root.join("progress.txt"));
        let archiver = Archiver::new(
            store.clone(),
            journal.clone(),
            root.join(".ralph-branch"),
            root.join("archive"),
        );
        Fixture {
            _temp: temp,
            root,
            store,
            journal,
            archiver,
        }
    }

    fn save_label(store: &BacklogStore, label: &str) {
        let mut backlog = backlog_with(vec![item("US-001", 1, false)]);
        backlog.branch_label = label.to_string();
        store.save(&backlog).expect("save");
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).expect("date")
    }

    #[test]
    fn sanitize_strips_prefix_and_collapses_separators() {
        assert_eq!(sanitize_label("ralph/login"), "login");
        assert_eq!(sanitize_label("ralph/user auth//v2"), "user-auth-v2");
        assert_eq!(sanitize_label("feature/ralph/x"), "feature-ralph-x");
        assert_eq!(sanitize_label("--odd__name!"), "odd-name");
    }

    #[test]
    fn missing_backlog_is_a_no_op() {
        let fx = fixture();
        assert_eq!(fx.archiver.check_and_archive().expect("check"), None);
        assert!(!fx.root.join(".ralph-branch").exists());
    }

    #[test]
    fn first_check_records_label_without_archiving() {
        let fx = fixture();
        save_label(&fx.store, "ralph/login");
        assert_eq!(fx.archiver.check_and_archive().expect("check"), None);
        assert_eq!(
            fx.archiver.recorded_label().expect("marker").as_deref(),
            Some("ralph/login")
        );
        assert!(!fx.root.join("archive").exists());
    }

    #[test]
    fn empty_label_is_never_recorded() {
        let fx = fixture();
        save_label(&fx.store, "");
        assert_eq!(fx.archiver.check_and_archive().expect("check"), None);
        assert!(!fx.root.join(".ralph-branch").exists());
        fx.archiver.track_branch().expect("track");
        assert!(!fx.root.join(".ralph-branch").exists());
    }

    #[test]
    fn label_change_archives_and_resets_journal() {
        let fx = fixture();
        fs::write(fx.root.join(".ralph-branch"), "ralph/login\n").expect("marker");
        save_label(&fx.store, "ralph/login");
        fx.journal.initialize().expect("init");
        fx.journal.append("learned about sessions").expect("append");
        let old_backlog = fs::read_to_string(fx.store.path()).expect("read");
        let old_journal = fx.journal.read().expect("read");

        save_label(&fx.store, "ralph/billing");
        let folder = fx
            .archiver
            .switch_to("ralph/billing", date())
            .expect("switch")
            .expect("archived");

        assert_eq!(folder, fx.root.join("archive/2026-03-14-login"));
        assert_eq!(
            fs::read_to_string(folder.join("progress.txt")).expect("archived journal"),
            old_journal
        );
        assert_eq!(
            fs::read_to_string(folder.join("prd.json")).expect("archived backlog"),
            fs::read_to_string(fx.store.path()).expect("current backlog")
        );
        assert_ne!(old_backlog, fs::read_to_string(fx.store.path()).expect("read"));

        let fresh = fx.journal.read().expect("read");
        assert!(fresh.starts_with("# Ralph Progress Log"));
        assert!(!fresh.contains("learned about sessions"));
        assert_eq!(
            fx.archiver.recorded_label().expect("marker").as_deref(),
            Some("ralph/billing")
        );

        assert_eq!(fx.archiver.check_and_archive().expect("second check"), None);
    }

    #[test]
    fn archive_if_switched_snapshots_before_overwrite() {
        let fx = fixture();
        save_label(&fx.store, "ralph/login");
        fx.archiver.track_branch().expect("track");
        let before = fs::read_to_string(fx.store.path()).expect("read");

        let folder = fx
            .archiver
            .switch_to("ralph/billing", date())
            .expect("switch")
            .expect("archived");
        assert_eq!(
            fs::read_to_string(folder.join("prd.json")).expect("archived"),
            before
        );
        assert_eq!(
            fx.archiver.archive_if_switched("ralph/billing").expect("again"),
            None
        );
    }

    #[test]
    fn untracked_backlog_is_snapshotted_before_overwrite() {
        let fx = fixture();
        save_label(&fx.store, "ralph/login");
        let before = fs::read_to_string(fx.store.path()).expect("read");

        let folder = fx
            .archiver
            .archive_if_switched("ralph/billing")
            .expect("switch")
            .expect("archived");
        assert!(folder.to_string_lossy().ends_with("-login"));
        assert_eq!(
            fs::read_to_string(folder.join("prd.json")).expect("archived"),
            before
        );
        assert_eq!(
            fx.archiver.recorded_label().expect("marker").as_deref(),
            Some("ralph/billing")
        );
    }

    #[test]
    fn track_branch_keeps_an_existing_marker() {
        let fx = fixture();
        fs::write(fx.root.join(".ralph-branch"), "ralph/login\n").expect("marker");
        save_label(&fx.store, "ralph/billing");
        fx.archiver.track_branch().expect("track");
        assert_eq!(
            fx.archiver.recorded_label().expect("marker").as_deref(),
            Some("ralph/login")
        );
    }

    #[test]
    fn malformed_backlog_is_not_tracked() {
        let fx = fixture();
        fs::write(fx.store.path(), "{not json").expect("write");
        fx.archiver.track_branch().expect("track");
        assert!(!fx.root.join(".ralph-branch").exists());
    }

    #[test]
    fn repeated_switches_on_one_day_keep_every_snapshot() {
        let fx = fixture();
        fs::write(fx.root.join(".ralph-branch"), "ralph/a").expect("marker");
        fx.journal.initialize().expect("init");

        fx.journal.append("first a").expect("append");
        let first = fx.archiver.switch_to("ralph/b", date()).expect("a->b");
        fx.archiver.switch_to("ralph/a", date()).expect("b->a");
        fx.journal.append("second a").expect("append");
        let second = fx.archiver.switch_to("ralph/b", date()).expect("a->b again");

        let first = first.expect("first snapshot");
        let second = second.expect("second snapshot");
        assert_eq!(first, fx.root.join("archive/2026-03-14-a"));
        assert_eq!(second, fx.root.join("archive/2026-03-14-a-2"));
        assert!(
            fs::read_to_string(first.join("progress.txt"))
                .expect("first journal")
                .contains("first a")
        );
        assert!(
            fs::read_to_string(second.join("progress.txt"))
                .expect("second journal")
                .contains("second a")
        );
    }
}
