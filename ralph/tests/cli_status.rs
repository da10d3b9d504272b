//! CLI tests that spawn the `ralph` binary.
//!
//! None of these reach the agent: they cover commands that only read or
//! reset local state, and the error paths that exit before a session starts.

use std::process::Command;

use ralph::exit_codes;
use ralph::io::backlog_store::BacklogStore;
use ralph::io::init::{InitOptions, init_project};
use ralph::test_support::{backlog_with, item};

fn ralph() -> Command {
    Command::new(env!("CARGO_BIN_EXE_ralph"))
}

#[test]
fn status_prints_items_and_progress() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (paths, _) = init_project(temp.path(), &InitOptions { force: false }).expect("init");
    let mut done = item("US-001", 1, true);
    done.tracker_ref = Some(42);
    BacklogStore::new(&paths.backlog_path)
        .save(&backlog_with(vec![done, item("US-002", 2, false)]))
        .expect("save");

    let output = ralph()
        .current_dir(temp.path())
        .arg("status")
        .output()
        .expect("ralph status");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("demo: demo backlog"));
    assert!(stdout.contains("Branch: ralph/demo"));
    assert!(stdout.contains("US-001"));
    assert!(stdout.contains("#42"));
    assert!(stdout.contains("Progress: 1/2 items complete (50%)"));
}

#[test]
fn dry_run_without_backlog_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = ralph()
        .current_dir(temp.path())
        .args(["run", "--dry-run"])
        .output()
        .expect("ralph run");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("prd.json"));
}

#[test]
fn dry_run_prints_prompt_for_next_item() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (paths, _) = init_project(temp.path(), &InitOptions { force: false }).expect("init");
    BacklogStore::new(&paths.backlog_path)
        .save(&backlog_with(vec![item("US-007", 1, false)]))
        .expect("save");

    let output = ralph()
        .arg("--root")
        .arg(temp.path())
        .args(["run", "--dry-run"])
        .output()
        .expect("ralph run");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Implement item **US-007: US-007 title**"));
}

#[test]
fn dry_run_for_unknown_story_reports_no_work() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (paths, _) = init_project(temp.path(), &InitOptions { force: false }).expect("init");
    BacklogStore::new(&paths.backlog_path)
        .save(&backlog_with(vec![item("US-001", 1, false)]))
        .expect("save");

    let output = ralph()
        .current_dir(temp.path())
        .args(["run", "--dry-run", "--story", "US-404"])
        .output()
        .expect("ralph run");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No incomplete items found."));
}

#[test]
fn run_on_finished_backlog_exits_ok_without_agent() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (paths, _) = init_project(temp.path(), &InitOptions { force: false }).expect("init");
    BacklogStore::new(&paths.backlog_path)
        .save(&backlog_with(vec![item("US-001", 1, true)]))
        .expect("save");

    let status = ralph()
        .current_dir(temp.path())
        .arg("run")
        .status()
        .expect("ralph run");

    assert_eq!(status.code(), Some(exit_codes::OK));
}

#[test]
fn reset_requires_a_scope() {
    let temp = tempfile::tempdir().expect("tempdir");
    init_project(temp.path(), &InitOptions { force: false }).expect("init");

    let status = ralph()
        .current_dir(temp.path())
        .arg("reset")
        .status()
        .expect("ralph reset");
    assert_eq!(status.code(), Some(exit_codes::INVALID));
}

#[test]
fn reset_all_with_yes_clears_state() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (paths, _) = init_project(temp.path(), &InitOptions { force: false }).expect("init");
    let store = BacklogStore::new(&paths.backlog_path);
    store
        .save(&backlog_with(vec![item("US-001", 1, true), item("US-002", 2, true)]))
        .expect("save");
    std::fs::write(&paths.journal_path, "# old\nlearned things\n").expect("journal");

    let status = ralph()
        .current_dir(temp.path())
        .args(["reset", "--all", "--yes"])
        .status()
        .expect("ralph reset");

    assert_eq!(status.code(), Some(exit_codes::OK));
    assert_eq!(store.load().expect("load").completed_count(), 0);
    let journal = std::fs::read_to_string(&paths.journal_path).expect("journal");
    assert!(journal.starts_with("# Ralph Progress Log"));
    assert!(!journal.contains("learned things"));
}
