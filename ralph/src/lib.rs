//! Backlog-driven coding agent loop.
//!
//! `ralph` hands one backlog item at a time to an external coding agent, one
//! fresh session per item, until the backlog passes, an iteration budget is
//! spent, or the operator interrupts. All state lives in plain files
//! (`prd.json`, `progress.txt`) so a run can be paused, resumed or inspected.
//!
//! - **[`core`]**: Pure, deterministic logic (invariants, prompt composition).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (files, processes, the tracker).
//!   Behind traits where tests need doubles.
//!
//! Orchestration modules ([`looping`], [`bootstrap`], [`sync`], [`select`])
//! coordinate core logic with I/O to implement CLI commands.

pub mod backlog;
pub mod bootstrap;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod project;
pub mod select;
pub mod sync;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
