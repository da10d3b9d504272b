//! Deterministic, pure logic shared by the loop and its commands.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod invariants;
pub mod prompt;
pub mod types;
