//! Stable exit codes for ralph CLI commands.

/// Command succeeded; for `ralph run`, every item passes.
pub const OK: i32 = 0;
/// Command failed due to invalid config/backlog/arguments or other errors.
pub const INVALID: i32 = 1;
/// `ralph run` stopped before every item passed.
pub const INCOMPLETE: i32 = 2;
