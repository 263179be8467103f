//! Stable exit codes for subrun CLI commands.

/// Command succeeded and every submission ran successfully.
pub const OK: i32 = 0;
/// Command failed before a report could be produced (bad input, config, or arguments).
pub const INVALID: i32 = 1;
/// A report was produced but at least one submission did not succeed.
pub const FAILURES: i32 = 2;
