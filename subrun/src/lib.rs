//! Multi-submission execution orchestrator.
//!
//! Runs a batch of interpretable submissions against one shared input and
//! merges every outcome into a single deterministic report. The architecture
//! keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (data model, report rendering).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (configuration, discovery, child
//!   processes). The [`io::runner::Runner`] trait is the seam tests replace.
//!
//! Orchestration modules ([`executor`], [`orchestrator`]) coordinate core
//! logic with I/O to implement the CLI commands.

pub mod core;
pub mod executor;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
