//! Side-effecting helpers: configuration, discovery, and child processes.

pub mod config;
pub mod locate;
pub mod process;
pub mod runner;
