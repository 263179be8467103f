//! Runner abstraction over submission execution.
//!
//! The [`Runner`] trait decouples batch orchestration from actually spawning
//! interpreters. Tests use scripted runners that return predetermined outputs
//! without starting processes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use anyhow::Context;
use tracing::{error, instrument, warn};

use crate::core::types::{InputPayload, RunOutput, Status};
use crate::io::config::{RunConfig, RunLimits};
use crate::io::process::{CommandOutput, spawn_captured};

/// Executes one entry file against one input payload.
///
/// Implementations never fail: every problem becomes a status on the output.
pub trait Runner: Sync {
    fn run(&self, entry_file: &Path, input: &InputPayload, limits: &RunLimits) -> RunOutput;
}

/// Runner that interprets each entry file in a fresh child process.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    interpreter: Vec<String>,
    env: BTreeMap<String, String>,
}

impl ProcessRunner {
    pub fn new(interpreter: Vec<String>) -> Self {
        Self {
            interpreter,
            env: BTreeMap::new(),
        }
    }

    pub fn from_config(cfg: &RunConfig) -> Self {
        Self {
            interpreter: cfg.interpreter.clone(),
            env: cfg.env.clone(),
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    fn program(&self) -> &str {
        self.interpreter.first().map(String::as_str).unwrap_or("")
    }

    /// Build `<interpreter...> <entry>` running inside the entry file's folder.
    fn command(&self, entry_file: &Path) -> anyhow::Result<Command> {
        let (program, args) = self
            .interpreter
            .split_first()
            .context("interpreter is empty")?;
        let entry: PathBuf = std::path::absolute(entry_file)
            .with_context(|| format!("resolve {}", entry_file.display()))?;

        let mut cmd = Command::new(program);
        cmd.args(args).arg(&entry).envs(&self.env);
        if let Some(dir) = entry.parent() {
            cmd.current_dir(dir);
        }
        Ok(cmd)
    }
}

impl Runner for ProcessRunner {
    #[instrument(skip_all, fields(entry = %entry_file.display(), timeout_ms = limits.timeout.as_millis() as u64))]
    fn run(&self, entry_file: &Path, input: &InputPayload, limits: &RunLimits) -> RunOutput {
        let started = Instant::now();
        let cmd = match self.command(entry_file) {
            Ok(cmd) => cmd,
            Err(err) => {
                warn!(err = %err, "cannot build interpreter command");
                return RunOutput::launch_failure(format!("{err:#}"), started.elapsed());
            }
        };

        let child = match spawn_captured(cmd, Some(input.shared()), limits.output_limit_bytes) {
            Ok(child) => child,
            Err(err) => {
                error!(err = %err, program = self.program(), "failed to spawn interpreter");
                return RunOutput::launch_failure(
                    format!("failed to launch {}: {err}", self.program()),
                    started.elapsed(),
                );
            }
        };

        match child.wait(limits.timeout, limits.drain_grace) {
            Ok(output) => classify(output),
            Err(err) => {
                error!(err = %err, "lost track of child process");
                RunOutput {
                    status: Status::RuntimeError,
                    stdout: String::new(),
                    stderr: format!("{err:#}"),
                    exit_code: None,
                    signal: None,
                    elapsed: started.elapsed(),
                }
            }
        }
    }
}

/// Map finished command output onto a submission status.
pub fn classify(output: CommandOutput) -> RunOutput {
    let status = if output.timed_out {
        Status::Timeout
    } else if output.status.success() {
        Status::Success
    } else {
        Status::RuntimeError
    };

    let mut stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    stdout.push_str(&output.stdout_truncated_notice());
    let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    stderr.push_str(&output.stderr_truncated_notice());

    let (exit_code, signal) = if output.timed_out {
        (None, None)
    } else {
        (output.status.code(), exit_signal(&output))
    };

    RunOutput {
        status,
        stdout,
        stderr,
        exit_code,
        signal,
        elapsed: output.elapsed,
    }
}

#[cfg(unix)]
fn exit_signal(output: &CommandOutput) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    output.status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_output: &CommandOutput) -> Option<i32> {
    None
}
