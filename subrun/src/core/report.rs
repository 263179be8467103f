//! Report rendering.
//!
//! Rendering is a pure function of the outcome sequence: the same outcomes
//! always produce byte-identical text.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::{ExecutionOutcome, Status};

/// Per-status counts for a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub success: usize,
    pub runtime_error: usize,
    pub timeout: usize,
    pub launch_failure: usize,
    pub missing_entry_file: usize,
}

impl Summary {
    pub fn from_outcomes(outcomes: &[ExecutionOutcome]) -> Self {
        let mut summary = Summary::default();
        for outcome in outcomes {
            summary.total += 1;
            match outcome.status {
                Status::Success => summary.success += 1,
                Status::RuntimeError => summary.runtime_error += 1,
                Status::Timeout => summary.timeout += 1,
                Status::LaunchFailure => summary.launch_failure += 1,
                Status::MissingEntryFile => summary.missing_entry_file += 1,
            }
        }
        summary
    }

    pub fn count(&self, status: Status) -> usize {
        match status {
            Status::Success => self.success,
            Status::RuntimeError => self.runtime_error,
            Status::Timeout => self.timeout,
            Status::LaunchFailure => self.launch_failure,
            Status::MissingEntryFile => self.missing_entry_file,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.success == self.total
    }

    fn line(&self) -> String {
        let mut line = format!("summary: total={}", self.total);
        for status in Status::ALL {
            let _ = write!(line, " {}={}", status, self.count(status));
        }
        line
    }
}

/// Ordered outcomes of a batch plus their summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub outcomes: Vec<ExecutionOutcome>,
    pub summary: Summary,
}

impl RunReport {
    pub fn new(outcomes: Vec<ExecutionOutcome>) -> Self {
        let summary = Summary::from_outcomes(&outcomes);
        Self { outcomes, summary }
    }

    pub fn render_text(&self) -> String {
        render(&self.outcomes)
    }

    pub fn to_json(&self) -> Result<String> {
        let mut buf = serde_json::to_string_pretty(self).context("serialize report")?;
        buf.push('\n');
        Ok(buf)
    }
}

/// Render outcomes as the human-readable report.
pub fn render(outcomes: &[ExecutionOutcome]) -> String {
    let total = outcomes.len();
    let mut buf = String::new();
    for (position, outcome) in outcomes.iter().enumerate() {
        render_outcome(&mut buf, position + 1, total, outcome);
        buf.push('\n');
    }
    buf.push_str(&Summary::from_outcomes(outcomes).line());
    buf.push('\n');
    buf
}

fn render_outcome(buf: &mut String, position: usize, total: usize, outcome: &ExecutionOutcome) {
    let _ = writeln!(buf, "--- [{position}/{total}] {} ---", outcome.label);
    let _ = writeln!(buf, "folder: {}", outcome.folder.display());
    let _ = writeln!(buf, "status: {}", outcome.status);
    if let Some(entry) = &outcome.entry {
        let _ = writeln!(buf, "entry: {}", entry.display());
    }
    if !outcome.passed_over.is_empty() {
        let skipped: Vec<String> = outcome
            .passed_over
            .iter()
            .map(|path| path.display().to_string())
            .collect();
        let _ = writeln!(buf, "passed over: {}", skipped.join(", "));
    }
    if let Some(note) = &outcome.note {
        let _ = writeln!(buf, "note: {note}");
    }
    if let Some(code) = outcome.exit_code {
        let _ = writeln!(buf, "exit code: {code}");
    }
    if let Some(signal) = outcome.signal {
        let _ = writeln!(buf, "signal: {signal}");
    }
    let _ = writeln!(buf, "elapsed: {} ms", outcome.elapsed_ms());

    if outcome.status != Status::MissingEntryFile {
        push_stream(buf, "stdout", &outcome.stdout, true);
    }
    push_stream(buf, "stderr", &outcome.stderr, false);
}

fn push_stream(buf: &mut String, name: &str, contents: &str, show_empty: bool) {
    if contents.is_empty() {
        if show_empty {
            let _ = writeln!(buf, "{name}: (empty)");
        }
        return;
    }
    let _ = writeln!(buf, "{name}:");
    buf.push_str(contents);
    if !contents.ends_with('\n') {
        buf.push('\n');
    }
}
