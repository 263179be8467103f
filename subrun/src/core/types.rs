//! Submission, payload, and outcome types shared across the crate.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};

/// Terminal status of one submission.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    RuntimeError,
    Timeout,
    LaunchFailure,
    MissingEntryFile,
}

impl Status {
    /// Every status, in the order used by report summaries.
    pub const ALL: [Status; 5] = [
        Status::Success,
        Status::RuntimeError,
        Status::Timeout,
        Status::LaunchFailure,
        Status::MissingEntryFile,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::RuntimeError => "runtime_error",
            Status::Timeout => "timeout",
            Status::LaunchFailure => "launch_failure",
            Status::MissingEntryFile => "missing_entry_file",
        }
    }

    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submission folder as resolved by discovery.
///
/// `entry` is `None` when no source file could be selected; `note` then says why
/// when the reason is more specific than "no matching file".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionFolder {
    pub path: PathBuf,
    pub label: String,
    pub entry: Option<PathBuf>,
    /// Other matching files that lost the lexicographic tie-break.
    pub passed_over: Vec<PathBuf>,
    pub note: Option<String>,
}

/// Input bytes shared read-only by every execution in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPayload(Arc<[u8]>);

impl InputPayload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Another handle to the same bytes, for threads that outlive a borrow.
    pub fn shared(&self) -> Arc<[u8]> {
        Arc::clone(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for InputPayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Arc::from(bytes))
    }
}

impl From<&str> for InputPayload {
    fn from(text: &str) -> Self {
        Self(Arc::from(text.as_bytes()))
    }
}

/// What a single process run produced, before it is tagged with a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub status: Status,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub elapsed: Duration,
}

impl RunOutput {
    /// The process never started; the launch error stands in for stderr.
    pub fn launch_failure(message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            status: Status::LaunchFailure,
            stdout: String::new(),
            stderr: message.into(),
            exit_code: None,
            signal: None,
            elapsed,
        }
    }
}

/// Terminal result for one requested submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionOutcome {
    /// Zero-based position in the request.
    pub index: usize,
    pub label: String,
    pub folder: PathBuf,
    pub entry: Option<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub passed_over: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub status: Status,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl ExecutionOutcome {
    pub fn from_run(index: usize, submission: &SubmissionFolder, run: RunOutput) -> Self {
        Self {
            index,
            label: submission.label.clone(),
            folder: submission.path.clone(),
            entry: submission.entry.clone(),
            passed_over: submission.passed_over.clone(),
            note: submission.note.clone(),
            status: run.status,
            stdout: run.stdout,
            stderr: run.stderr,
            exit_code: run.exit_code,
            signal: run.signal,
            elapsed: run.elapsed,
        }
    }

    /// Outcome for a folder where discovery found nothing to run.
    pub fn missing_entry(index: usize, submission: &SubmissionFolder) -> Self {
        Self {
            index,
            label: submission.label.clone(),
            folder: submission.path.clone(),
            entry: None,
            passed_over: Vec::new(),
            note: submission.note.clone(),
            status: Status::MissingEntryFile,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            signal: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.elapsed.as_millis()
    }
}

fn serialize_millis<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}
