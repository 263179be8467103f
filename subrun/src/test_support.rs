//! Test-only helpers: scripted runners and submission folder fixtures.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tempfile::TempDir;

use crate::core::types::{InputPayload, RunOutput, Status, SubmissionFolder};
use crate::io::config::{RunConfig, RunLimits};
use crate::io::runner::Runner;

/// Build a submission with a fixed folder layout and optional entry file.
pub fn submission(label: &str, entry: Option<&str>) -> SubmissionFolder {
    SubmissionFolder {
        path: PathBuf::from(label),
        label: label.to_string(),
        entry: entry.map(PathBuf::from),
        passed_over: Vec::new(),
        note: None,
    }
}

/// Runner that never spawns processes.
///
/// Responds per entry path with a scripted status and delay, defaulting to a
/// quick `Success` whose stdout names the entry. Records every call and the
/// peak number of calls in flight at once.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    statuses: BTreeMap<PathBuf, Status>,
    delays: BTreeMap<PathBuf, Duration>,
    panics: Vec<PathBuf>,
    default_delay: Duration,
    calls: Mutex<Vec<PathBuf>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, entry: &str, status: Status) -> Self {
        self.statuses.insert(PathBuf::from(entry), status);
        self
    }

    pub fn with_delay(mut self, entry: &str, delay: Duration) -> Self {
        self.delays.insert(PathBuf::from(entry), delay);
        self
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn with_panic(mut self, entry: &str) -> Self {
        self.panics.push(PathBuf::from(entry));
        self
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn calls_for(&self, entry: &Path) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|call| call.as_path() == entry)
            .count()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Runner for ScriptedRunner {
    fn run(&self, entry_file: &Path, _input: &InputPayload, _limits: &RunLimits) -> RunOutput {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry_file.to_path_buf());
        if self.panics.iter().any(|entry| entry == entry_file) {
            panic!("scripted panic for {}", entry_file.display());
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let delay = self
            .delays
            .get(entry_file)
            .copied()
            .unwrap_or(self.default_delay);
        thread::sleep(delay);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let status = self
            .statuses
            .get(entry_file)
            .copied()
            .unwrap_or(Status::Success);
        RunOutput {
            status,
            stdout: format!("ran {}\n", entry_file.display()),
            stderr: String::new(),
            exit_code: (status != Status::Timeout).then_some(i32::from(status != Status::Success)),
            signal: None,
            elapsed: delay,
        }
    }
}

/// A temporary directory holding submission folders and input files.
pub struct SubmissionFixture {
    temp: TempDir,
}

impl SubmissionFixture {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create temp dir")?;
        Ok(Self { temp })
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Create `<root>/submissions/<name>` containing `files` (name, contents).
    pub fn folder(&self, name: &str, files: &[(&str, &str)]) -> Result<PathBuf> {
        let dir = self.path().join("submissions").join(name);
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        for (file, contents) in files {
            let path = dir.join(file);
            fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        }
        Ok(dir)
    }

    pub fn submissions_dir(&self) -> PathBuf {
        self.path().join("submissions")
    }

    pub fn input(&self, contents: &str) -> Result<PathBuf> {
        let path = self.path().join("input.txt");
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}

/// Config that interprets `.sh` entry files with `sh`, with short limits.
pub fn sh_config() -> RunConfig {
    RunConfig {
        interpreter: vec!["sh".to_string()],
        extension: "sh".to_string(),
        timeout_ms: 2_000,
        output_limit_bytes: 10_000,
        max_concurrency: 4,
        drain_grace_ms: 500,
        env: BTreeMap::new(),
    }
}

/// Whether `python3` can be started on this machine.
pub fn python_available() -> bool {
    Command::new("python3")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Whether `pid` no longer names a live process. Zombies count as gone.
#[cfg(unix)]
pub fn process_gone(pid: u32) -> bool {
    match fs::read_to_string(format!("/proc/{pid}/stat")) {
        // The state follows the parenthesised command name.
        Ok(stat) => stat
            .rsplit_once(')')
            .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z')),
        Err(_) if Path::new("/proc/self").exists() => true,
        Err(_) => !Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|status| status.success()),
    }
}

/// Poll [`process_gone`] until it holds or `within` elapses.
#[cfg(unix)]
pub fn wait_until_gone(pid: u32, within: Duration) -> bool {
    let deadline = std::time::Instant::now() + within;
    loop {
        if process_gone(pid) {
            return true;
        }
        if std::time::Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(20));
    }
}
