//! Batch and single-snippet entry points.
//!
//! Coordinates precondition checks, discovery, execution, and report
//! assembly. Anything that fails here fails before a process is started;
//! per-submission problems end up in the report instead.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{info, instrument, warn};

use crate::core::report::RunReport;
use crate::core::types::{ExecutionOutcome, InputPayload, SubmissionFolder};
use crate::executor::execute_all;
use crate::io::config::RunConfig;
use crate::io::locate::{find_folders, locate};
use crate::io::runner::{ProcessRunner, Runner};

/// Label used for ad-hoc snippets in reports.
pub const SNIPPET_LABEL: &str = "snippet";

/// Folder shown for snippets; the real scratch directory is gone once the report exists.
pub const SNIPPET_FOLDER: &str = "(scratch)";

/// Runs batches of submissions with a fixed configuration.
#[derive(Debug)]
pub struct Orchestrator<R = ProcessRunner> {
    config: RunConfig,
    runner: R,
}

impl Orchestrator<ProcessRunner> {
    /// Orchestrator that spawns the configured interpreter.
    pub fn new(config: RunConfig) -> Result<Self> {
        let runner = ProcessRunner::from_config(&config);
        Self::with_runner(config, runner)
    }
}

impl<R: Runner> Orchestrator<R> {
    pub fn with_runner(config: RunConfig, runner: R) -> Result<Self> {
        config.validate().context("invalid run configuration")?;
        Ok(Self { config, runner })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run every folder against the input file.
    #[instrument(skip_all, fields(folders = folder_paths.len(), input = %input_file.display()))]
    pub fn run_batch(&self, folder_paths: &[PathBuf], input_file: &Path) -> Result<RunReport> {
        if folder_paths.is_empty() {
            bail!("no submission folders selected");
        }
        let input = read_input(input_file)?;
        info!(input_bytes = input.len(), "batch started");

        let submissions = locate(folder_paths, &self.config.extension);
        let outcomes = execute_all(
            &self.runner,
            &submissions,
            &input,
            &self.config.limits(),
            self.config.max_concurrency,
        );

        let report = RunReport::new(outcomes);
        info!(
            total = report.summary.total,
            success = report.summary.success,
            runtime_error = report.summary.runtime_error,
            timeout = report.summary.timeout,
            launch_failure = report.summary.launch_failure,
            missing_entry_file = report.summary.missing_entry_file,
            "batch finished"
        );
        Ok(report)
    }

    /// Run every immediate subfolder of `parent` against the input file.
    pub fn run_parent(&self, parent: &Path, input_file: &Path) -> Result<RunReport> {
        let folders = find_folders(parent).context("list submission folders")?;
        if folders.is_empty() {
            bail!("no submission folders found in {}", parent.display());
        }
        self.run_batch(&folders, input_file)
    }

    /// Run one ad-hoc snippet against literal input text, skipping discovery.
    #[instrument(skip_all, fields(code_bytes = source_code.len(), input_bytes = input_text.len()))]
    pub fn run_one(&self, source_code: &str, input_text: &str) -> Result<RunReport> {
        let scratch = tempfile::Builder::new()
            .prefix("subrun-")
            .tempdir()
            .context("create scratch directory")?;
        let file_name = format!("submission.{}", self.config.extension);
        let entry = scratch.path().join(&file_name);
        fs::write(&entry, source_code)
            .with_context(|| format!("write snippet {}", entry.display()))?;

        let input = InputPayload::from(input_text);
        let run = self.runner.run(&entry, &input, &self.config.limits());
        let reported = SubmissionFolder {
            path: PathBuf::from(SNIPPET_FOLDER),
            label: SNIPPET_LABEL.to_string(),
            entry: Some(PathBuf::from(file_name)),
            passed_over: Vec::new(),
            note: None,
        };
        let outcome = ExecutionOutcome::from_run(0, &reported, run);
        info!(status = %outcome.status, "snippet finished");

        if let Err(err) = scratch.close() {
            warn!(err = %err, "failed to remove scratch directory");
        }
        Ok(RunReport::new(vec![outcome]))
    }
}

/// Read the shared input once; a missing or unreadable file fails the batch.
fn read_input(path: &Path) -> Result<InputPayload> {
    if !path.is_file() {
        bail!(
            "input file {} does not exist or is not a file",
            path.display()
        );
    }
    let bytes = fs::read(path).with_context(|| format!("read input file {}", path.display()))?;
    Ok(InputPayload::from(bytes))
}

/// Run one snippet and render the report text.
pub fn run_submission(config: &RunConfig, code: &str, input: &str) -> Result<String> {
    let report = Orchestrator::new(config.clone())?.run_one(code, input)?;
    Ok(report.render_text())
}

/// Run every folder against the input file and render the report text.
pub fn run_multiple_submissions(
    config: &RunConfig,
    folder_paths: &[PathBuf],
    input_file: &Path,
) -> Result<String> {
    let report = Orchestrator::new(config.clone())?.run_batch(folder_paths, input_file)?;
    Ok(report.render_text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Status;
    use crate::test_support::{ScriptedRunner, SubmissionFixture, sh_config};

    #[test]
    fn empty_folder_list_fails_fast() {
        let fixture = SubmissionFixture::new().expect("fixture");
        let input = fixture.input("1\n").expect("input");
        let orchestrator =
            Orchestrator::with_runner(sh_config(), ScriptedRunner::new()).expect("orchestrator");

        let err = orchestrator.run_batch(&[], &input).expect_err("empty batch");
        assert!(err.to_string().contains("no submission folders"));
        assert_eq!(orchestrator.runner().total_calls(), 0);
    }

    #[test]
    fn missing_input_fails_before_any_run() {
        let fixture = SubmissionFixture::new().expect("fixture");
        let folder = fixture
            .folder("alice", &[("main.sh", "echo hi\n")])
            .expect("folder");
        let orchestrator =
            Orchestrator::with_runner(sh_config(), ScriptedRunner::new()).expect("orchestrator");

        let err = orchestrator
            .run_batch(&[folder], &fixture.path().join("missing.txt"))
            .expect_err("missing input");
        assert!(err.to_string().contains("input file"));
        assert_eq!(orchestrator.runner().total_calls(), 0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = RunConfig {
            timeout_ms: 0,
            ..sh_config()
        };
        let err = Orchestrator::with_runner(config, ScriptedRunner::new()).expect_err("invalid");
        assert!(format!("{err:#}").contains("timeout_ms"));
    }

    #[test]
    fn batch_reports_every_folder_in_order() {
        let fixture = SubmissionFixture::new().expect("fixture");
        let b = fixture.folder("b", &[("main.sh", "")]).expect("b");
        let empty = fixture.folder("empty", &[("readme.txt", "")]).expect("empty");
        let a = fixture.folder("a", &[("main.sh", "")]).expect("a");
        let input = fixture.input("").expect("input");
        let orchestrator =
            Orchestrator::with_runner(sh_config(), ScriptedRunner::new()).expect("orchestrator");

        let report = orchestrator
            .run_batch(&[b, empty, a], &input)
            .expect("report");
        let labels: Vec<&str> = report.outcomes.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["b", "empty", "a"]);
        assert_eq!(report.outcomes[1].status, Status::MissingEntryFile);
        assert_eq!(report.summary.success, 2);
        assert_eq!(orchestrator.runner().total_calls(), 2);
    }

    #[test]
    fn run_parent_requires_subfolders() {
        let fixture = SubmissionFixture::new().expect("fixture");
        let input = fixture.input("").expect("input");
        let orchestrator =
            Orchestrator::with_runner(sh_config(), ScriptedRunner::new()).expect("orchestrator");

        let err = orchestrator
            .run_parent(fixture.path(), &input)
            .expect_err("no subfolders");
        assert!(err.to_string().contains("no submission folders found"));
    }

    #[test]
    fn run_one_uses_snippet_label() {
        let orchestrator =
            Orchestrator::with_runner(sh_config(), ScriptedRunner::new()).expect("orchestrator");
        let report = orchestrator.run_one("echo hi\n", "").expect("report");
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].label, SNIPPET_LABEL);
        assert_eq!(report.outcomes[0].status, Status::Success);
        assert_eq!(report.outcomes[0].folder, PathBuf::from(SNIPPET_FOLDER));
        assert_eq!(report.outcomes[0].entry, Some(PathBuf::from("submission.sh")));
    }

    #[test]
    fn run_one_report_is_stable_and_scratch_is_removed() {
        let orchestrator =
            Orchestrator::with_runner(sh_config(), ScriptedRunner::new()).expect("orchestrator");
        let first = orchestrator.run_one("echo hi\n", "").expect("first");
        let second = orchestrator.run_one("echo hi\n", "").expect("second");

        let text = first.render_text();
        assert!(text.contains("folder: (scratch)\n"));
        assert!(text.contains("entry: submission.sh\n"));
        assert_eq!(first.outcomes[0].folder, second.outcomes[0].folder);
        assert_eq!(first.outcomes[0].entry, second.outcomes[0].entry);

        // The runner saw the real scratch file, which no longer exists.
        let ran = first.outcomes[0].stdout.trim().trim_start_matches("ran ");
        assert!(ran.ends_with("submission.sh"));
        assert!(!Path::new(ran).exists(), "scratch directory should be removed");
    }
}
