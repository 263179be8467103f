//! End-to-end batch tests over real `sh` processes.
//!
//! Each test builds submission folders in a temp dir, runs them through an
//! [`Orchestrator`] backed by the process runner, and checks the outcomes and
//! the rendered report.

#![cfg(unix)]

use std::time::{Duration, Instant};

use subrun::core::report::render;
use subrun::core::types::Status;
use subrun::io::config::RunConfig;
use subrun::orchestrator::{Orchestrator, run_multiple_submissions, run_submission};
use subrun::test_support::{SubmissionFixture, sh_config, wait_until_gone};

const SUM: &str = "read a\nread b\necho $((a + b))\n";

/// Mixed batch: every status except launch failure, in request order.
///
/// Layout:
/// ```text
/// submissions/
/// ├── ok/main.sh        sums two numbers
/// ├── crash/main.sh     writes to stderr, exits 1
/// ├── empty/            no entry file
/// └── hang/main.sh      prints, then loops forever
/// ```
#[test]
fn mixed_batch_reports_each_submission_in_order() {
    let fixture = SubmissionFixture::new().expect("fixture");
    let ok = fixture.folder("ok", &[("main.sh", SUM)]).expect("ok");
    let crash = fixture
        .folder("crash", &[("main.sh", "echo 'ZeroDivisionError' >&2\nexit 1\n")])
        .expect("crash");
    let empty = fixture.folder("empty", &[("notes.txt", "nothing")]).expect("empty");
    let hang = fixture
        .folder("hang", &[("main.sh", "echo working\nwhile :; do :; done\n")])
        .expect("hang");
    let input = fixture.input("10\n20\n").expect("input");

    let config = RunConfig {
        timeout_ms: 500,
        ..sh_config()
    };
    let orchestrator = Orchestrator::new(config).expect("orchestrator");
    let report = orchestrator
        .run_batch(&[ok, crash, empty, hang], &input)
        .expect("report");

    let statuses: Vec<Status> = report.outcomes.iter().map(|o| o.status).collect();
    assert_eq!(
        statuses,
        vec![
            Status::Success,
            Status::RuntimeError,
            Status::MissingEntryFile,
            Status::Timeout
        ]
    );
    assert_eq!(report.outcomes[0].stdout, "30\n");
    assert!(report.outcomes[1].stderr.contains("ZeroDivisionError"));
    assert_eq!(report.outcomes[1].exit_code, Some(1));
    assert_eq!(report.outcomes[3].stdout, "working\n");

    let text = report.render_text();
    assert!(text.contains("--- [3/4] empty ---\n"));
    assert!(text.ends_with(
        "summary: total=4 success=1 runtime_error=1 timeout=1 launch_failure=0 missing_entry_file=1\n"
    ));
    assert_eq!(text, render(&report.outcomes));
}

#[test]
fn timeout_is_enforced_within_tolerance() {
    let fixture = SubmissionFixture::new().expect("fixture");
    let hang = fixture
        .folder("hang", &[("main.sh", "while :; do :; done\n")])
        .expect("hang");
    let input = fixture.input("").expect("input");
    let config = RunConfig {
        timeout_ms: 400,
        ..sh_config()
    };

    let started = Instant::now();
    let report = Orchestrator::new(config)
        .expect("orchestrator")
        .run_batch(&[hang], &input)
        .expect("report");

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, Status::Timeout);
    assert!(outcome.elapsed >= Duration::from_millis(400));
    assert!(outcome.elapsed < Duration::from_millis(400) + Duration::from_secs(2));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn hung_submissions_do_not_block_siblings() {
    let fixture = SubmissionFixture::new().expect("fixture");
    let mut folders = Vec::new();
    for i in 0..3 {
        folders.push(
            fixture
                .folder(&format!("hang{i}"), &[("main.sh", "while :; do :; done\n")])
                .expect("hang"),
        );
    }
    folders.push(fixture.folder("quick", &[("main.sh", "echo done\n")]).expect("quick"));
    let input = fixture.input("").expect("input");
    let config = RunConfig {
        timeout_ms: 600,
        max_concurrency: 4,
        ..sh_config()
    };

    let started = Instant::now();
    let report = Orchestrator::new(config)
        .expect("orchestrator")
        .run_batch(&folders, &input)
        .expect("report");

    assert_eq!(report.summary.timeout, 3);
    assert_eq!(report.outcomes[3].status, Status::Success);
    assert!(report.outcomes[3].elapsed < Duration::from_millis(600));
    // All three hangs ran side by side, not one after another.
    assert!(started.elapsed() < Duration::from_millis(1_800));
}

#[test]
fn fifty_submissions_with_bounded_concurrency() {
    let fixture = SubmissionFixture::new().expect("fixture");
    let folders: Vec<_> = (0..50)
        .map(|i| {
            let body = format!("read a\necho {i}:$a\n");
            fixture
                .folder(&format!("s{i:02}"), &[("main.sh", body.as_str())])
                .expect("folder")
        })
        .collect();
    let input = fixture.input("shared\n").expect("input");
    let config = RunConfig {
        max_concurrency: 5,
        ..sh_config()
    };

    let report = Orchestrator::new(config)
        .expect("orchestrator")
        .run_batch(&folders, &input)
        .expect("report");

    assert_eq!(report.outcomes.len(), 50);
    assert_eq!(report.summary.success, 50);
    for (i, outcome) in report.outcomes.iter().enumerate() {
        assert_eq!(outcome.label, format!("s{i:02}"));
        assert_eq!(outcome.stdout, format!("{i}:shared\n"));
    }
}

/// Every live submission holds a marker file in a shared directory and logs
/// how many markers it can see, so the log bounds the real process overlap.
#[test]
fn live_processes_never_exceed_the_concurrency_ceiling() {
    let fixture = SubmissionFixture::new().expect("fixture");
    let live = fixture.path().join("live");
    std::fs::create_dir(&live).expect("live dir");
    let log = fixture.path().join("overlap.log");
    let body = format!(
        "touch '{live}/'$$\nls '{live}' | wc -l >> '{log}'\nsleep 0.2\nrm -f '{live}/'$$\n",
        live = live.display(),
        log = log.display()
    );
    let folders: Vec<_> = (0..50)
        .map(|i| {
            fixture
                .folder(&format!("s{i:02}"), &[("main.sh", body.as_str())])
                .expect("folder")
        })
        .collect();
    let input = fixture.input("").expect("input");
    let config = RunConfig {
        max_concurrency: 5,
        timeout_ms: 5_000,
        ..sh_config()
    };

    let report = Orchestrator::new(config)
        .expect("orchestrator")
        .run_batch(&folders, &input)
        .expect("report");

    assert_eq!(report.summary.success, 50);
    let counts: Vec<usize> = std::fs::read_to_string(&log)
        .expect("overlap log")
        .lines()
        .map(|line| line.trim().parse().expect("count"))
        .collect();
    assert_eq!(counts.len(), 50);
    let peak = counts.iter().copied().max().unwrap_or(0);
    assert!(peak <= 5, "saw {peak} live submissions at once");
    assert!(peak >= 2, "submissions never overlapped");
}

/// Background processes started by a submission die with it on timeout.
#[test]
fn timeout_leaves_no_background_processes() {
    let fixture = SubmissionFixture::new().expect("fixture");
    let spawner = fixture
        .folder("spawner", &[("main.sh", "sleep 37 &\necho $!\nwait\n")])
        .expect("spawner");
    let input = fixture.input("").expect("input");
    let config = RunConfig {
        timeout_ms: 300,
        ..sh_config()
    };

    let started = Instant::now();
    let report = Orchestrator::new(config)
        .expect("orchestrator")
        .run_batch(&[spawner], &input)
        .expect("report");

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, Status::Timeout);
    let pid: u32 = outcome.stdout.trim().parse().expect("background pid");
    assert!(
        wait_until_gone(pid, Duration::from_secs(2)),
        "background sleep {pid} outlived its submission"
    );
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[test]
fn missing_interpreter_is_a_launch_failure_per_submission() {
    let fixture = SubmissionFixture::new().expect("fixture");
    let a = fixture.folder("a", &[("main.sh", "echo a\n")]).expect("a");
    let b = fixture.folder("b", &[("main.sh", "echo b\n")]).expect("b");
    let input = fixture.input("").expect("input");
    let config = RunConfig {
        interpreter: vec!["/nonexistent/interpreter".to_string()],
        ..sh_config()
    };

    let report = Orchestrator::new(config)
        .expect("orchestrator")
        .run_batch(&[a, b], &input)
        .expect("report");

    assert_eq!(report.summary.launch_failure, 2);
    assert!(report.outcomes[0].stderr.contains("failed to launch"));
}

#[test]
fn runaway_output_is_truncated_with_marker() {
    let fixture = SubmissionFixture::new().expect("fixture");
    let noisy = fixture
        .folder(
            "noisy",
            &[("main.sh", "i=0\nwhile [ $i -lt 2000 ]; do echo line$i; i=$((i+1)); done\n")],
        )
        .expect("noisy");
    let input = fixture.input("").expect("input");
    let config = RunConfig {
        output_limit_bytes: 64,
        ..sh_config()
    };

    let report = Orchestrator::new(config)
        .expect("orchestrator")
        .run_batch(&[noisy], &input)
        .expect("report");

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, Status::Success);
    assert!(outcome.stdout.starts_with("line0\nline1\n"));
    assert!(outcome.stdout.contains("[stdout truncated "));
    assert!(outcome.stdout.len() < 200);
}

#[test]
fn parent_folder_runs_every_subfolder_sorted() {
    let fixture = SubmissionFixture::new().expect("fixture");
    fixture.folder("zed", &[("main.sh", "echo z\n")]).expect("zed");
    fixture.folder("amy", &[("main.sh", "echo a\n")]).expect("amy");
    let input = fixture.input("").expect("input");

    let report = Orchestrator::new(sh_config())
        .expect("orchestrator")
        .run_parent(&fixture.submissions_dir(), &input)
        .expect("report");

    let labels: Vec<&str> = report.outcomes.iter().map(|o| o.label.as_str()).collect();
    assert_eq!(labels, vec!["amy", "zed"]);
}

#[test]
fn string_entry_points_render_reports() {
    let fixture = SubmissionFixture::new().expect("fixture");
    let ok = fixture.folder("ok", &[("main.sh", SUM)]).expect("ok");
    let input = fixture.input("1\n2\n").expect("input");

    let text = run_multiple_submissions(&sh_config(), &[ok], &input).expect("batch");
    assert!(text.contains("status: success\n"));
    assert!(text.contains("stdout:\n3\n"));

    let text = run_submission(&sh_config(), SUM, "4\n5\n").expect("snippet");
    assert!(text.contains("--- [1/1] snippet ---\n"));
    assert!(text.contains("stdout:\n9\n"));
}
