//! Bounded fan-out of submissions over a [`Runner`].
//!
//! Workers pull submission indices from a shared cursor, so at most
//! `max_concurrency` submissions run at once. Outcomes are slotted back by
//! request index; completion order never shows in the result.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use crate::core::types::{ExecutionOutcome, InputPayload, RunOutput, SubmissionFolder};
use crate::io::config::RunLimits;
use crate::io::runner::Runner;

/// Run every submission and return exactly one outcome per submission, in order.
#[instrument(skip_all, fields(submissions = submissions.len(), max_concurrency = max_concurrency))]
pub fn execute_all<R: Runner>(
    runner: &R,
    submissions: &[SubmissionFolder],
    input: &InputPayload,
    limits: &RunLimits,
    max_concurrency: usize,
) -> Vec<ExecutionOutcome> {
    if submissions.is_empty() {
        return Vec::new();
    }
    let workers = max_concurrency.clamp(1, submissions.len());
    debug!(workers, "starting execution workers");

    let cursor = AtomicUsize::new(0);
    let (results_tx, results_rx) = mpsc::channel();
    thread::scope(|scope| {
        let cursor = &cursor;
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let results = results_tx.clone();
                scope.spawn(move || run_worker(runner, submissions, input, limits, cursor, results))
            })
            .collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!("execution worker panicked");
            }
        }
    });
    drop(results_tx);

    let mut slots: Vec<Option<ExecutionOutcome>> = (0..submissions.len()).map(|_| None).collect();
    for outcome in results_rx {
        let index = outcome.index;
        slots[index] = Some(outcome);
    }

    slots
        .into_iter()
        .zip(submissions)
        .enumerate()
        .map(|(index, (slot, submission))| {
            slot.unwrap_or_else(|| {
                warn!(index, label = %submission.label, "submission lost to a worker panic");
                ExecutionOutcome::from_run(
                    index,
                    submission,
                    RunOutput::launch_failure(
                        "execution worker panicked before this submission finished",
                        Duration::ZERO,
                    ),
                )
            })
        })
        .collect()
}

fn run_worker<R: Runner>(
    runner: &R,
    submissions: &[SubmissionFolder],
    input: &InputPayload,
    limits: &RunLimits,
    cursor: &AtomicUsize,
    results: Sender<ExecutionOutcome>,
) {
    loop {
        let index = cursor.fetch_add(1, Ordering::Relaxed);
        let Some(submission) = submissions.get(index) else {
            break;
        };
        let outcome = execute_one(runner, index, submission, input, limits);
        debug!(
            index,
            label = %outcome.label,
            status = %outcome.status,
            elapsed_ms = outcome.elapsed_ms() as u64,
            "submission finished"
        );
        if results.send(outcome).is_err() {
            break;
        }
    }
}

/// Run a single submission; folders without an entry file never reach the runner.
///
/// A panic inside the runner becomes a `LaunchFailure` for this submission
/// only, so the calling worker keeps pulling work.
pub fn execute_one<R: Runner>(
    runner: &R,
    index: usize,
    submission: &SubmissionFolder,
    input: &InputPayload,
    limits: &RunLimits,
) -> ExecutionOutcome {
    let Some(entry) = &submission.entry else {
        return ExecutionOutcome::missing_entry(index, submission);
    };
    let started = Instant::now();
    let run = panic::catch_unwind(AssertUnwindSafe(|| runner.run(entry, input, limits)))
        .unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            warn!(index, label = %submission.label, panic = %message, "runner panicked");
            RunOutput::launch_failure(format!("runner panicked: {message}"), started.elapsed())
        });
    ExecutionOutcome::from_run(index, submission, run)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
