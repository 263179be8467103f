//! Helpers for running child processes with timeouts and bounded output.

use std::io::{ErrorKind, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
    /// False when a reader was still blocked after the drain grace period,
    /// which only happens when a descendant left the child's process group
    /// and kept a pipe open.
    pub drained: bool,
    /// Time from spawn until the child exited or was killed.
    pub elapsed: Duration,
}

impl CommandOutput {
    pub fn stdout_truncated_notice(&self) -> String {
        truncated_notice("stdout", self.stdout_truncated)
    }

    pub fn stderr_truncated_notice(&self) -> String {
        truncated_notice("stderr", self.stderr_truncated)
    }
}

fn truncated_notice(stream: &str, bytes: usize) -> String {
    if bytes > 0 {
        format!("\n[{stream} truncated {bytes} bytes]\n")
    } else {
        String::new()
    }
}

/// Owns a spawned child and kills and reaps it if dropped before being waited on.
struct ChildGuard {
    child: Option<Child>,
}

impl ChildGuard {
    fn child_mut(&mut self) -> Result<&mut Child> {
        self.child
            .as_mut()
            .ok_or_else(|| anyhow!("child already reaped"))
    }

    /// Wait up to `timeout`, killing the child if it is still running.
    ///
    /// Either way, anything left in the child's process group is killed
    /// before returning.
    fn wait_or_kill(&mut self, timeout: Duration) -> Result<(ExitStatus, bool)> {
        let child = self.child_mut()?;
        let outcome = match child.wait_timeout(timeout).context("wait for command")? {
            Some(status) => {
                if let Err(err) = kill_tree(child) {
                    debug!(err = %err, "failed to kill leftover processes");
                }
                (status, false)
            }
            None => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "command timed out, killing"
                );
                kill_tree(child).context("kill command")?;
                (child.wait().context("wait command after kill")?, true)
            }
        };
        self.child = None;
        Ok(outcome)
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            debug!("killing child on early exit");
            let _ = kill_tree(&mut child);
            let _ = child.wait();
        }
    }
}

/// Put the child in a fresh process group so [`kill_tree`] reaches everything it starts.
fn isolate_group(cmd: &mut Command) {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    #[cfg(not(unix))]
    let _ = cmd;
}

/// SIGKILL the child's process group. Off unix only the child itself is killed.
fn kill_tree(child: &mut Child) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let pgid = i32::try_from(child.id())
            .map_err(|_| std::io::Error::other("child pid out of range"))?;
        match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(errno.into()),
        }
    }
    #[cfg(not(unix))]
    {
        child.kill()
    }
}

#[derive(Debug, Default)]
struct Capture {
    buf: Vec<u8>,
    truncated: usize,
}

impl Capture {
    fn push(&mut self, chunk: &[u8], limit: usize) {
        let remaining = limit.saturating_sub(self.buf.len());
        let keep = chunk.len().min(remaining);
        self.buf.extend_from_slice(&chunk[..keep]);
        self.truncated += chunk.len() - keep;
    }
}

type SharedCapture = Arc<Mutex<Capture>>;

/// A running child whose stdin is being fed and whose output is being drained.
pub struct CapturedChild {
    guard: ChildGuard,
    stdout: SharedCapture,
    stderr: SharedCapture,
    readers: Vec<thread::JoinHandle<()>>,
    readers_done: Receiver<()>,
    started: Instant,
}

/// Spawn `cmd` with all three standard streams piped.
///
/// Output readers start before any input is written, and the input is written
/// from its own thread before stdin is closed, so neither side can stall on a
/// full pipe. `output_limit_bytes` bounds what is kept from each stream; the
/// rest is still drained and counted.
pub fn spawn_captured(
    mut cmd: Command,
    stdin: Option<Arc<[u8]>>,
    output_limit_bytes: usize,
) -> std::io::Result<CapturedChild> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    isolate_group(&mut cmd);

    debug!("spawning child process");
    let mut child = cmd.spawn()?;
    let started = Instant::now();

    let child_stdin = child.stdin.take();
    let child_stdout = child.stdout.take();
    let child_stderr = child.stderr.take();
    let guard = ChildGuard { child: Some(child) };

    let stdout = SharedCapture::default();
    let stderr = SharedCapture::default();
    let (done_tx, readers_done) = mpsc::channel();
    let mut readers = Vec::with_capacity(2);
    if let Some(pipe) = child_stdout {
        readers.push(spawn_reader(
            pipe,
            output_limit_bytes,
            Arc::clone(&stdout),
            done_tx.clone(),
        ));
    }
    if let Some(pipe) = child_stderr {
        readers.push(spawn_reader(
            pipe,
            output_limit_bytes,
            Arc::clone(&stderr),
            done_tx,
        ));
    }

    if let (Some(mut pipe), Some(input)) = (child_stdin, stdin) {
        thread::spawn(move || {
            if let Err(err) = pipe.write_all(&input)
                && err.kind() != ErrorKind::BrokenPipe
            {
                warn!(err = %err, "failed to write child stdin");
            }
            // Dropping the pipe closes stdin so the child sees end-of-input.
        });
    }

    Ok(CapturedChild {
        guard,
        stdout,
        stderr,
        readers,
        readers_done,
        started,
    })
}

impl CapturedChild {
    /// Wait for the child, killing it after `timeout`, then collect its output.
    ///
    /// Output captured before a kill is kept. Readers get `drain_grace` to
    /// finish after the child ends; anything they have not delivered by then is
    /// dropped and the readers are detached.
    #[instrument(skip_all, fields(timeout_ms = timeout.as_millis() as u64))]
    pub fn wait(mut self, timeout: Duration, drain_grace: Duration) -> Result<CommandOutput> {
        let (status, timed_out) = self.guard.wait_or_kill(timeout)?;
        let elapsed = self.started.elapsed();
        let drained = self.drain(drain_grace);
        if !drained {
            warn!(
                grace_ms = drain_grace.as_millis() as u64,
                "output pipes still open after child exit, detaching readers"
            );
        }

        let (stdout, stdout_truncated) = snapshot(&self.stdout);
        let (stderr, stderr_truncated) = snapshot(&self.stderr);
        if stdout_truncated > 0 || stderr_truncated > 0 {
            warn!(stdout_truncated, stderr_truncated, "output truncated");
        }

        debug!(exit_code = ?status.code(), timed_out, "command finished");
        Ok(CommandOutput {
            status,
            stdout,
            stderr,
            stdout_truncated,
            stderr_truncated,
            timed_out,
            drained,
            elapsed,
        })
    }

    fn drain(&mut self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        let mut finished = 0;
        while finished < self.readers.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.readers_done.recv_timeout(remaining) {
                Ok(()) => finished += 1,
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => return false,
            }
        }
        for handle in self.readers.drain(..) {
            if handle.join().is_err() {
                warn!("output reader thread panicked");
            }
        }
        true
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    reader: R,
    limit: usize,
    capture: SharedCapture,
    done: Sender<()>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        if let Err(err) = read_stream_limited(reader, limit, &capture) {
            debug!(err = %err, "output reader stopped");
        }
        let _ = done.send(());
    })
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize, capture: &Mutex<Capture>) -> Result<()> {
    let mut chunk = [0u8; 8192];
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err).context("read output"),
        };
        capture
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(&chunk[..n], limit);
    }
    Ok(())
}

fn snapshot(capture: &Mutex<Capture>) -> (Vec<u8>, usize) {
    let mut capture = capture.lock().unwrap_or_else(PoisonError::into_inner);
    (std::mem::take(&mut capture.buf), capture.truncated)
}
