//! Debug adapter process spawner.
//!
//! Spawns one adapter subprocess per session with:
//! - `kill_on_drop(true)` so a dropped session never leaks the process.
//! - Piped stdio: stdin/stdout carry the protocol, stderr is drained into a
//!   bounded tail kept for diagnostics and never parsed.
//! - A startup probe that reports an adapter which exits immediately (for
//!   example because the debugger module is not installed) together with what
//!   it printed.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{AppError, Result};

/// Number of stderr lines retained per adapter.
pub const STDERR_TAIL_LINES: usize = 20;

/// Number of retained lines appended to transport fault messages.
const STDERR_REPORT_LINES: usize = 5;

/// Wait for the stderr drain after an early exit.
const STDERR_SETTLE: Duration = Duration::from_millis(200);

// ── Configuration ────────────────────────────────────────────────────────────

/// Configuration for spawning a debug adapter process.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Adapter executable.
    pub command: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Working directory of the adapter process.
    pub working_dir: PathBuf,
    /// Variables added to the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Delay before probing for an early exit.
    pub startup_grace: Duration,
}

// ── Stderr tail ──────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct TailInner {
    lines: VecDeque<String>,
    summary: Option<String>,
}

/// Bounded record of an adapter's most recent stderr output.
///
/// The first line that looks like a permission failure is kept separately
/// as a summary, since it usually explains an otherwise opaque exit.
#[derive(Debug, Clone, Default)]
pub struct StderrTail {
    inner: Arc<Mutex<TailInner>>,
}

impl StderrTail {
    /// Create an empty tail.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one stderr line.
    pub async fn push(&self, line: String) {
        let mut inner = self.inner.lock().await;
        let lowered = line.to_lowercase();
        if inner.summary.is_none()
            && (lowered.contains("permissionerror") || lowered.contains("operation not permitted"))
        {
            inner.summary = Some(line.clone());
        }
        if inner.lines.len() == STDERR_TAIL_LINES {
            inner.lines.pop_front();
        }
        inner.lines.push_back(line);
    }

    /// Retained lines, oldest first.
    pub async fn lines(&self) -> Vec<String> {
        self.inner.lock().await.lines.iter().cloned().collect()
    }

    /// First permission-failure line seen, if any.
    pub async fn summary(&self) -> Option<String> {
        self.inner.lock().await.summary.clone()
    }

    /// Append the summary and the last few stderr lines to `reason`.
    pub async fn annotate(&self, reason: String) -> String {
        let inner = self.inner.lock().await;
        let mut out = reason;
        if let Some(summary) = &inner.summary {
            out.push_str(" (");
            out.push_str(summary);
            out.push(')');
        }
        let skip = inner.lines.len().saturating_sub(STDERR_REPORT_LINES);
        let recent: Vec<&str> = inner.lines.iter().skip(skip).map(String::as_str).collect();
        if !recent.is_empty() {
            out.push_str("; adapter stderr: ");
            out.push_str(&recent.join(" | "));
        }
        out
    }
}

// ── Process handle ───────────────────────────────────────────────────────────

/// A running adapter process and its stderr drain.
#[derive(Debug)]
pub struct AdapterProcess {
    /// Child handle, kept alive so `kill_on_drop` applies.
    pub child: Child,
    /// Recent stderr output.
    pub stderr_tail: StderrTail,
    stderr_task: Option<JoinHandle<()>>,
}

impl AdapterProcess {
    /// Stop the adapter: polite signal, bounded wait, then a forced kill.
    pub async fn terminate(&mut self, session_id: &str, grace: Duration) -> Option<ExitStatus> {
        let status = terminate_child(session_id, &mut self.child, grace).await;
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        status
    }
}

/// Freshly spawned adapter with its protocol streams.
#[derive(Debug)]
pub struct SpawnedAdapter {
    /// Process handle.
    pub process: AdapterProcess,
    /// Adapter's stdin, the outbound protocol stream.
    pub stdin: ChildStdin,
    /// Adapter's stdout, the inbound protocol stream.
    pub stdout: ChildStdout,
}

// ── Spawner ──────────────────────────────────────────────────────────────────

/// Spawn a debug adapter and verify it survives its startup grace period.
///
/// # Errors
///
/// - `AppError::Transport("failed to spawn adapter …")` on OS spawn failure.
/// - `AppError::Transport("adapter exited during startup …")` when the
///   process is already gone after the grace period; the message carries
///   its stderr tail.
pub async fn spawn_adapter(config: &SpawnConfig, session_id: &str) -> Result<SpawnedAdapter> {
    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args)
        .envs(&config.env)
        .current_dir(&config.working_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|err| {
        AppError::Transport(format!("failed to spawn adapter '{}': {err}", config.command))
    })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Transport("failed to capture adapter stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Transport("failed to capture adapter stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Transport("failed to capture adapter stderr".into()))?;

    let stderr_tail = StderrTail::new();
    let mut stderr_task = drain_stderr(session_id.to_owned(), stderr, stderr_tail.clone());

    tokio::time::sleep(config.startup_grace).await;
    if let Some(status) = child
        .try_wait()
        .map_err(|err| AppError::Transport(format!("failed to poll adapter: {err}")))?
    {
        let _ = tokio::time::timeout(STDERR_SETTLE, &mut stderr_task).await;
        let reason = stderr_tail
            .annotate(format!("adapter exited during startup with {status}"))
            .await;
        return Err(AppError::Transport(reason));
    }

    info!(
        session_id,
        command = %config.command,
        pid = child.id(),
        "debug adapter spawned"
    );

    Ok(SpawnedAdapter {
        process: AdapterProcess {
            child,
            stderr_tail,
            stderr_task: Some(stderr_task),
        },
        stdin,
        stdout,
    })
}

/// Forward adapter stderr lines into `tail` until the stream closes.
#[must_use]
pub fn drain_stderr(session_id: String, stderr: ChildStderr, tail: StderrTail) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    debug!(session_id, line, "adapter stderr");
                    tail.push(line).await;
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(session_id, %err, "failed to read adapter stderr");
                    break;
                }
            }
        }
    })
}

// ── Termination ──────────────────────────────────────────────────────────────

/// Terminate `child`, escalating to a forced kill after `grace`.
///
/// On Unix the process first receives `SIGTERM`.
pub async fn terminate_child(
    session_id: &str,
    child: &mut Child,
    grace: Duration,
) -> Option<ExitStatus> {
    if let Ok(Some(status)) = child.try_wait() {
        return Some(status);
    }

    send_sigterm(session_id, child);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            info!(session_id, %status, "adapter exited gracefully");
            Some(status)
        }
        Ok(Err(err)) => {
            warn!(session_id, %err, "error waiting for adapter exit");
            None
        }
        Err(_elapsed) => {
            warn!(session_id, "adapter did not exit within grace period, forcing kill");
            if let Err(err) = child.kill().await {
                warn!(session_id, %err, "failed to force-kill adapter");
            }
            child.try_wait().ok().flatten()
        }
    }
}

#[cfg(unix)]
fn send_sigterm(session_id: &str, child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    if let Err(err) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        debug!(session_id, %err, "SIGTERM delivery failed");
    }
}

#[cfg(not(unix))]
fn send_sigterm(_session_id: &str, _child: &Child) {}
