//! Subprocess seam for the recorder worker.
//!
//! The orchestrator never touches `tokio::process` directly; it spawns
//! through [`WorkerSpawner`] and controls the child through [`WorkerChild`],
//! so tests can substitute an in-process fake worker.

use crate::{RecorderError, Result};

use std::{
    panic::Location,
    path::PathBuf,
    process::Stdio,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use error_location::ErrorLocation;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Live worker subprocess handle.
#[async_trait]
pub trait WorkerChild: Send {
    /// Ask the worker to shut down gracefully (SIGTERM on unix) so it can
    /// flush its output and emit its finish event. Best-effort.
    fn terminate(&mut self);

    /// Force-kill the worker and reap it.
    async fn kill(&mut self) -> Result<()>;

    /// Wait for the worker to exit, returning its exit code if any.
    async fn wait(&mut self) -> Result<Option<i32>>;

    /// Last diagnostic line the worker produced, if the implementation
    /// captures any.
    fn diagnostic(&self) -> Option<String> {
        None
    }
}

/// Spawns the worker for one recording session.
#[async_trait]
pub trait WorkerSpawner: Send + Sync {
    /// Spawn `record --process-id <process_id> <options_json>`.
    async fn spawn(&self, process_id: &str, options_json: &str) -> Result<Box<dyn WorkerChild>>;
}

/// Production spawner running the worker binary via `tokio::process`.
pub struct CommandSpawner {
    program: PathBuf,
}

impl CommandSpawner {
    /// Spawner for the given worker binary.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl WorkerSpawner for CommandSpawner {
    async fn spawn(&self, process_id: &str, options_json: &str) -> Result<Box<dyn WorkerChild>> {
        let mut child = Command::new(&self.program)
            .arg("record")
            .arg("--process-id")
            .arg(process_id)
            .arg(options_json)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RecorderError::WorkerProcess {
                reason: format!("failed to spawn {}: {e}", self.program.display()),
                location: ErrorLocation::from(Location::caller()),
            })?;

        info!(
            program = %self.program.display(),
            process_id,
            pid = child.id(),
            "Worker spawned"
        );

        let last_stderr = Arc::new(Mutex::new(None));
        if let Some(stdout) = child.stdout.take() {
            drain_lines(stdout, None);
        }
        if let Some(stderr) = child.stderr.take() {
            drain_lines(stderr, Some(Arc::clone(&last_stderr)));
        }

        Ok(Box::new(CommandChild { child, last_stderr }))
    }
}

/// Forward child output into tracing, optionally remembering the last line
/// as a crash diagnostic.
fn drain_lines(stream: impl AsyncRead + Unpin + Send + 'static, keep: Option<Arc<Mutex<Option<String>>>>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(worker = %line, "Worker output");
            if let Some(keep) = &keep {
                if !line.trim().is_empty() {
                    if let Ok(mut guard) = keep.lock() {
                        *guard = Some(line);
                    }
                }
            }
        }
    });
}

struct CommandChild {
    child: tokio::process::Child,
    last_stderr: Arc<Mutex<Option<String>>>,
}

#[async_trait]
impl WorkerChild for CommandChild {
    fn terminate(&mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!(pid, error = %e, "Failed to signal worker");
            }
        }
        #[cfg(not(unix))]
        {
            // No graceful signal available; the subsequent wait/kill reaps it.
            let _ = self.child.start_kill();
        }
    }

    async fn kill(&mut self) -> Result<()> {
        self.child.kill().await?;
        Ok(())
    }

    async fn wait(&mut self) -> Result<Option<i32>> {
        let status = self.child.wait().await?;
        Ok(status.code())
    }

    fn diagnostic(&self) -> Option<String> {
        self.last_stderr.lock().ok().and_then(|guard| guard.clone())
    }
}
