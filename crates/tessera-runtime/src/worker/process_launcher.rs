//! Workers as child processes speaking JSON lines over stdio.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tessera_core::{WorkerConnection, WorkerError, WorkerId, WorkerLauncher, WorkerProcess};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::framing::{pump_requests, pump_responses};
use super::shutdown::shutdown_child;

/// Environment variable carrying the worker id into the child.
pub const WORKER_ID_ENV: &str = "TESSERA_WORKER_ID";

/// Launches `<program> worker` children.
#[derive(Debug, Clone)]
pub struct ProcessWorkerLauncher {
    program: PathBuf,
    args: Vec<String>,
    worker_name: String,
}

impl ProcessWorkerLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: vec!["worker".to_string()],
            worker_name: tessera_core::settings::DEFAULT_WORKER_NAME.to_string(),
        }
    }

    /// Re-run the current executable in worker mode.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    /// Replace the arguments passed to the child.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

/// Forward a worker's stderr into tracing.
fn spawn_stderr_reader(worker: WorkerId, name: String, stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(text)) = lines.next_line().await {
            debug!(worker = %worker, name = %name, "stderr: {}", text);
        }
    });
}

struct ChildWorker {
    worker: WorkerId,
    child: Child,
}

#[async_trait]
impl WorkerProcess for ChildWorker {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn terminate(&mut self, grace: Duration) {
        match shutdown_child(&mut self.child, grace).await {
            Ok(status) => debug!(worker = %self.worker, %status, "Worker reaped"),
            Err(e) => warn!(worker = %self.worker, error = %e, "Failed to reap worker"),
        }
    }
}

#[async_trait]
impl WorkerLauncher for ProcessWorkerLauncher {
    async fn launch(&self, id: WorkerId) -> Result<WorkerConnection, WorkerError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env(WORKER_ID_ENV, id.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            WorkerError::spawn_failed(format!("{}: {e}", self.program.display()))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| WorkerError::spawn_failed("worker stdin was not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WorkerError::spawn_failed("worker stdout was not captured"))?;
        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_reader(id, self.worker_name.clone(), stderr);
        }

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump_requests(id, stdin, request_rx));
        tokio::spawn(pump_responses(id, stdout, response_tx));

        debug!(worker = %id, pid = ?child.id(), program = %self.program.display(), "Worker process spawned");
        Ok(WorkerConnection {
            requests: request_tx,
            responses: response_rx,
            process: Box::new(ChildWorker { worker: id, child }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program_is_spawn_failure() {
        let launcher = ProcessWorkerLauncher::new("/nonexistent/tessera-worker");
        let result = launcher
            .launch(WorkerId {
                slot: 0,
                generation: 0,
            })
            .await;
        assert!(matches!(result, Err(WorkerError::SpawnFailed { .. })));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_exited_child_closes_responses() {
        // `true` ignores its input and exits; the controller must see the
        // response channel close.
        let launcher = ProcessWorkerLauncher::new("true").with_args(Vec::<String>::new());
        let mut connection = launcher
            .launch(WorkerId {
                slot: 0,
                generation: 0,
            })
            .await
            .unwrap();
        assert!(connection.responses.recv().await.is_none());
        connection.process.terminate(Duration::from_secs(1)).await;
    }
}
