//! Worker dispatch errors.

use thiserror::Error;

use crate::domain::{TaskId, WorkerId};

/// Errors surfaced to the submitter of a worker task.
///
/// The controller never retries on its own; retry policy belongs to the
/// caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkerError {
    /// The worker holding the task exited before answering.
    #[error("Worker {worker} crashed while running {task}")]
    WorkerCrashed { worker: WorkerId, task: TaskId },

    /// Caller-side deadline elapsed; a late result is discarded.
    #[error("Task {task} ({kind}) timed out after {timeout_ms}ms")]
    Timeout {
        task: TaskId,
        kind: String,
        timeout_ms: u64,
    },

    /// No worker could be started.
    #[error("Failed to spawn worker: {reason}")]
    SpawnFailed { reason: String },

    /// The controller was shut down before the task completed.
    #[error("Worker controller is shut down")]
    ControllerClosed,

    /// The worker ran the task and reported a failure.
    #[error("Task {task} failed: {message}")]
    TaskFailed { task: TaskId, message: String },

    /// Framing or serialization failure on the worker channel.
    #[error("Worker transport error: {0}")]
    Transport(String),
}

impl WorkerError {
    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            reason: reason.into(),
        }
    }
}
