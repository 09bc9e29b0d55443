//! Worker task envelopes.
//!
//! These types cross the process boundary between the controller and its
//! workers as newline-delimited JSON. Each request carries a correlation id
//! assigned by the controller; the worker echoes it in the matching result.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Controller-assigned correlation id, unique per controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Slot index of a worker inside a pool. Replacements reuse the slot but
/// get a new generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId {
    pub slot: usize,
    pub generation: u32,
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}.{}", self.slot, self.generation)
    }
}

/// What a caller asks the pool to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Handler name on the worker side (e.g. `"transpileModule"`).
    pub kind: String,
    /// Opaque handler input.
    pub payload: Value,
}

impl TaskRequest {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

/// A task as dispatched to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerTask {
    pub id: TaskId,
    pub kind: String,
    pub payload: Value,
}

impl WorkerTask {
    pub fn from_request(id: TaskId, request: TaskRequest) -> Self {
        Self {
            id,
            kind: request.kind,
            payload: request.payload,
        }
    }
}

/// Outcome of running one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum TaskOutcome {
    Success { value: Value },
    Failure { message: String },
}

/// A worker's answer to exactly one `WorkerTask`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResult {
    pub id: TaskId,
    pub outcome: TaskOutcome,
}

impl WorkerResult {
    pub const fn success(id: TaskId, value: Value) -> Self {
        Self {
            id,
            outcome: TaskOutcome::Success { value },
        }
    }

    pub fn failure(id: TaskId, message: impl Into<String>) -> Self {
        Self {
            id,
            outcome: TaskOutcome::Failure {
                message: message.into(),
            },
        }
    }
}

/// Controller → worker message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerRequest {
    /// Run a task.
    Task(WorkerTask),
    /// Finish in-flight tasks and exit.
    Exit,
}

/// Worker → controller message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerResponse {
    /// Sent once after start-up.
    Ready { pid: Option<u32> },
    /// Result of a previously dispatched task.
    Result(WorkerResult),
}

/// Encode a message as one line of JSON including the trailing newline.
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(message).map(|mut line| {
        line.push('\n');
        line
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_request_wire_shape() {
        let task = WorkerTask::from_request(
            TaskId(7),
            TaskRequest::new("contentHash", json!({"content": "abc"})),
        );
        let line = encode_line(&WorkerRequest::Task(task)).unwrap();
        assert!(line.ends_with('\n'));
        let value: Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(value["type"], "task");
        assert_eq!(value["id"], 7);
        assert_eq!(value["kind"], "contentHash");
    }

    #[test]
    fn test_exit_wire_shape() {
        let line = encode_line(&WorkerRequest::Exit).unwrap();
        assert_eq!(line, "{\"type\":\"exit\"}\n");
    }

    #[test]
    fn test_response_parsing() {
        let ready: WorkerResponse = serde_json::from_str(r#"{"type":"ready","pid":42}"#).unwrap();
        assert_eq!(ready, WorkerResponse::Ready { pid: Some(42) });

        let result: WorkerResponse = serde_json::from_str(
            r#"{"type":"result","id":3,"outcome":{"status":"failure","message":"boom"}}"#,
        )
        .unwrap();
        assert_eq!(
            result,
            WorkerResponse::Result(WorkerResult::failure(TaskId(3), "boom"))
        );
    }

    #[test]
    fn test_display_ids() {
        assert_eq!(TaskId(9).to_string(), "task-9");
        let id = WorkerId {
            slot: 2,
            generation: 1,
        };
        assert_eq!(id.to_string(), "worker-2.1");
    }
}
