//! Task handlers run inside a worker.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::Deserialize;
use serde_json::Value;
use tessera_core::{WorkerResult, WorkerTask, encode_to_base64, generate_content_hash};
use tracing::{trace, warn};

/// One kind of work a worker can perform.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Run the task. `Err` becomes a failure result for the submitter.
    async fn handle(&self, payload: Value) -> Result<Value, String>;
}

/// Handlers by task kind.
#[derive(Clone, Default)]
pub struct TaskHandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl TaskHandlerRegistry {
    /// A registry with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// `ping`, `contentHash` and `base64`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("ping", PingHandler);
        registry.register("contentHash", ContentHashHandler);
        registry.register("base64", Base64Handler);
        registry
    }

    /// Add or replace the handler for `kind`.
    pub fn register(&mut self, kind: impl Into<String>, handler: impl TaskHandler + 'static) {
        self.handlers.insert(kind.into(), Arc::new(handler));
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Run `task` and produce its result. Panicking handlers fail the task
    /// instead of the worker.
    pub async fn run(&self, task: WorkerTask) -> WorkerResult {
        let Some(handler) = self.handlers.get(&task.kind).cloned() else {
            warn!(kind = %task.kind, "Unknown task kind");
            return WorkerResult::failure(task.id, format!("unknown task kind: {}", task.kind));
        };

        trace!(task = %task.id, kind = %task.kind, "Running task");
        match AssertUnwindSafe(handler.handle(task.payload))
            .catch_unwind()
            .await
        {
            Ok(Ok(value)) => WorkerResult::success(task.id, value),
            Ok(Err(message)) => WorkerResult::failure(task.id, message),
            Err(_) => WorkerResult::failure(task.id, format!("{} handler panicked", task.kind)),
        }
    }
}

/// Echoes its payload.
struct PingHandler;

#[async_trait]
impl TaskHandler for PingHandler {
    async fn handle(&self, payload: Value) -> Result<Value, String> {
        Ok(payload)
    }
}

#[derive(Deserialize)]
struct ContentHashInput {
    content: String,
    #[serde(default)]
    length: Option<usize>,
}

/// `{content, length?}` to a hex digest.
struct ContentHashHandler;

#[async_trait]
impl TaskHandler for ContentHashHandler {
    async fn handle(&self, payload: Value) -> Result<Value, String> {
        let input: ContentHashInput =
            serde_json::from_value(payload).map_err(|e| format!("invalid contentHash payload: {e}"))?;
        Ok(Value::String(generate_content_hash(
            input.content.as_bytes(),
            input.length,
        )))
    }
}

#[derive(Deserialize)]
struct Base64Input {
    content: String,
}

struct Base64Handler;

#[async_trait]
impl TaskHandler for Base64Handler {
    async fn handle(&self, payload: Value) -> Result<Value, String> {
        let input: Base64Input =
            serde_json::from_value(payload).map_err(|e| format!("invalid base64 payload: {e}"))?;
        Ok(Value::String(encode_to_base64(&input.content)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tessera_core::{TaskId, TaskOutcome};

    fn task(kind: &str, payload: Value) -> WorkerTask {
        WorkerTask {
            id: TaskId(1),
            kind: kind.to_string(),
            payload,
        }
    }

    #[tokio::test]
    async fn test_builtins() {
        let registry = TaskHandlerRegistry::with_builtins();
        assert_eq!(registry.kinds(), vec!["base64", "contentHash", "ping"]);

        let result = registry.run(task("ping", json!({"x": 1}))).await;
        assert_eq!(result, WorkerResult::success(TaskId(1), json!({"x": 1})));

        let result = registry
            .run(task("contentHash", json!({"content": "hello", "length": 8})))
            .await;
        assert_eq!(result, WorkerResult::success(TaskId(1), json!("2cf24dba")));

        let result = registry.run(task("base64", json!({"content": "hi"}))).await;
        assert_eq!(result, WorkerResult::success(TaskId(1), json!("aGk=")));
    }

    #[tokio::test]
    async fn test_unknown_kind_and_bad_payload_fail() {
        let registry = TaskHandlerRegistry::with_builtins();

        let result = registry.run(task("transpile", Value::Null)).await;
        assert_eq!(
            result.outcome,
            TaskOutcome::Failure {
                message: "unknown task kind: transpile".to_string()
            }
        );

        let result = registry.run(task("contentHash", json!({"length": 3}))).await;
        assert!(matches!(result.outcome, TaskOutcome::Failure { .. }));
    }

    #[tokio::test]
    async fn test_panicking_handler_fails_task() {
        struct Boom;

        #[async_trait]
        impl TaskHandler for Boom {
            async fn handle(&self, _payload: Value) -> Result<Value, String> {
                panic!("boom");
            }
        }

        let mut registry = TaskHandlerRegistry::new();
        registry.register("boom", Boom);
        let result = registry.run(task("boom", Value::Null)).await;
        assert!(matches!(result.outcome, TaskOutcome::Failure { ref message } if message.contains("panicked")));
    }
}
