//! Workers as tokio tasks over in-memory pipes.
//!
//! Same framing and handlers as child-process workers, without the process.
//! Used by the in-memory host and by tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tessera_core::{WorkerConnection, WorkerError, WorkerId, WorkerLauncher, WorkerProcess};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, warn};

use super::child::run_worker;
use super::framing::{pump_requests, pump_responses};
use super::handlers::TaskHandlerRegistry;

const PIPE_CAPACITY: usize = 64 * 1024;

type RunningWorkers = Arc<Mutex<HashMap<WorkerId, AbortHandle>>>;

pub struct InProcessWorkerLauncher {
    registry: Arc<TaskHandlerRegistry>,
    /// Workers whose task has not finished. Each task removes itself on exit.
    running: RunningWorkers,
}

impl InProcessWorkerLauncher {
    pub fn new(registry: TaskHandlerRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Abort a worker as if its process had died. Returns `false` if no such
    /// worker is running.
    pub fn kill(&self, worker: WorkerId) -> bool {
        let handle = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&worker);
        match handle {
            Some(handle) => {
                debug!(worker = %worker, "Killing in-process worker");
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Ids of workers still running.
    pub fn workers(&self) -> Vec<WorkerId> {
        let mut ids: Vec<WorkerId> = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort();
        ids
    }
}

impl Default for InProcessWorkerLauncher {
    fn default() -> Self {
        Self::new(TaskHandlerRegistry::with_builtins())
    }
}

struct TaskWorker {
    handle: Option<JoinHandle<()>>,
}

#[async_trait]
impl WorkerProcess for TaskWorker {
    fn pid(&self) -> Option<u32> {
        None
    }

    async fn terminate(&mut self, grace: Duration) {
        if let Some(mut handle) = self.handle.take()
            && tokio::time::timeout(grace, &mut handle).await.is_err()
        {
            handle.abort();
        }
    }
}

#[async_trait]
impl WorkerLauncher for InProcessWorkerLauncher {
    async fn launch(&self, id: WorkerId) -> Result<WorkerConnection, WorkerError> {
        let (controller_end, worker_end) = tokio::io::duplex(PIPE_CAPACITY);
        let (worker_read, worker_write) = tokio::io::split(worker_end);
        let (controller_read, controller_write) = tokio::io::split(controller_end);

        let registry = Arc::clone(&self.registry);
        let running = Arc::clone(&self.running);
        // Held across spawn so the task cannot deregister before it is listed.
        let mut listed = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = tokio::spawn(async move {
            if let Err(e) = run_worker(worker_read, worker_write, registry).await {
                warn!(worker = %id, error = %e, "In-process worker failed");
            }
            running
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            debug!(worker = %id, "In-process worker exited");
        });
        listed.insert(id, handle.abort_handle());
        drop(listed);

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump_requests(id, controller_write, request_rx));
        tokio::spawn(pump_responses(id, controller_read, response_tx));

        Ok(WorkerConnection {
            requests: request_tx,
            responses: response_rx,
            process: Box::new(TaskWorker {
                handle: Some(handle),
            }),
        })
    }
}
