//! Worker pool controller.
//!
//! Owns a fixed number of worker slots and a FIFO queue of submitted tasks.
//! Tasks go to the least-loaded live worker that still has capacity; the
//! rest wait in the queue. Each submission gets a `TaskHandle` that resolves
//! exactly once with the result correlated by `TaskId`.
//!
//! A worker whose response channel closes is retired: only the tasks it was
//! holding fail with `WorkerCrashed`, and the slot is refilled the next time
//! queued work needs it.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::future::{BoxFuture, join_all};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use super::config::WorkerPoolConfig;
use super::error::WorkerError;
use crate::domain::{
    TaskId, TaskOutcome, TaskRequest, WorkerId, WorkerRequest, WorkerResponse, WorkerResult,
    WorkerTask,
};
use crate::ports::{CompilerSystem, WorkerLauncher, WorkerProcess};
use crate::services::destroy::{DestroyHook, destroy_hook};

type Reply = oneshot::Sender<Result<Value, WorkerError>>;

/// Point-in-time view of the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerPoolStats {
    /// Workers currently live.
    pub workers: usize,
    /// Tasks dispatched and not yet answered.
    pub in_flight: usize,
    /// Tasks waiting for capacity.
    pub queued: usize,
    /// Tasks answered by a worker (success or failure).
    pub completed: u64,
    /// Workers that exited while the pool was running.
    pub crashed: u64,
}

struct LiveWorker {
    id: WorkerId,
    requests: mpsc::UnboundedSender<WorkerRequest>,
    in_flight: usize,
    accepting: bool,
    process: Option<Box<dyn WorkerProcess>>,
}

enum Slot {
    Empty,
    Spawning,
    Live(LiveWorker),
}

struct Queued {
    task: WorkerTask,
    reply: Reply,
}

struct Pending {
    worker: WorkerId,
    reply: Reply,
}

struct PoolState {
    slots: Vec<Slot>,
    generations: Vec<u32>,
    queue: VecDeque<Queued>,
    pending: HashMap<TaskId, Pending>,
    closed: bool,
    completed: u64,
    crashed: u64,
}

impl PoolState {
    fn new(size: usize) -> Self {
        Self {
            slots: (0..size).map(|_| Slot::Empty).collect(),
            generations: vec![0; size],
            queue: VecDeque::new(),
            pending: HashMap::new(),
            closed: false,
            completed: 0,
            crashed: 0,
        }
    }

    /// Mark `slot` as spawning and hand out the id its worker will carry.
    fn claim(&mut self, slot: usize) -> WorkerId {
        let generation = self.generations[slot];
        self.generations[slot] = generation.wrapping_add(1);
        self.slots[slot] = Slot::Spawning;
        WorkerId { slot, generation }
    }

    fn claim_empty(&mut self) -> Option<WorkerId> {
        let slot = self
            .slots
            .iter()
            .position(|slot| matches!(slot, Slot::Empty))?;
        Some(self.claim(slot))
    }

    fn has_workers(&self) -> bool {
        self.slots
            .iter()
            .any(|slot| !matches!(slot, Slot::Empty))
    }

    fn wants_spawn(&self) -> bool {
        !self.closed
            && !self.queue.is_empty()
            && self.slots.iter().any(|slot| matches!(slot, Slot::Empty))
    }

    /// Move queued tasks onto workers with spare capacity.
    fn assign(&mut self, cap: usize) {
        while let Some(queued) = self.queue.pop_front() {
            if queued.reply.is_closed() {
                trace!(task = %queued.task.id, "Dropping cancelled task");
                continue;
            }

            let Some(worker) = least_loaded(&mut self.slots, cap) else {
                self.queue.push_front(queued);
                return;
            };

            let task_id = queued.task.id;
            match worker.requests.send(WorkerRequest::Task(queued.task)) {
                Ok(()) => {
                    worker.in_flight += 1;
                    trace!(task = %task_id, worker = %worker.id, "Task dispatched");
                    self.pending.insert(
                        task_id,
                        Pending {
                            worker: worker.id,
                            reply: queued.reply,
                        },
                    );
                }
                Err(mpsc::error::SendError(message)) => {
                    // Worker is going away; its reader will retire the slot.
                    worker.accepting = false;
                    if let WorkerRequest::Task(task) = message {
                        self.queue.push_front(Queued {
                            task,
                            reply: queued.reply,
                        });
                    }
                }
            }
        }
    }

    fn fail_queue(&mut self, error: &WorkerError) {
        for queued in self.queue.drain(..) {
            let _ = queued.reply.send(Err(error.clone()));
        }
    }
}

fn least_loaded(slots: &mut [Slot], cap: usize) -> Option<&mut LiveWorker> {
    slots
        .iter_mut()
        .filter_map(|slot| match slot {
            Slot::Live(worker) if worker.accepting && worker.in_flight < cap => Some(worker),
            _ => None,
        })
        .min_by_key(|worker| worker.in_flight)
}

struct Inner {
    launcher: Arc<dyn WorkerLauncher>,
    config: WorkerPoolConfig,
    state: Mutex<PoolState>,
    next_task: AtomicU64,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve one task from a worker's answer. Returns whether queued work
    /// still needs a fresh worker.
    fn complete(&self, worker: WorkerId, result: WorkerResult) -> bool {
        let mut state = self.lock();
        match state.pending.get(&result.id) {
            None => {
                warn!(task = %result.id, worker = %worker, "Result for unknown task");
                return false;
            }
            Some(pending) if pending.worker != worker => {
                warn!(
                    task = %result.id,
                    worker = %worker,
                    owner = %pending.worker,
                    "Result from a worker that does not hold the task"
                );
                return false;
            }
            Some(_) => {}
        }
        let Some(pending) = state.pending.remove(&result.id) else {
            return false;
        };

        if let Some(Slot::Live(live)) = state.slots.get_mut(pending.worker.slot)
            && live.id == pending.worker
        {
            live.in_flight = live.in_flight.saturating_sub(1);
        }
        state.completed += 1;

        let outcome = match result.outcome {
            TaskOutcome::Success { value } => Ok(value),
            TaskOutcome::Failure { message } => Err(WorkerError::TaskFailed {
                task: result.id,
                message,
            }),
        };
        if pending.reply.send(outcome).is_err() {
            trace!(task = %result.id, "Submitter gone; result discarded");
        }

        state.assign(self.config.max_tasks_per_worker);
        state.wants_spawn()
    }
}

/// Completion handle for one submitted task.
///
/// Dropping it before the task is dispatched cancels the task; dropping it
/// afterwards discards the result.
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    kind: String,
    rx: oneshot::Receiver<Result<Value, WorkerError>>,
}

impl TaskHandle {
    pub const fn id(&self) -> TaskId {
        self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }
}

impl Future for TaskHandle {
    type Output = Result<Value, WorkerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(WorkerError::ControllerClosed)))
    }
}

/// Handle to a worker pool. Clones share the same pool.
#[derive(Clone)]
pub struct WorkerController {
    inner: Arc<Inner>,
}

impl WorkerController {
    /// Launch every worker slot up front.
    ///
    /// Fails with `SpawnFailed` only if no worker starts at all; slots that
    /// fail to start are retried when work needs them.
    pub async fn start(
        launcher: Arc<dyn WorkerLauncher>,
        config: WorkerPoolConfig,
    ) -> Result<Self, WorkerError> {
        let inner = Arc::new(Inner {
            launcher,
            config,
            state: Mutex::new(PoolState::new(config.size)),
            next_task: AtomicU64::new(1),
        });

        let ids: Vec<WorkerId> = {
            let mut state = inner.lock();
            (0..config.size).map(|slot| state.claim(slot)).collect()
        };

        let results = join_all(ids.iter().map(|id| spawn_into(Arc::clone(&inner), *id))).await;

        let mut started = 0;
        let mut last_error = None;
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(()) => started += 1,
                Err(e) => {
                    warn!(worker = %id, error = %e, "Worker failed to start");
                    inner.lock().slots[id.slot] = Slot::Empty;
                    last_error = Some(e);
                }
            }
        }

        if started == 0 {
            return Err(last_error.unwrap_or_else(|| WorkerError::spawn_failed("no worker slots")));
        }
        if started < config.size {
            warn!(
                started,
                requested = config.size,
                "Worker pool started below requested size"
            );
        }

        info!(
            workers = started,
            max_tasks_per_worker = config.max_tasks_per_worker,
            capacity = config.capacity(),
            "Worker pool started"
        );
        Ok(Self { inner })
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.inner.config
    }

    /// Queue a task and return its completion handle without waiting.
    pub async fn dispatch(&self, request: TaskRequest) -> Result<TaskHandle, WorkerError> {
        let id = TaskId(self.inner.next_task.fetch_add(1, Ordering::Relaxed));
        let kind = request.kind.clone();
        let (reply, rx) = oneshot::channel();

        {
            let mut state = self.inner.lock();
            if state.closed {
                return Err(WorkerError::ControllerClosed);
            }
            state.queue.push_back(Queued {
                task: WorkerTask::from_request(id, request),
                reply,
            });
        }

        pump(&self.inner).await;
        Ok(TaskHandle { id, kind, rx })
    }

    /// Run a task and wait for its result.
    pub async fn submit(&self, request: TaskRequest) -> Result<Value, WorkerError> {
        self.dispatch(request).await?.await
    }

    /// Like `submit`, but gives up after `timeout`. The worker is not
    /// interrupted; its eventual answer is dropped.
    pub async fn submit_with_timeout(
        &self,
        request: TaskRequest,
        timeout: Duration,
    ) -> Result<Value, WorkerError> {
        let handle = self.dispatch(request).await?;
        let task = handle.id();
        let kind = handle.kind().to_string();

        match tokio::time::timeout(timeout, handle).await {
            Ok(result) => result,
            Err(_) => {
                debug!(task = %task, kind = %kind, "Task timed out");
                Err(WorkerError::Timeout {
                    task,
                    kind,
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }

    pub fn stats(&self) -> WorkerPoolStats {
        let state = self.inner.lock();
        WorkerPoolStats {
            workers: state
                .slots
                .iter()
                .filter(|slot| matches!(slot, Slot::Live(_)))
                .count(),
            in_flight: state.pending.len(),
            queued: state.queue.len(),
            completed: state.completed,
            crashed: state.crashed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Stop the pool.
    ///
    /// Queued tasks fail with `ControllerClosed` immediately. Workers are
    /// asked to exit and get `grace` to finish what they hold before being
    /// terminated; anything still unanswered then fails too. Calling this
    /// again is a no-op.
    pub async fn shutdown(&self, grace: Duration) {
        let workers: Vec<LiveWorker> = {
            let mut state = self.inner.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.fail_queue(&WorkerError::ControllerClosed);

            state
                .slots
                .iter_mut()
                .filter_map(|slot| match std::mem::replace(slot, Slot::Empty) {
                    Slot::Live(worker) => Some(worker),
                    other => {
                        *slot = other;
                        None
                    }
                })
                .collect()
        };

        info!(workers = workers.len(), ?grace, "Shutting down worker pool");

        join_all(workers.into_iter().map(|mut worker| async move {
            let _ = worker.requests.send(WorkerRequest::Exit);
            if let Some(mut process) = worker.process.take() {
                process.terminate(grace).await;
            }
            debug!(worker = %worker.id, "Worker stopped");
        }))
        .await;

        let leftover: Vec<Pending> = {
            let mut state = self.inner.lock();
            state.pending.drain().map(|(_, pending)| pending).collect()
        };
        if !leftover.is_empty() {
            warn!(tasks = leftover.len(), "Tasks unanswered at shutdown");
        }
        for pending in leftover {
            let _ = pending.reply.send(Err(WorkerError::ControllerClosed));
        }
    }

    /// Register `shutdown(grace_period)` as a destroy hook on `system`.
    pub fn register_destroy(&self, system: &dyn CompilerSystem) -> DestroyHook {
        let controller = self.clone();
        let grace = self.inner.config.grace_period;
        let hook = destroy_hook(move || {
            let controller = controller.clone();
            async move {
                controller.shutdown(grace).await;
                Ok(())
            }
        });
        system.add_destroy(Arc::clone(&hook));
        hook
    }
}

/// Assign queued work, growing the pool into empty slots while the queue
/// is not drained.
async fn pump(inner: &Arc<Inner>) {
    loop {
        let id = {
            let mut state = inner.lock();
            state.assign(inner.config.max_tasks_per_worker);
            if !state.wants_spawn() {
                return;
            }
            match state.claim_empty() {
                Some(id) => id,
                None => return,
            }
        };

        // The claimed slot must leave `Spawning` even if this caller is
        // cancelled, so the launch runs on its own task.
        match tokio::spawn(fill_slot(Arc::clone(inner), id)).await {
            Ok(true) => {}
            Ok(false) | Err(_) => return,
        }
    }
}

/// Launch into a claimed slot. On success queued work is handed to the new
/// worker; on failure the slot is released. Returns whether it started.
async fn fill_slot(inner: Arc<Inner>, id: WorkerId) -> bool {
    let result = spawn_into(Arc::clone(&inner), id).await;

    let mut state = inner.lock();
    match result {
        Ok(()) => {
            state.assign(inner.config.max_tasks_per_worker);
            true
        }
        Err(e) => {
            if let Some(slot) = state.slots.get_mut(id.slot)
                && matches!(slot, Slot::Spawning)
            {
                *slot = Slot::Empty;
            }
            if !state.closed {
                warn!(worker = %id, error = %e, "Replacement worker failed to start");
                if !state.has_workers() {
                    state.fail_queue(&e);
                }
            }
            false
        }
    }
}

/// Launch the worker for a claimed slot and start reading its responses.
///
/// Boxed because the reader it spawns can call back into `pump`.
fn spawn_into(inner: Arc<Inner>, id: WorkerId) -> BoxFuture<'static, Result<(), WorkerError>> {
    Box::pin(async move {
        let connection = inner.launcher.launch(id).await?;
        let pid = connection.process.pid();

        let mut process = {
            let mut state = inner.lock();
            if state.closed {
                Some(connection.process)
            } else {
                state.slots[id.slot] = Slot::Live(LiveWorker {
                    id,
                    requests: connection.requests.clone(),
                    in_flight: 0,
                    accepting: true,
                    process: Some(connection.process),
                });
                None
            }
        };

        if let Some(process) = process.as_mut() {
            let _ = connection.requests.send(WorkerRequest::Exit);
            process.terminate(Duration::ZERO).await;
            return Err(WorkerError::ControllerClosed);
        }

        debug!(worker = %id, ?pid, "Worker launched");
        tokio::spawn(read_responses(
            Arc::downgrade(&inner),
            id,
            connection.responses,
        ));
        Ok(())
    })
}

async fn read_responses(
    inner: Weak<Inner>,
    worker: WorkerId,
    mut responses: mpsc::UnboundedReceiver<WorkerResponse>,
) {
    while let Some(message) = responses.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        match message {
            WorkerResponse::Ready { pid } => debug!(worker = %worker, ?pid, "Worker ready"),
            WorkerResponse::Result(result) => {
                if inner.complete(worker, result) {
                    tokio::spawn(async move { pump(&inner).await });
                }
            }
        }
    }

    if let Some(inner) = inner.upgrade() {
        retire(&inner, worker).await;
    }
}

/// Clear the slot of a worker whose channel closed and fail what it held.
async fn retire(inner: &Arc<Inner>, worker: WorkerId) {
    let (process, orphaned, closed, refill) = {
        let mut state = inner.lock();

        let mut process = None;
        let mut was_live = false;
        if let Some(slot) = state.slots.get_mut(worker.slot)
            && matches!(slot, Slot::Live(live) if live.id == worker)
            && let Slot::Live(live) = std::mem::replace(slot, Slot::Empty)
        {
            process = live.process;
            was_live = true;
        }

        let ids: Vec<TaskId> = state
            .pending
            .iter()
            .filter(|(_, pending)| pending.worker == worker)
            .map(|(id, _)| *id)
            .collect();
        let orphaned: Vec<(TaskId, Pending)> = ids
            .into_iter()
            .filter_map(|id| state.pending.remove(&id).map(|pending| (id, pending)))
            .collect();

        let closed = state.closed;
        if was_live && !closed {
            state.crashed += 1;
        }
        (process, orphaned, closed, state.wants_spawn())
    };

    if !closed {
        warn!(
            worker = %worker,
            orphaned = orphaned.len(),
            "Worker exited unexpectedly"
        );
    }

    for (task, pending) in orphaned {
        let error = if closed {
            WorkerError::ControllerClosed
        } else {
            WorkerError::WorkerCrashed { worker, task }
        };
        let _ = pending.reply.send(Err(error));
    }

    if let Some(mut process) = process {
        process.terminate(Duration::ZERO).await;
    }

    if refill {
        pump(inner).await;
    }
}
