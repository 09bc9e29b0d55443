//! Worker transport port.
//!
//! The controller never sees a process or a pipe. A launcher hands back a
//! pair of typed channels plus a handle that can terminate the worker:
//!
//! - `requests`: controller → worker envelopes
//! - `responses`: worker → controller envelopes; the channel closing means
//!   the worker is gone (clean exit or crash)

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{WorkerId, WorkerRequest, WorkerResponse};
use crate::services::worker::WorkerError;

/// Control handle for one running worker.
#[async_trait]
pub trait WorkerProcess: Send {
    /// OS process id, if the worker is a real process.
    fn pid(&self) -> Option<u32>;

    /// Wait up to `grace` for the worker to exit on its own, then force it.
    /// Always reaps; never fails.
    async fn terminate(&mut self, grace: Duration);
}

/// Channels and control handle for a freshly launched worker.
pub struct WorkerConnection {
    pub requests: mpsc::UnboundedSender<WorkerRequest>,
    pub responses: mpsc::UnboundedReceiver<WorkerResponse>,
    pub process: Box<dyn WorkerProcess>,
}

/// Starts workers on demand.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    /// Start the worker that will occupy `id`.
    async fn launch(&self, id: WorkerId) -> Result<WorkerConnection, WorkerError>;
}
