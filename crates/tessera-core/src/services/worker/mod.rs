//! Worker pool: sizing, dispatch and failure isolation.

pub mod config;
pub mod controller;
pub mod error;

pub use config::{WORKER_MEMORY_BUDGET, WorkerPoolConfig};
pub use controller::{TaskHandle, WorkerController, WorkerPoolStats};
pub use error::WorkerError;
