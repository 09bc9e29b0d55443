//! Worker launchers and the worker-side task loop.

mod child;
mod framing;
mod handlers;
mod in_process;
mod process_launcher;
mod shutdown;

pub use child::run_worker;
pub use handlers::{TaskHandler, TaskHandlerRegistry};
pub use in_process::InProcessWorkerLauncher;
pub use process_launcher::{ProcessWorkerLauncher, WORKER_ID_ENV};
pub use shutdown::shutdown_child;
