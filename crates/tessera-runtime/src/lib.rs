//! Host adapters for tessera.
//!
//! - [`system`]: the three `CompilerSystem` implementations
//! - [`worker`]: worker launchers and the worker-side task loop
//! - [`packages`]: `node_modules` lookup and npm-based acquisition

#![deny(unsafe_code)]

pub mod packages;
pub mod system;
pub mod worker;

pub use packages::{NodeModulesLocator, NpmInstaller};
pub use system::{
    InMemorySystem, ProcessHost, ProcessSystem, RUNTIME_NAME, SandboxPolicy, SandboxPolicyError,
    SandboxedSystem, host_details,
};
pub use worker::{
    InProcessWorkerLauncher, ProcessWorkerLauncher, TaskHandler, TaskHandlerRegistry,
    WORKER_ID_ENV, run_worker, shutdown_child,
};

#[cfg(test)]
use tokio_test as _;
