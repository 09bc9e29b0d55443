//! Services built on the ports.

pub mod copy;
pub mod destroy;
pub mod lazy_resolver;
pub mod worker;

pub use copy::copy_tasks;
pub use destroy::{DestroyHook, DestroyPhase, DestroyRegistry, DestroySummary, destroy_hook};
pub use lazy_resolver::{
    LazyError, LazyModuleResolver, ResolvedModule, default_lazy_dependencies,
};
pub use worker::{TaskHandle, WorkerController, WorkerError, WorkerPoolConfig, WorkerPoolStats};
