//! Host-independent core of the tessera compiler toolchain.
//!
//! The compiler reaches the host only through a [`CompilerSystem`], selected
//! once at start-up and passed explicitly to every component. Heavy work goes
//! to a [`WorkerController`]; optional dependencies are pulled in on demand by
//! the [`LazyModuleResolver`]; teardown runs through the [`DestroyRegistry`].
//!
//! Concrete hosts live in `tessera-runtime`.

#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod hash;
pub mod paths;
pub mod ports;
pub mod services;
pub mod settings;

pub use domain::{
    CopyDiagnostic, CopyDiagnosticLevel, CopyResults, CopyTask, FileStat, FsError, FsErrorKind,
    MkdirOptions, MkdirResult, RemoveResult, RenameResult, RmdirOptions, RuntimeKind,
    SystemDetails, TaskId, TaskOutcome, TaskRequest, Version, VersionError, VersionRange,
    WorkerId, WorkerRequest, WorkerResponse, WorkerResult, WorkerTask, WriteFileResult,
    encode_line,
};
pub use hash::{FULL_HASH_LENGTH, encode_to_base64, generate_content_hash};
pub use ports::{
    CompilerSystem, CoreError, InstallError, InstalledModule, ModuleLocator, PackageInstaller,
    WorkerConnection, WorkerLauncher, WorkerProcess,
};
pub use services::{
    DestroyHook, DestroyPhase, DestroyRegistry, DestroySummary, LazyError, LazyModuleResolver,
    ResolvedModule, TaskHandle, WorkerController, WorkerError, WorkerPoolConfig,
    WorkerPoolStats, copy_tasks, default_lazy_dependencies, destroy_hook,
};
pub use settings::{Settings, SettingsError, validate_settings};
