//! Port definitions (trait abstractions) for host-facing concerns.
//!
//! Ports define the interfaces that the core expects from a host runtime.
//! Implementations live in `tessera-runtime`.
//!
//! # Design Rules
//!
//! - No `std::fs`, `tokio::fs` or `std::process` in any signature
//! - Failures that are part of normal operation are values, not errors
//! - Everything is `Send + Sync` so one instance can be shared via `Arc`

pub mod packages;
pub mod system;
pub mod worker_launcher;

use thiserror::Error;

use crate::domain::{FsError, VersionError};
use crate::services::lazy_resolver::LazyError;
use crate::services::worker::WorkerError;

pub use packages::{InstallError, InstalledModule, ModuleLocator, PackageInstaller};
pub use system::CompilerSystem;
pub use worker_launcher::{WorkerConnection, WorkerLauncher, WorkerProcess};

#[cfg(test)]
pub use packages::{MockModuleLocator, MockPackageInstaller};

/// Core error type for failures that reach a caller.
///
/// Filesystem failures stay values inside the capability set; they become
/// a `CoreError` only when a caller decides absence is fatal. Adapters map
/// this to their own surface (CLI exit codes).
#[derive(Debug, Error)]
pub enum CoreError {
    /// A filesystem operation the caller depends on failed.
    #[error("{operation} {path}: {source}")]
    Fs {
        operation: &'static str,
        path: String,
        #[source]
        source: FsError,
    },

    /// A lazy dependency could not be resolved.
    #[error(transparent)]
    Lazy(#[from] LazyError),

    /// Worker pool failure.
    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// Settings validation error.
    #[error(transparent)]
    Settings(#[from] crate::settings::SettingsError),

    /// Malformed version string or range.
    #[error(transparent)]
    Version(#[from] VersionError),

    /// Validation error (invalid input).
    #[error("Validation error: {0}")]
    Validation(String),
}

impl CoreError {
    pub fn fs(operation: &'static str, path: impl Into<String>, source: FsError) -> Self {
        Self::Fs {
            operation,
            path: path.into(),
            source,
        }
    }
}
