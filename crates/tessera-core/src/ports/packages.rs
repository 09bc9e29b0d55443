//! Ports used by the lazy module resolver.
//!
//! Locating an installed package and acquiring a new one are host concerns:
//! the runtime crate reads `node_modules` through the `CompilerSystem` and
//! shells out to a package manager. The resolver only sees these traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Version, VersionRange};

/// An installed, importable package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledModule {
    /// Package name as declared.
    pub name: String,
    /// Version read from the package manifest.
    pub version: Version,
    /// Directory the package lives in.
    pub path: String,
}

/// Failure reported by a package manager.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct InstallError {
    pub message: String,
}

impl InstallError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Finds an already-installed package.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModuleLocator: Send + Sync {
    /// The installed package named `name`, if importable.
    async fn locate(&self, name: &str) -> Option<InstalledModule>;
}

/// Acquires a package version within a range.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    /// Install some version of `name` inside `range` and return it.
    async fn install(&self, name: &str, range: &VersionRange) -> Result<Version, InstallError>;
}
