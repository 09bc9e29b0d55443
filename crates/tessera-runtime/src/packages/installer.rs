//! Package acquisition through npm.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tessera_core::{InstallError, ModuleLocator, PackageInstaller, Version, VersionRange};
use tokio::process::Command;
use tracing::{debug, info};

use super::locator::NodeModulesLocator;

/// Last bytes of npm's stderr carried into an `InstallError`.
const STDERR_TAIL: usize = 2048;

/// Runs `npm install --no-save <name>@<range>` in the locator's root, then
/// reads back the version npm chose.
pub struct NpmInstaller {
    program: PathBuf,
    locator: NodeModulesLocator,
}

impl NpmInstaller {
    pub fn new(locator: NodeModulesLocator) -> Self {
        Self {
            program: PathBuf::from("npm"),
            locator,
        }
    }

    /// Use a different package manager binary.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

fn tail(text: &str) -> &str {
    let trimmed = text.trim();
    let mut start = trimmed.len().saturating_sub(STDERR_TAIL);
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    &trimmed[start..]
}

#[async_trait]
impl PackageInstaller for NpmInstaller {
    async fn install(&self, name: &str, range: &VersionRange) -> Result<Version, InstallError> {
        let target = format!("{name}@{}", range.to_npm_range());
        info!(package = %target, program = %self.program.display(), "Installing package");

        let output = Command::new(&self.program)
            .args(["install", "--no-save", &target])
            .current_dir(self.locator.root())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| InstallError::new(format!("{}: {e}", self.program.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InstallError::new(format!(
                "`{} install {target}` exited with {}: {}",
                self.program.display(),
                output.status,
                tail(&stderr)
            )));
        }
        debug!(package = %target, "Package manager finished");

        self.locator
            .locate(name)
            .await
            .map(|module| module.version)
            .ok_or_else(|| {
                InstallError::new(format!("{name} is missing after a successful install"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{ProcessHost, ProcessSystem};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn installer(dir: &TempDir, program: &str) -> NpmInstaller {
        let system = Arc::new(ProcessSystem::new(ProcessHost::at(dir.path())));
        NpmInstaller::new(NodeModulesLocator::new(system, ".")).with_program(program)
    }

    #[test]
    fn test_tail_keeps_end() {
        let long = "x".repeat(STDERR_TAIL + 10) + "end";
        assert!(tail(&long).ends_with("end"));
        assert_eq!(tail(&long).len(), STDERR_TAIL);
    }

    #[tokio::test]
    async fn test_missing_program_is_install_error() {
        let dir = TempDir::new().unwrap();
        let range = VersionRange::parse("1.0.0", "2.0.0").unwrap();
        let err = installer(&dir, "/nonexistent/npm")
            .install("jest", &range)
            .await
            .unwrap_err();
        assert!(err.message.contains("/nonexistent/npm"));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_failed_install_reports_status() {
        let dir = TempDir::new().unwrap();
        let range = VersionRange::parse("1.0.0", "2.0.0").unwrap();
        let err = installer(&dir, "false")
            .install("jest", &range)
            .await
            .unwrap_err();
        assert!(err.message.contains("exited with"));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_success_without_package_is_error() {
        let dir = TempDir::new().unwrap();
        let range = VersionRange::parse("1.0.0", "2.0.0").unwrap();
        let err = installer(&dir, "true")
            .install("jest", &range)
            .await
            .unwrap_err();
        assert!(err.message.contains("missing after a successful install"));
    }
}
