//! Host snapshot taken when a `CompilerSystem` is constructed.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Which host adapter backs a `CompilerSystem`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeKind {
    /// Native process with unrestricted filesystem and process access.
    Process,
    /// Process whose filesystem access is limited by an explicit policy.
    Sandboxed,
    /// Fully in-memory host used by tests.
    InMemory,
}

impl RuntimeKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Process => "process",
            Self::Sandboxed => "sandboxed",
            Self::InMemory => "in-memory",
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live free-memory query, re-evaluated on every call.
pub type FreeMemorySource = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Immutable description of the host.
///
/// Everything except `free_memory()` is captured once at construction.
/// Free memory is re-queried because it informs worker-pool sizing.
#[derive(Clone)]
pub struct SystemDetails {
    /// CPU brand string, empty if the host could not report it.
    pub cpu_model: String,
    /// Logical CPU count, at least 1.
    pub cpus: usize,
    /// OS / platform name (e.g. "linux", "macos").
    pub platform: String,
    /// OS release string.
    pub release: String,
    /// Runtime name.
    pub runtime: String,
    /// Runtime version.
    pub runtime_version: String,
    /// Temporary directory, forward-slash normalized.
    pub tmp_dir: String,
    /// Total physical memory in bytes.
    pub total_memory: u64,
    free_memory: FreeMemorySource,
}

impl SystemDetails {
    /// Build a snapshot with the given live free-memory source.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cpu_model: impl Into<String>,
        cpus: usize,
        platform: impl Into<String>,
        release: impl Into<String>,
        runtime: impl Into<String>,
        runtime_version: impl Into<String>,
        tmp_dir: impl Into<String>,
        total_memory: u64,
        free_memory: FreeMemorySource,
    ) -> Self {
        Self {
            cpu_model: cpu_model.into(),
            cpus: cpus.max(1),
            platform: platform.into(),
            release: release.into(),
            runtime: runtime.into(),
            runtime_version: runtime_version.into(),
            tmp_dir: tmp_dir.into(),
            total_memory,
            free_memory,
        }
    }

    /// Fixed snapshot for hosts without real hardware information.
    pub fn fixed(cpus: usize, total_memory: u64, free_memory: u64) -> Self {
        Self::new(
            "virtual",
            cpus,
            "virtual",
            "",
            "in-memory",
            env!("CARGO_PKG_VERSION"),
            "/tmp",
            total_memory,
            Arc::new(move || free_memory),
        )
    }

    /// Currently free physical memory in bytes.
    pub fn free_memory(&self) -> u64 {
        (self.free_memory)()
    }
}

impl fmt::Debug for SystemDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemDetails")
            .field("cpu_model", &self.cpu_model)
            .field("cpus", &self.cpus)
            .field("platform", &self.platform)
            .field("release", &self.release)
            .field("runtime", &self.runtime)
            .field("runtime_version", &self.runtime_version)
            .field("tmp_dir", &self.tmp_dir)
            .field("total_memory", &self.total_memory)
            .finish_non_exhaustive()
    }
}
