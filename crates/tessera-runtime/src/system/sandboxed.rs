//! Process host with filesystem access limited by an explicit policy.
//!
//! Every path is resolved and checked against the policy before the call is
//! forwarded to the wrapped `ProcessSystem`. The check applies to the path as
//! written and to where it lands once symlinks are followed. Denied lookups
//! look exactly like missing paths; denied mutations carry a
//! `PermissionDenied` error.

use std::sync::Mutex;

use async_trait::async_trait;
use tessera_core::paths::{
    basename, dirname, is_absolute, is_within, join_paths, normalize_path,
};
use tessera_core::{
    CompilerSystem, DestroyRegistry, FileStat, FsError, MkdirOptions, MkdirResult, RemoveResult,
    RenameResult, RmdirOptions, RuntimeKind, SystemDetails, WriteFileResult,
};
use thiserror::Error;
use tracing::{debug, warn};

use super::process::{ProcessHost, ProcessSystem};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SandboxPolicyError {
    #[error("Sandbox root must be absolute: {0}")]
    RelativeRoot(String),
}

/// Which paths a sandboxed host may touch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxPolicy {
    read_roots: Vec<String>,
    write_roots: Vec<String>,
    allow_exit: bool,
}

impl SandboxPolicy {
    /// A policy that denies everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow reads beneath `root`.
    pub fn allow_read(mut self, root: &str) -> Result<Self, SandboxPolicyError> {
        self.read_roots.push(checked_root(root)?);
        Ok(self)
    }

    /// Allow reads and writes beneath `root`.
    pub fn allow_write(mut self, root: &str) -> Result<Self, SandboxPolicyError> {
        self.write_roots.push(checked_root(root)?);
        Ok(self)
    }

    /// Let `exit` terminate the process instead of only recording the code.
    #[must_use]
    pub const fn allow_exit(mut self, allow: bool) -> Self {
        self.allow_exit = allow;
        self
    }

    pub fn can_read(&self, path: &str) -> bool {
        self.can_write(path) || self.read_roots.iter().any(|root| is_within(root, path))
    }

    pub fn can_write(&self, path: &str) -> bool {
        self.write_roots.iter().any(|root| is_within(root, path))
    }

    /// The same policy with every root replaced by its real location, so it
    /// can be compared against canonical paths. Roots that do not exist yet
    /// are kept as written.
    fn canonical(&self) -> Self {
        let real = |roots: &[String]| -> Vec<String> {
            roots
                .iter()
                .map(|root| {
                    std::fs::canonicalize(root)
                        .map(|p| normalize_path(&p.to_string_lossy()))
                        .unwrap_or_else(|_| root.clone())
                })
                .collect()
        };
        Self {
            read_roots: real(&self.read_roots),
            write_roots: real(&self.write_roots),
            allow_exit: self.allow_exit,
        }
    }
}

/// Where `path` really lives: its longest existing ancestor with symlinks
/// followed, plus the components that do not exist yet.
async fn real_location(path: &str) -> Option<String> {
    let mut existing = path.to_string();
    let mut missing = Vec::new();
    loop {
        match tokio::fs::canonicalize(&existing).await {
            Ok(real) => {
                let real = normalize_path(&real.to_string_lossy());
                return Some(
                    missing
                        .iter()
                        .rev()
                        .fold(real, |acc, part: &String| join_paths(&acc, part)),
                );
            }
            Err(_) => {
                let parent = dirname(&existing);
                if parent == existing {
                    return None;
                }
                missing.push(basename(&existing));
                existing = parent;
            }
        }
    }
}

fn checked_root(root: &str) -> Result<String, SandboxPolicyError> {
    if !is_absolute(root) {
        return Err(SandboxPolicyError::RelativeRoot(root.to_string()));
    }
    Ok(normalize_path(root))
}

pub struct SandboxedSystem {
    inner: ProcessSystem,
    policy: SandboxPolicy,
    real_policy: SandboxPolicy,
    exit_code: Mutex<Option<i32>>,
}

impl SandboxedSystem {
    pub fn new(host: ProcessHost, policy: SandboxPolicy) -> Self {
        Self::wrap(ProcessSystem::new(host), policy)
    }

    pub fn wrap(inner: ProcessSystem, policy: SandboxPolicy) -> Self {
        debug!(?policy, "Sandboxed system created");
        Self {
            inner,
            real_policy: policy.canonical(),
            policy,
            exit_code: Mutex::new(None),
        }
    }

    pub const fn policy(&self) -> &SandboxPolicy {
        &self.policy
    }

    /// Code passed to a suppressed `exit`, if any.
    pub fn exit_code(&self) -> Option<i32> {
        *self
            .exit_code
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn readable(&self, path: &str) -> Option<String> {
        let path = self.resolve_path(path);
        if self.policy.can_read(&path) && self.lands_within(&path, SandboxPolicy::can_read).await {
            Some(path)
        } else {
            debug!(path = %path, "Read denied by sandbox");
            None
        }
    }

    async fn writable(&self, path: &str) -> Result<String, FsError> {
        let path = self.resolve_path(path);
        if self.policy.can_write(&path) && self.lands_within(&path, SandboxPolicy::can_write).await
        {
            Ok(path)
        } else {
            debug!(path = %path, "Write denied by sandbox");
            Err(FsError::permission_denied(&path))
        }
    }

    /// Whether `path` is still allowed once symlinks along it are followed.
    async fn lands_within(&self, path: &str, allowed: fn(&SandboxPolicy, &str) -> bool) -> bool {
        match real_location(path).await {
            Some(real) => {
                real == path || allowed(&self.real_policy, &real) || allowed(&self.policy, &real)
            }
            None => false,
        }
    }
}

#[async_trait]
impl CompilerSystem for SandboxedSystem {
    fn runtime(&self) -> RuntimeKind {
        RuntimeKind::Sandboxed
    }

    fn details(&self) -> &SystemDetails {
        self.inner.details()
    }

    fn destroy_registry(&self) -> &DestroyRegistry {
        self.inner.destroy_registry()
    }

    async fn access(&self, path: &str) -> bool {
        match self.readable(path).await {
            Some(path) => self.inner.access(&path).await,
            None => false,
        }
    }

    async fn stat(&self, path: &str) -> Option<FileStat> {
        let path = self.readable(path).await?;
        self.inner.stat(&path).await
    }

    async fn read_file(&self, path: &str) -> Option<String> {
        let path = self.readable(path).await?;
        self.inner.read_file(&path).await
    }

    async fn write_file(&self, path: &str, content: &str) -> WriteFileResult {
        match self.writable(path).await {
            Ok(path) => self.inner.write_file(&path, content).await,
            Err(error) => WriteFileResult::failed(self.resolve_path(path), error),
        }
    }

    async fn mkdir(&self, path: &str, opts: MkdirOptions) -> MkdirResult {
        match self.writable(path).await {
            Ok(path) => self.inner.mkdir(&path, opts).await,
            Err(error) => MkdirResult::new(&self.resolve_path(path)).with_error(error),
        }
    }

    async fn rmdir(&self, path: &str, opts: RmdirOptions) -> RemoveResult {
        match self.writable(path).await {
            Ok(path) => self.inner.rmdir(&path, opts).await,
            Err(error) => RemoveResult::new(&self.resolve_path(path)).with_error(error),
        }
    }

    async fn unlink(&self, path: &str) -> RemoveResult {
        match self.writable(path).await {
            Ok(path) => self.inner.unlink(&path).await,
            Err(error) => RemoveResult::new(&self.resolve_path(path)).with_error(error),
        }
    }

    async fn rename(&self, old_path: &str, new_path: &str) -> RenameResult {
        match (self.writable(old_path).await, self.writable(new_path).await) {
            (Ok(old), Ok(new)) => self.inner.rename(&old, &new).await,
            (Err(error), _) | (_, Err(error)) => RenameResult::new(
                &self.resolve_path(old_path),
                &self.resolve_path(new_path),
            )
            .with_error(error),
        }
    }

    async fn readdir(&self, path: &str) -> Vec<String> {
        match self.readable(path).await {
            Some(path) => self.inner.readdir(&path).await,
            None => Vec::new(),
        }
    }

    async fn copy_file(&self, src: &str, dst: &str) -> bool {
        match (self.readable(src).await, self.writable(dst).await) {
            (Some(src), Ok(dst)) => self.inner.copy_file(&src, &dst).await,
            _ => false,
        }
    }

    async fn realpath(&self, path: &str) -> Option<String> {
        let path = self.readable(path).await?;
        // A symlink must not resolve outside the sandbox.
        self.inner
            .realpath(&path)
            .await
            .filter(|real| self.policy.can_read(real) || self.real_policy.can_read(real))
    }

    async fn is_symbolic_link(&self, path: &str) -> bool {
        match self.readable(path).await {
            Some(path) => self.inner.is_symbolic_link(&path).await,
            None => false,
        }
    }

    fn exit(&self, code: i32) {
        if self.policy.allow_exit {
            self.inner.exit(code);
            return;
        }
        warn!(code, "Exit suppressed by sandbox");
        *self
            .exit_code
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(code);
    }

    fn get_compiler_executing_path(&self) -> Option<String> {
        None
    }

    fn get_current_directory(&self) -> String {
        self.inner.get_current_directory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sandbox(dir: &TempDir) -> (SandboxedSystem, String) {
        let root = normalize_path(&dir.path().to_string_lossy());
        let policy = SandboxPolicy::new()
            .allow_write(&format!("{root}/work"))
            .unwrap()
            .allow_read(&format!("{root}/src"))
            .unwrap();
        (SandboxedSystem::new(ProcessHost::at(dir.path()), policy), root)
    }

    #[test]
    fn test_policy_rejects_relative_roots() {
        assert_eq!(
            SandboxPolicy::new().allow_read("src"),
            Err(SandboxPolicyError::RelativeRoot("src".to_string()))
        );
    }

    #[tokio::test]
    async fn test_reads_outside_roots_look_missing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("secret.txt"), "s").unwrap();
        let (sys, root) = sandbox(&dir);

        assert!(!sys.access(&format!("{root}/secret.txt")).await);
        assert!(sys.read_file(&format!("{root}/secret.txt")).await.is_none());
        assert!(sys.readdir(&root).await.is_empty());
    }

    #[tokio::test]
    async fn test_writes_need_write_root() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::create_dir(dir.path().join("work")).unwrap();
        let (sys, root) = sandbox(&dir);

        let denied = sys.write_file(&format!("{root}/src/a.ts"), "a").await;
        assert_eq!(
            denied.error.map(|e| e.kind),
            Some(tessera_core::FsErrorKind::PermissionDenied)
        );

        let allowed = sys.write_file(&format!("{root}/work/a.ts"), "a").await;
        assert!(allowed.is_ok());
        assert!(sys.access(&format!("{root}/work/a.ts")).await);

        // Escaping with `..` is caught after normalization.
        let escaped = sys.mkdir(&format!("{root}/work/../x"), MkdirOptions::default()).await;
        assert!(escaped.error.is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_out_of_write_root_is_denied() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("work")).unwrap();
        std::fs::create_dir(dir.path().join("outside")).unwrap();
        std::fs::write(dir.path().join("outside/secret"), "s").unwrap();
        std::os::unix::fs::symlink(dir.path().join("outside"), dir.path().join("work/link"))
            .unwrap();
        let (sys, root) = sandbox(&dir);

        assert!(sys.read_file(&format!("{root}/work/link/secret")).await.is_none());
        assert!(!sys.access(&format!("{root}/work/link/secret")).await);
        assert!(sys.readdir(&format!("{root}/work/link")).await.is_empty());

        let planted = sys.write_file(&format!("{root}/work/link/planted"), "p").await;
        assert_eq!(
            planted.error.map(|e| e.kind),
            Some(tessera_core::FsErrorKind::PermissionDenied)
        );
        assert!(!dir.path().join("outside/planted").exists());

        let nested = sys
            .mkdir(&format!("{root}/work/link/a/b"), MkdirOptions { recursive: true })
            .await;
        assert!(nested.error.is_some());
        assert!(!dir.path().join("outside/a").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_inside_write_root_is_followed() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("work/real")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("work/real"), dir.path().join("work/alias"))
            .unwrap();
        let (sys, root) = sandbox(&dir);

        assert!(sys.write_file(&format!("{root}/work/alias/a.ts"), "a").await.is_ok());
        assert_eq!(
            sys.read_file(&format!("{root}/work/real/a.ts")).await.as_deref(),
            Some("a")
        );
    }

    #[tokio::test]
    async fn test_copy_is_confined_to_write_roots() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join("work")).unwrap();
        std::fs::write(dir.path().join("src/a.txt"), "a").unwrap();
        let (sys, root) = sandbox(&dir);

        let results = sys
            .copy(
                &[
                    tessera_core::CopyTask::new("a.txt", format!("{root}/elsewhere/a.txt")),
                    tessera_core::CopyTask::new("a.txt", format!("{root}/work/a.txt")),
                ],
                &format!("{root}/src"),
            )
            .await;

        assert!(results.has_errors());
        assert_eq!(results.file_paths, vec![format!("{root}/work/a.txt")]);
        assert!(!dir.path().join("elsewhere").exists());
    }

    #[tokio::test]
    async fn test_exit_is_recorded() {
        let dir = TempDir::new().unwrap();
        let (sys, _) = sandbox(&dir);
        assert_eq!(sys.exit_code(), None);
        sys.exit(3);
        assert_eq!(sys.exit_code(), Some(3));
        assert_eq!(sys.get_compiler_executing_path(), None);
    }
}
