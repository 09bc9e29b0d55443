//! Native host backed by `tokio::fs` and the real process.

use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

use anyhow::Context;
use async_trait::async_trait;
use tessera_core::paths::{ancestors_root_to_leaf, normalize_path};
use tessera_core::{
    CompilerSystem, DestroyRegistry, FileStat, FsError, FsErrorKind, MkdirOptions, MkdirResult,
    RemoveResult, RenameResult, RmdirOptions, RuntimeKind, SystemDetails, WriteFileResult,
};
use tracing::{debug, info};

use super::details::host_details;

/// Explicit handle to the process a `ProcessSystem` is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHost {
    /// Working directory relative paths resolve against, normalized.
    pub cwd: String,
    /// The running executable, if the OS reports it.
    pub executable: Option<String>,
}

impl ProcessHost {
    /// Capture the current process.
    pub fn current() -> anyhow::Result<Self> {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        let executable = std::env::current_exe()
            .ok()
            .map(|p| normalize_path(&p.to_string_lossy()));
        Ok(Self {
            cwd: normalize_path(&cwd.to_string_lossy()),
            executable,
        })
    }

    /// A host rooted at `cwd` with no known executable.
    pub fn at(cwd: impl AsRef<Path>) -> Self {
        Self {
            cwd: normalize_path(&cwd.as_ref().to_string_lossy()),
            executable: None,
        }
    }
}

/// `CompilerSystem` with unrestricted access to the local filesystem.
pub struct ProcessSystem {
    host: ProcessHost,
    details: SystemDetails,
    registry: DestroyRegistry,
}

impl ProcessSystem {
    pub fn new(host: ProcessHost) -> Self {
        Self::with_details(host, host_details())
    }

    pub fn with_details(host: ProcessHost, details: SystemDetails) -> Self {
        debug!(cwd = %host.cwd, "Process system created");
        Self {
            host,
            details,
            registry: DestroyRegistry::new(),
        }
    }

    pub const fn host(&self) -> &ProcessHost {
        &self.host
    }
}

fn to_string(path: &Path) -> String {
    normalize_path(&path.to_string_lossy())
}

fn mtime_ms(meta: &std::fs::Metadata) -> Option<u64> {
    let since_epoch = meta.modified().ok()?.duration_since(UNIX_EPOCH).ok()?;
    Some(u64::try_from(since_epoch.as_millis()).unwrap_or(u64::MAX))
}

/// Every directory (pre-order, including `root`) and non-directory entry
/// beneath `root`. Symlinks are listed as files and never followed.
async fn walk(root: &str) -> io::Result<(Vec<String>, Vec<String>)> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();
    let mut stack = vec![root.to_string()];

    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut children = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = to_string(&entry.path());
            if entry.file_type().await?.is_dir() {
                children.push(path);
            } else {
                files.push(path);
            }
        }
        dirs.push(dir);
        children.sort();
        stack.extend(children.into_iter().rev());
    }

    files.sort();
    Ok((dirs, files))
}

#[async_trait]
impl CompilerSystem for ProcessSystem {
    fn runtime(&self) -> RuntimeKind {
        RuntimeKind::Process
    }

    fn details(&self) -> &SystemDetails {
        &self.details
    }

    fn destroy_registry(&self) -> &DestroyRegistry {
        &self.registry
    }

    async fn access(&self, path: &str) -> bool {
        tokio::fs::metadata(self.resolve_path(path)).await.is_ok()
    }

    async fn stat(&self, path: &str) -> Option<FileStat> {
        let path = self.resolve_path(path);
        let link = tokio::fs::symlink_metadata(&path).await.ok()?;
        // Dangling links still stat as the link itself.
        let meta = tokio::fs::metadata(&path).await.unwrap_or_else(|_| link.clone());
        Some(FileStat {
            is_file: meta.is_file(),
            is_directory: meta.is_dir(),
            is_symbolic_link: link.file_type().is_symlink(),
            size: meta.len(),
            mtime_ms: mtime_ms(&meta),
        })
    }

    async fn read_file(&self, path: &str) -> Option<String> {
        tokio::fs::read_to_string(self.resolve_path(path)).await.ok()
    }

    async fn write_file(&self, path: &str, content: &str) -> WriteFileResult {
        let path = self.resolve_path(path);
        match tokio::fs::write(&path, content).await {
            Ok(()) => WriteFileResult::ok(path),
            Err(e) => {
                let error = FsError::from_io(&path, &e);
                WriteFileResult::failed(path, error)
            }
        }
    }

    async fn mkdir(&self, path: &str, opts: MkdirOptions) -> MkdirResult {
        let path = self.resolve_path(path);
        let mut result = MkdirResult::new(&path);

        let targets = if opts.recursive {
            ancestors_root_to_leaf(&path)
        } else {
            vec![path.clone()]
        };

        for dir in targets {
            if opts.recursive {
                match tokio::fs::metadata(&dir).await {
                    Ok(meta) if meta.is_dir() => continue,
                    Ok(_) => {
                        return result.with_error(FsError::new(
                            FsErrorKind::NotADirectory,
                            format!("{dir}: exists and is not a directory"),
                        ));
                    }
                    Err(_) => {}
                }
            }
            match tokio::fs::create_dir(&dir).await {
                Ok(()) => result.new_dirs.push(dir),
                Err(e) if opts.recursive && e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return result.with_error(FsError::from_io(&dir, &e)),
            }
        }
        result
    }

    async fn rmdir(&self, path: &str, opts: RmdirOptions) -> RemoveResult {
        let path = self.resolve_path(path);
        let mut result = RemoveResult::new(&path);

        if !opts.recursive {
            return match tokio::fs::remove_dir(&path).await {
                Ok(()) => {
                    result.removed_dirs.push(path);
                    result
                }
                Err(e) => result.with_error(FsError::from_io(&path, &e)),
            };
        }

        let (mut dirs, files) = match walk(&path).await {
            Ok(entries) => entries,
            Err(e) => return result.with_error(FsError::from_io(&path, &e)),
        };
        if let Err(e) = tokio::fs::remove_dir_all(&path).await {
            return result.with_error(FsError::from_io(&path, &e));
        }
        dirs.reverse();
        result.removed_dirs = dirs;
        result.removed_files = files;
        result
    }

    async fn unlink(&self, path: &str) -> RemoveResult {
        let path = self.resolve_path(path);
        let result = RemoveResult::new(&path);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => result,
            Err(e) => result.with_error(FsError::from_io(&path, &e)),
        }
    }

    async fn rename(&self, old_path: &str, new_path: &str) -> RenameResult {
        let old_path = self.resolve_path(old_path);
        let new_path = self.resolve_path(new_path);
        let mut result = RenameResult::new(&old_path, &new_path);

        let meta = match tokio::fs::symlink_metadata(&old_path).await {
            Ok(meta) => meta,
            Err(e) => return result.with_error(FsError::from_io(&old_path, &e)),
        };
        result.is_directory = meta.is_dir();
        result.is_file = !result.is_directory;

        if result.is_directory {
            match walk(&old_path).await {
                Ok((dirs, files)) => result.record_directory_entries(dirs, files),
                Err(e) => return result.with_error(FsError::from_io(&old_path, &e)),
            }
        }

        match tokio::fs::rename(&old_path, &new_path).await {
            Ok(()) => result,
            Err(e) => result.with_error(FsError::from_io(&old_path, &e)),
        }
    }

    async fn readdir(&self, path: &str) -> Vec<String> {
        let path = self.resolve_path(path);
        let Ok(mut entries) = tokio::fs::read_dir(&path).await else {
            return Vec::new();
        };
        let mut children = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            children.push(to_string(&entry.path()));
        }
        children.sort();
        children
    }

    async fn copy_file(&self, src: &str, dst: &str) -> bool {
        tokio::fs::copy(self.resolve_path(src), self.resolve_path(dst))
            .await
            .is_ok()
    }

    async fn realpath(&self, path: &str) -> Option<String> {
        tokio::fs::canonicalize(self.resolve_path(path))
            .await
            .ok()
            .map(|p| to_string(&p))
    }

    async fn is_symbolic_link(&self, path: &str) -> bool {
        tokio::fs::symlink_metadata(self.resolve_path(path))
            .await
            .is_ok_and(|meta| meta.file_type().is_symlink())
    }

    fn exit(&self, code: i32) {
        info!(code, "Exiting");
        std::process::exit(code);
    }

    fn get_compiler_executing_path(&self) -> Option<String> {
        self.host.executable.clone()
    }

    fn get_current_directory(&self) -> String {
        self.host.cwd.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn system(dir: &TempDir) -> (ProcessSystem, String) {
        let root = to_string(dir.path());
        (ProcessSystem::new(ProcessHost::at(dir.path())), root)
    }

    #[tokio::test]
    async fn test_missing_path_is_not_accessible() {
        let dir = TempDir::new().unwrap();
        let (sys, root) = system(&dir);
        assert!(!sys.access(&format!("{root}/nope.txt")).await);
        assert!(sys.stat(&format!("{root}/nope.txt")).await.is_none());
        assert!(sys.read_file(&format!("{root}/nope.txt")).await.is_none());
        assert!(sys.readdir(&format!("{root}/nope")).await.is_empty());
    }

    #[tokio::test]
    async fn test_recursive_mkdir_reports_new_dirs_once() {
        let dir = TempDir::new().unwrap();
        let (sys, root) = system(&dir);
        let target = format!("{root}/a/b/c");

        let first = sys.mkdir(&target, MkdirOptions::recursive()).await;
        assert!(first.is_ok());
        assert_eq!(
            first.new_dirs,
            vec![
                format!("{root}/a"),
                format!("{root}/a/b"),
                format!("{root}/a/b/c")
            ]
        );

        let second = sys.mkdir(&target, MkdirOptions::recursive()).await;
        assert!(second.is_ok());
        assert!(second.new_dirs.is_empty());
    }

    #[tokio::test]
    async fn test_plain_mkdir_on_existing_dir_fails() {
        let dir = TempDir::new().unwrap();
        let (sys, root) = system(&dir);
        let result = sys.mkdir(&root, MkdirOptions::default()).await;
        assert_eq!(result.error.unwrap().kind, FsErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn test_rmdir_recursive_lists_contents() {
        let dir = TempDir::new().unwrap();
        let (sys, root) = system(&dir);
        sys.mkdir(&format!("{root}/x/y"), MkdirOptions::recursive()).await;
        sys.write_file(&format!("{root}/x/y/f.txt"), "f").await;

        let result = sys.rmdir(&format!("{root}/x"), RmdirOptions::recursive()).await;
        assert!(result.is_ok());
        assert_eq!(result.removed_dirs, vec![format!("{root}/x/y"), format!("{root}/x")]);
        assert_eq!(result.removed_files, vec![format!("{root}/x/y/f.txt")]);
        assert!(!sys.access(&format!("{root}/x")).await);
    }

    #[tokio::test]
    async fn test_rename_directory_rebases_entries() {
        let dir = TempDir::new().unwrap();
        let (sys, root) = system(&dir);
        sys.mkdir(&format!("{root}/old/sub"), MkdirOptions::recursive()).await;
        sys.write_file(&format!("{root}/old/sub/m.ts"), "x").await;

        let result = sys
            .rename(&format!("{root}/old"), &format!("{root}/new"))
            .await;
        assert!(result.is_ok());
        assert!(result.is_directory);
        assert_eq!(result.new_files, vec![format!("{root}/new/sub/m.ts")]);
        assert_eq!(
            sys.read_file(&format!("{root}/new/sub/m.ts")).await.as_deref(),
            Some("x")
        );
    }

    #[tokio::test]
    async fn test_relative_paths_resolve_against_cwd() {
        let sys = ProcessSystem::new(ProcessHost::at("/srv/app"));
        assert_eq!(sys.get_current_directory(), "/srv/app");
        assert_eq!(sys.resolve_path("x/../y.txt"), "/srv/app/y.txt");
        assert_eq!(sys.resolve_path("/abs/z"), "/abs/z");
    }
}
