//! Filesystem operation records.
//!
//! Every mutating `CompilerSystem` call returns one of these records instead
//! of raising. Callers use the `new_*` / `removed_*` lists for cache
//! invalidation, but only after checking that `error` is `None`: a populated
//! error slot means the lists are empty or partial.

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::paths::{basename, dirname};

/// Coarse classification of an I/O failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FsErrorKind {
    NotFound,
    PermissionDenied,
    AlreadyExists,
    NotADirectory,
    IsADirectory,
    DirectoryNotEmpty,
    InvalidInput,
    Other,
}

impl FsErrorKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not found",
            Self::PermissionDenied => "permission denied",
            Self::AlreadyExists => "already exists",
            Self::NotADirectory => "not a directory",
            Self::IsADirectory => "is a directory",
            Self::DirectoryNotEmpty => "directory not empty",
            Self::InvalidInput => "invalid input",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for FsErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<io::ErrorKind> for FsErrorKind {
    fn from(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            io::ErrorKind::AlreadyExists => Self::AlreadyExists,
            io::ErrorKind::NotADirectory => Self::NotADirectory,
            io::ErrorKind::IsADirectory => Self::IsADirectory,
            io::ErrorKind::DirectoryNotEmpty => Self::DirectoryNotEmpty,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => Self::InvalidInput,
            _ => Self::Other,
        }
    }
}

/// An I/O failure carried as data.
///
/// Serializable so it can cross the worker process boundary, and free of
/// `std::io::Error` so it is `Clone`.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("I/O error ({kind}): {message}")]
pub struct FsError {
    /// Failure classification.
    pub kind: FsErrorKind,
    /// Human-readable detail, usually including the path.
    pub message: String,
}

impl FsError {
    /// Create an error from its parts.
    pub fn new(kind: FsErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Capture an `io::Error` raised while operating on `path`.
    pub fn from_io(path: &str, err: &io::Error) -> Self {
        Self::new(err.kind().into(), format!("{path}: {err}"))
    }

    /// The path does not exist.
    pub fn not_found(path: &str) -> Self {
        Self::new(FsErrorKind::NotFound, format!("{path}: no such file or directory"))
    }

    /// The host refused access to the path.
    pub fn permission_denied(path: &str) -> Self {
        Self::new(FsErrorKind::PermissionDenied, format!("{path}: permission denied"))
    }
}

/// Options for `mkdir`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MkdirOptions {
    /// Create missing ancestors as well.
    pub recursive: bool,
}

impl MkdirOptions {
    /// Recursive creation.
    pub const fn recursive() -> Self {
        Self { recursive: true }
    }
}

/// Options for `rmdir`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RmdirOptions {
    /// Remove contents as well.
    pub recursive: bool,
}

impl RmdirOptions {
    /// Recursive removal.
    pub const fn recursive() -> Self {
        Self { recursive: true }
    }
}

/// Metadata returned by `stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    pub is_file: bool,
    pub is_directory: bool,
    pub is_symbolic_link: bool,
    /// Size in bytes (zero for directories on some hosts).
    pub size: u64,
    /// Last modification time in milliseconds since the Unix epoch, if known.
    pub mtime_ms: Option<u64>,
}

/// Result of `write_file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteFileResult {
    pub path: String,
    pub error: Option<FsError>,
}

impl WriteFileResult {
    /// Successful write to `path`.
    pub fn ok(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            error: None,
        }
    }

    /// Failed write to `path`.
    pub fn failed(path: impl Into<String>, error: FsError) -> Self {
        Self {
            path: path.into(),
            error: Some(error),
        }
    }

    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of `mkdir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MkdirResult {
    /// Target directory.
    pub path: String,
    pub basename: String,
    /// Parent of the target.
    pub dirname: String,
    /// Directories created by this call, root-to-leaf. Empty when the target
    /// already existed.
    pub new_dirs: Vec<String>,
    pub error: Option<FsError>,
}

impl MkdirResult {
    /// An empty record for `path`.
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            basename: basename(path),
            dirname: dirname(path),
            new_dirs: Vec::new(),
            error: None,
        }
    }

    /// Record a failure. Directories created before the failure stay listed.
    #[must_use]
    pub fn with_error(mut self, error: FsError) -> Self {
        self.error = Some(error);
        self
    }

    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of `rmdir` and `unlink`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveResult {
    pub path: String,
    pub basename: String,
    pub dirname: String,
    /// Directories removed, deepest first.
    pub removed_dirs: Vec<String>,
    /// Files removed. Empty for a plain `unlink`.
    pub removed_files: Vec<String>,
    pub error: Option<FsError>,
}

impl RemoveResult {
    /// An empty record for `path`.
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            basename: basename(path),
            dirname: dirname(path),
            removed_dirs: Vec::new(),
            removed_files: Vec::new(),
            error: None,
        }
    }

    /// Record a failure.
    #[must_use]
    pub fn with_error(mut self, error: FsError) -> Self {
        self.error = Some(error);
        self
    }

    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of `rename`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameResult {
    pub old_path: String,
    pub new_path: String,
    pub is_file: bool,
    pub is_directory: bool,
    /// Directories under the old location (directory renames only).
    pub old_dirs: Vec<String>,
    /// Files under the old location (directory renames only).
    pub old_files: Vec<String>,
    /// The same directories at their new location.
    pub new_dirs: Vec<String>,
    /// The same files at their new location.
    pub new_files: Vec<String>,
    pub error: Option<FsError>,
}

impl RenameResult {
    /// An empty record for a rename of `old_path` to `new_path`.
    pub fn new(old_path: &str, new_path: &str) -> Self {
        Self {
            old_path: old_path.to_string(),
            new_path: new_path.to_string(),
            is_file: false,
            is_directory: false,
            old_dirs: Vec::new(),
            old_files: Vec::new(),
            new_dirs: Vec::new(),
            new_files: Vec::new(),
            error: None,
        }
    }

    /// Record a failure and drop any partially collected lists.
    #[must_use]
    pub fn with_error(mut self, error: FsError) -> Self {
        self.old_dirs.clear();
        self.old_files.clear();
        self.new_dirs.clear();
        self.new_files.clear();
        self.error = Some(error);
        self
    }

    /// Populate the old/new lists for a directory rename from the entries
    /// found under the old location.
    pub fn record_directory_entries(&mut self, dirs: Vec<String>, files: Vec<String>) {
        let rebase = |p: &String| format!("{}{}", self.new_path, &p[self.old_path.len()..]);
        self.new_dirs = dirs.iter().map(rebase).collect();
        self.new_files = files.iter().map(rebase).collect();
        self.old_dirs = dirs;
        self.old_files = files;
    }

    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// One entry of a bulk `copy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyTask {
    /// File or directory to copy. Relative paths resolve against the source
    /// directory passed to `copy`.
    pub src: String,
    /// Destination, resolved the same way.
    pub dest: String,
    /// Report a missing source instead of skipping it silently.
    #[serde(default)]
    pub warn: bool,
    /// Recreate the source's path below `dest` instead of copying onto it.
    #[serde(default)]
    pub keep_dir_structure: bool,
}

impl CopyTask {
    pub fn new(src: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dest: dest.into(),
            warn: false,
            keep_dir_structure: false,
        }
    }

    #[must_use]
    pub const fn warn(mut self) -> Self {
        self.warn = true;
        self
    }

    #[must_use]
    pub const fn keep_dir_structure(mut self) -> Self {
        self.keep_dir_structure = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CopyDiagnosticLevel {
    Warn,
    Error,
}

/// A problem met while running copy tasks. Copying carries on past it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyDiagnostic {
    pub level: CopyDiagnosticLevel,
    pub message: String,
}

/// Result of `copy`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyResults {
    pub diagnostics: Vec<CopyDiagnostic>,
    /// Directories created by the copy, sorted.
    pub dir_paths: Vec<String>,
    /// Files written, sorted.
    pub file_paths: Vec<String>,
}

impl CopyResults {
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.level == CopyDiagnosticLevel::Error)
    }

    pub(crate) fn push(&mut self, level: CopyDiagnosticLevel, message: String) {
        self.diagnostics.push(CopyDiagnostic { level, message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err = FsError::from_io("/x", &io_err);
        assert_eq!(err.kind, FsErrorKind::NotFound);
        assert!(err.message.contains("/x"));
        assert_eq!(err.to_string(), "I/O error (not found): /x: gone");
    }

    #[test]
    fn test_fs_error_serializes() {
        let err = FsError::permission_denied("/etc/shadow");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"permissionDenied\""));
        let back: FsError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn test_mkdir_result_parts() {
        let result = MkdirResult::new("/a/b/c");
        assert_eq!(result.basename, "c");
        assert_eq!(result.dirname, "/a/b");
        assert!(result.is_ok());
    }

    #[test]
    fn test_rename_rebases_directory_entries() {
        let mut result = RenameResult::new("/src/old", "/src/new");
        result.record_directory_entries(
            vec!["/src/old".to_string(), "/src/old/nested".to_string()],
            vec!["/src/old/nested/a.ts".to_string()],
        );
        assert_eq!(result.new_dirs, vec!["/src/new", "/src/new/nested"]);
        assert_eq!(result.new_files, vec!["/src/new/nested/a.ts"]);
    }

    #[test]
    fn test_copy_task_defaults_when_deserialized() {
        let task: CopyTask = serde_json::from_str(r#"{"src":"assets","dest":"www"}"#).unwrap();
        assert_eq!(task, CopyTask::new("assets", "www"));

        let task: CopyTask =
            serde_json::from_str(r#"{"src":"a","dest":"b","warn":true,"keepDirStructure":true}"#)
                .unwrap();
        assert!(task.warn && task.keep_dir_structure);
    }

    #[test]
    fn test_rename_error_clears_lists() {
        let mut result = RenameResult::new("/a", "/b");
        result.record_directory_entries(vec!["/a".to_string()], vec![]);
        let result = result.with_error(FsError::not_found("/a"));
        assert!(result.old_dirs.is_empty());
        assert!(result.new_dirs.is_empty());
        assert!(!result.is_ok());
    }
}
