//! The capability set every host runtime implements.
//!
//! The compiler core never touches the filesystem or the process directly;
//! it receives an `Arc<dyn CompilerSystem>` at construction and performs all
//! host access through it. Three adapters live in `tessera-runtime`
//! (process, sandboxed, in-memory) and each implements this trait
//! independently.
//!
//! # Failure model
//!
//! Nothing here returns `Err` or panics for an I/O failure. Lookups such as
//! `access` collapse failures to `false`/`None`/empty; mutating calls carry
//! the failure in the result record's `error` slot. The compiler performs
//! thousands of speculative lookups, and some hosts cannot marshal error
//! objects across a process boundary.

use async_trait::async_trait;

use crate::domain::{
    CopyResults, CopyTask, FileStat, MkdirOptions, MkdirResult, RemoveResult, RenameResult, RmdirOptions, RuntimeKind,
    SystemDetails, WriteFileResult,
};
use crate::hash;
use crate::services::copy;
use crate::paths;
use crate::services::destroy::{DestroyHook, DestroyRegistry, DestroySummary};

/// Uniform host interface: filesystem, process, hashing, lifecycle.
///
/// All paths are forward-slash strings. Relative paths are resolved against
/// `get_current_directory()` by the adapter.
#[async_trait]
pub trait CompilerSystem: Send + Sync {
    /// Which adapter this is.
    fn runtime(&self) -> RuntimeKind;

    /// Host snapshot taken at construction.
    fn details(&self) -> &SystemDetails;

    /// The registry drained by `destroy()`.
    fn destroy_registry(&self) -> &DestroyRegistry;

    /// `true` iff the path can be stat'ed. Never fails.
    async fn access(&self, path: &str) -> bool;

    /// Metadata for a path, `None` on any failure.
    async fn stat(&self, path: &str) -> Option<FileStat>;

    /// UTF-8 file contents, `None` on any failure.
    async fn read_file(&self, path: &str) -> Option<String>;

    /// Write (create or truncate) a file.
    async fn write_file(&self, path: &str, content: &str) -> WriteFileResult;

    /// Create a directory, optionally with missing ancestors.
    async fn mkdir(&self, path: &str, opts: MkdirOptions) -> MkdirResult;

    /// Remove a directory, optionally with its contents.
    async fn rmdir(&self, path: &str, opts: RmdirOptions) -> RemoveResult;

    /// Remove a single file.
    async fn unlink(&self, path: &str) -> RemoveResult;

    /// Move a file or directory.
    async fn rename(&self, old_path: &str, new_path: &str) -> RenameResult;

    /// Sorted, normalized absolute child paths. Empty on any failure.
    async fn readdir(&self, path: &str) -> Vec<String>;

    /// Copy a file. `false` on any failure.
    async fn copy_file(&self, src: &str, dst: &str) -> bool;

    /// Run bulk copy tasks built on `stat`, `readdir`, `mkdir` and
    /// `copy_file`, so adapter confinement applies to every step.
    async fn copy(&self, tasks: &[CopyTask], src_dir: &str) -> CopyResults {
        copy::copy_tasks(self, tasks, src_dir).await
    }

    /// Canonical path with symlinks resolved, `None` on failure.
    async fn realpath(&self, path: &str) -> Option<String>;

    /// Whether the path itself is a symbolic link. `false` on failure.
    async fn is_symbolic_link(&self, path: &str) -> bool;

    /// Terminate the host process. Hosts without a process record the code.
    fn exit(&self, code: i32);

    /// Where the compiler itself is installed, used to locate co-located
    /// worker bundles. `None` when the host cannot tell; the caller then
    /// supplies a fallback.
    fn get_compiler_executing_path(&self) -> Option<String>;

    /// Current working directory, normalized.
    fn get_current_directory(&self) -> String;

    /// Absolute, normalized form of `path`.
    fn resolve_path(&self, path: &str) -> String {
        paths::resolve_against(&self.get_current_directory(), path)
    }

    /// Lexical normalization to forward slashes.
    fn normalize_path(&self, path: &str) -> String {
        paths::normalize_path(path)
    }

    /// Lowercase hex digest of `content`, truncated to `length` characters.
    fn generate_content_hash(&self, content: &[u8], length: Option<usize>) -> String {
        hash::generate_content_hash(content, length)
    }

    /// Base64 encoding of a UTF-8 string.
    fn encode_to_base64(&self, input: &str) -> String {
        hash::encode_to_base64(input)
    }

    /// Register a teardown hook.
    fn add_destroy(&self, hook: DestroyHook) {
        self.destroy_registry().add(hook);
    }

    /// Unregister a teardown hook; it will never be invoked.
    fn remove_destroy(&self, hook: &DestroyHook) {
        self.destroy_registry().remove(hook);
    }

    /// Run every registered hook once and empty the registry.
    async fn destroy(&self) -> DestroySummary {
        self.destroy_registry().destroy().await
    }
}
