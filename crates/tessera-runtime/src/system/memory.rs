//! Fully in-memory host.
//!
//! The tree is a sorted map from normalized absolute path to node, so a
//! directory's descendants are a contiguous key range. Symbolic links are not
//! modelled.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tessera_core::paths::{ancestors_root_to_leaf, dirname};
use tessera_core::{
    CompilerSystem, DestroyRegistry, FileStat, FsError, FsErrorKind, MkdirOptions, MkdirResult,
    RemoveResult, RenameResult, RmdirOptions, RuntimeKind, SystemDetails, WriteFileResult,
};
use tracing::debug;

const GIB: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File { content: String, mtime_ms: u64 },
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

fn child_prefix(dir: &str) -> String {
    if dir.ends_with('/') {
        dir.to_string()
    } else {
        format!("{dir}/")
    }
}

struct Tree {
    nodes: BTreeMap<String, Node>,
}

impl Tree {
    fn new() -> Self {
        Self {
            nodes: BTreeMap::from([("/".to_string(), Node::Dir)]),
        }
    }

    fn is_dir(&self, path: &str) -> bool {
        matches!(self.nodes.get(path), Some(Node::Dir))
    }

    /// All keys strictly beneath `dir`.
    fn descendants(&self, dir: &str) -> Vec<String> {
        let prefix = child_prefix(dir);
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn children(&self, dir: &str) -> Vec<String> {
        let prefix = child_prefix(dir);
        self.descendants(dir)
            .into_iter()
            .filter(|key| !key[prefix.len()..].contains('/'))
            .collect()
    }

    fn require_parent_dir(&self, path: &str) -> Result<(), FsError> {
        let parent = dirname(path);
        match self.nodes.get(&parent) {
            Some(Node::Dir) => Ok(()),
            Some(Node::File { .. }) => Err(FsError::new(
                FsErrorKind::NotADirectory,
                format!("{parent}: not a directory"),
            )),
            None => Err(FsError::not_found(&parent)),
        }
    }
}

/// `CompilerSystem` whose filesystem lives entirely in memory.
pub struct InMemorySystem {
    tree: Mutex<Tree>,
    cwd: String,
    details: SystemDetails,
    registry: DestroyRegistry,
    exit_code: Mutex<Option<i32>>,
}

impl InMemorySystem {
    /// Empty tree rooted at `/`, working directory `/`.
    pub fn new() -> Self {
        Self::with_details(SystemDetails::fixed(4, 8 * GIB, 4 * GIB))
    }

    pub fn with_details(details: SystemDetails) -> Self {
        Self {
            tree: Mutex::new(Tree::new()),
            cwd: "/".to_string(),
            details,
            registry: DestroyRegistry::new(),
            exit_code: Mutex::new(None),
        }
    }

    /// Seed files, creating parent directories as needed.
    #[must_use]
    pub fn with_files<'a>(self, files: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        {
            let mut tree = self.lock();
            for (path, content) in files {
                let path = self.resolve_path(path);
                for dir in ancestors_root_to_leaf(&dirname(&path)) {
                    tree.nodes.entry(dir).or_insert(Node::Dir);
                }
                tree.nodes.insert(
                    path,
                    Node::File {
                        content: content.to_string(),
                        mtime_ms: now_ms(),
                    },
                );
            }
        }
        self
    }

    /// Code passed to `exit`, if it was called.
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_code.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemorySystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompilerSystem for InMemorySystem {
    fn runtime(&self) -> RuntimeKind {
        RuntimeKind::InMemory
    }

    fn details(&self) -> &SystemDetails {
        &self.details
    }

    fn destroy_registry(&self) -> &DestroyRegistry {
        &self.registry
    }

    async fn access(&self, path: &str) -> bool {
        let path = self.resolve_path(path);
        self.lock().nodes.contains_key(&path)
    }

    async fn stat(&self, path: &str) -> Option<FileStat> {
        let path = self.resolve_path(path);
        let tree = self.lock();
        Some(match tree.nodes.get(&path)? {
            Node::Dir => FileStat {
                is_file: false,
                is_directory: true,
                is_symbolic_link: false,
                size: 0,
                mtime_ms: None,
            },
            Node::File { content, mtime_ms } => FileStat {
                is_file: true,
                is_directory: false,
                is_symbolic_link: false,
                size: content.len() as u64,
                mtime_ms: Some(*mtime_ms),
            },
        })
    }

    async fn read_file(&self, path: &str) -> Option<String> {
        let path = self.resolve_path(path);
        match self.lock().nodes.get(&path)? {
            Node::File { content, .. } => Some(content.clone()),
            Node::Dir => None,
        }
    }

    async fn write_file(&self, path: &str, content: &str) -> WriteFileResult {
        let path = self.resolve_path(path);
        let mut tree = self.lock();
        if let Err(error) = tree.require_parent_dir(&path) {
            return WriteFileResult::failed(path, error);
        }
        if tree.is_dir(&path) {
            let error = FsError::new(FsErrorKind::IsADirectory, format!("{path}: is a directory"));
            return WriteFileResult::failed(path, error);
        }
        tree.nodes.insert(
            path.clone(),
            Node::File {
                content: content.to_string(),
                mtime_ms: now_ms(),
            },
        );
        WriteFileResult::ok(path)
    }

    async fn mkdir(&self, path: &str, opts: MkdirOptions) -> MkdirResult {
        let path = self.resolve_path(path);
        let mut result = MkdirResult::new(&path);
        let mut tree = self.lock();

        if !opts.recursive {
            if tree.nodes.contains_key(&path) {
                return result.with_error(FsError::new(
                    FsErrorKind::AlreadyExists,
                    format!("{path}: already exists"),
                ));
            }
            if let Err(error) = tree.require_parent_dir(&path) {
                return result.with_error(error);
            }
            tree.nodes.insert(path.clone(), Node::Dir);
            result.new_dirs.push(path);
            return result;
        }

        for dir in ancestors_root_to_leaf(&path) {
            match tree.nodes.get(&dir) {
                Some(Node::Dir) => {}
                Some(Node::File { .. }) => {
                    return result.with_error(FsError::new(
                        FsErrorKind::NotADirectory,
                        format!("{dir}: exists and is not a directory"),
                    ));
                }
                None => {
                    tree.nodes.insert(dir.clone(), Node::Dir);
                    result.new_dirs.push(dir);
                }
            }
        }
        result
    }

    async fn rmdir(&self, path: &str, opts: RmdirOptions) -> RemoveResult {
        let path = self.resolve_path(path);
        let mut result = RemoveResult::new(&path);
        let mut tree = self.lock();

        match tree.nodes.get(&path) {
            None => return result.with_error(FsError::not_found(&path)),
            Some(Node::File { .. }) => {
                return result.with_error(FsError::new(
                    FsErrorKind::NotADirectory,
                    format!("{path}: not a directory"),
                ));
            }
            Some(Node::Dir) if path == "/" => {
                return result.with_error(FsError::new(
                    FsErrorKind::InvalidInput,
                    "refusing to remove the root directory",
                ));
            }
            Some(Node::Dir) => {}
        }

        let descendants = tree.descendants(&path);
        if !descendants.is_empty() && !opts.recursive {
            return result.with_error(FsError::new(
                FsErrorKind::DirectoryNotEmpty,
                format!("{path}: directory not empty"),
            ));
        }

        for key in descendants.iter().rev() {
            match tree.nodes.remove(key) {
                Some(Node::Dir) => result.removed_dirs.push(key.clone()),
                Some(Node::File { .. }) => result.removed_files.push(key.clone()),
                None => {}
            }
        }
        tree.nodes.remove(&path);
        result.removed_dirs.push(path);
        result.removed_files.sort();
        result
    }

    async fn unlink(&self, path: &str) -> RemoveResult {
        let path = self.resolve_path(path);
        let result = RemoveResult::new(&path);
        let mut tree = self.lock();
        match tree.nodes.get(&path) {
            Some(Node::File { .. }) => {
                tree.nodes.remove(&path);
                result
            }
            Some(Node::Dir) => result.with_error(FsError::new(
                FsErrorKind::IsADirectory,
                format!("{path}: is a directory"),
            )),
            None => result.with_error(FsError::not_found(&path)),
        }
    }

    async fn rename(&self, old_path: &str, new_path: &str) -> RenameResult {
        let old_path = self.resolve_path(old_path);
        let new_path = self.resolve_path(new_path);
        let mut result = RenameResult::new(&old_path, &new_path);
        let mut tree = self.lock();

        let Some(node) = tree.nodes.get(&old_path).cloned() else {
            return result.with_error(FsError::not_found(&old_path));
        };
        if old_path == new_path {
            result.is_file = matches!(node, Node::File { .. });
            result.is_directory = !result.is_file;
            return result;
        }
        if let Err(error) = tree.require_parent_dir(&new_path) {
            return result.with_error(error);
        }
        match (&node, tree.nodes.get(&new_path)) {
            (_, Some(Node::Dir)) => {
                return result.with_error(FsError::new(
                    FsErrorKind::AlreadyExists,
                    format!("{new_path}: already exists"),
                ));
            }
            (Node::Dir, Some(Node::File { .. })) => {
                return result.with_error(FsError::new(
                    FsErrorKind::NotADirectory,
                    format!("{new_path}: not a directory"),
                ));
            }
            _ => {}
        }

        match node {
            Node::File { .. } => {
                result.is_file = true;
                tree.nodes.remove(&old_path);
                tree.nodes.insert(new_path.clone(), node);
            }
            Node::Dir => {
                if new_path.starts_with(&child_prefix(&old_path)) {
                    return result.with_error(FsError::new(
                        FsErrorKind::InvalidInput,
                        format!("{new_path}: cannot move a directory into itself"),
                    ));
                }
                result.is_directory = true;
                let mut dirs = vec![old_path.clone()];
                let mut files = Vec::new();
                let mut moved = Vec::new();
                for key in tree.descendants(&old_path) {
                    if let Some(entry) = tree.nodes.remove(&key) {
                        match entry {
                            Node::Dir => dirs.push(key.clone()),
                            Node::File { .. } => files.push(key.clone()),
                        }
                        moved.push((format!("{new_path}{}", &key[old_path.len()..]), entry));
                    }
                }
                tree.nodes.remove(&old_path);
                tree.nodes.insert(new_path.clone(), Node::Dir);
                tree.nodes.extend(moved);
                result.record_directory_entries(dirs, files);
            }
        }
        debug!(from = %old_path, to = %new_path, "Renamed in memory");
        result
    }

    async fn readdir(&self, path: &str) -> Vec<String> {
        let path = self.resolve_path(path);
        let tree = self.lock();
        if tree.is_dir(&path) {
            tree.children(&path)
        } else {
            Vec::new()
        }
    }

    async fn copy_file(&self, src: &str, dst: &str) -> bool {
        let src = self.resolve_path(src);
        let dst = self.resolve_path(dst);
        let mut tree = self.lock();
        let Some(Node::File { content, .. }) = tree.nodes.get(&src).cloned() else {
            return false;
        };
        if tree.require_parent_dir(&dst).is_err() || tree.is_dir(&dst) {
            return false;
        }
        tree.nodes.insert(
            dst,
            Node::File {
                content,
                mtime_ms: now_ms(),
            },
        );
        true
    }

    async fn realpath(&self, path: &str) -> Option<String> {
        let path = self.resolve_path(path);
        self.lock().nodes.contains_key(&path).then_some(path)
    }

    async fn is_symbolic_link(&self, _path: &str) -> bool {
        false
    }

    fn exit(&self, code: i32) {
        debug!(code, "Exit recorded");
        *self.exit_code.lock().unwrap_or_else(PoisonError::into_inner) = Some(code);
    }

    fn get_compiler_executing_path(&self) -> Option<String> {
        None
    }

    fn get_current_directory(&self) -> String {
        self.cwd.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recursive_mkdir_is_idempotent() {
        let sys = InMemorySystem::new();
        let first = sys.mkdir("/a/b/c", MkdirOptions::recursive()).await;
        assert_eq!(first.new_dirs, vec!["/a", "/a/b", "/a/b/c"]);
        assert_eq!(first.basename, "c");
        assert_eq!(first.dirname, "/a/b");

        let second = sys.mkdir("/a/b/c", MkdirOptions::recursive()).await;
        assert!(second.is_ok());
        assert!(second.new_dirs.is_empty());
    }

    #[tokio::test]
    async fn test_plain_mkdir_needs_parent() {
        let sys = InMemorySystem::new();
        let result = sys.mkdir("/x/y", MkdirOptions::default()).await;
        assert_eq!(result.error.map(|e| e.kind), Some(FsErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_readdir_lists_direct_children_sorted() {
        let sys = InMemorySystem::new().with_files([
            ("/src/b.ts", "b"),
            ("/src/a.ts", "a"),
            ("/src/nested/c.ts", "c"),
        ]);
        assert_eq!(
            sys.readdir("/src").await,
            vec!["/src/a.ts", "/src/b.ts", "/src/nested"]
        );
        assert!(sys.readdir("/src/a.ts").await.is_empty());
    }

    #[tokio::test]
    async fn test_rmdir_non_recursive_refuses_contents() {
        let sys = InMemorySystem::new().with_files([("/d/f.txt", "f")]);
        let result = sys.rmdir("/d", RmdirOptions::default()).await;
        assert_eq!(
            result.error.map(|e| e.kind),
            Some(FsErrorKind::DirectoryNotEmpty)
        );

        let result = sys.rmdir("/d", RmdirOptions::recursive()).await;
        assert!(result.is_ok());
        assert_eq!(result.removed_files, vec!["/d/f.txt"]);
        assert_eq!(result.removed_dirs, vec!["/d"]);
        assert!(!sys.access("/d").await);
    }

    #[tokio::test]
    async fn test_rename_directory_moves_subtree() {
        let sys = InMemorySystem::new().with_files([("/old/sub/m.ts", "m"), ("/old/n.ts", "n")]);
        let result = sys.rename("/old", "/new").await;
        assert!(result.is_ok());
        assert_eq!(result.old_dirs, vec!["/old", "/old/sub"]);
        assert_eq!(result.new_dirs, vec!["/new", "/new/sub"]);
        assert_eq!(result.new_files, vec!["/new/n.ts", "/new/sub/m.ts"]);
        assert_eq!(sys.read_file("/new/sub/m.ts").await.as_deref(), Some("m"));
        assert!(!sys.access("/old").await);
    }

    #[tokio::test]
    async fn test_rename_into_itself_fails() {
        let sys = InMemorySystem::new().with_files([("/d/f", "")]);
        let result = sys.rename("/d", "/d/inner").await;
        assert_eq!(result.error.map(|e| e.kind), Some(FsErrorKind::InvalidInput));
        assert!(sys.access("/d/f").await);
    }

    #[tokio::test]
    async fn test_rename_onto_itself_changes_nothing() {
        let sys = InMemorySystem::new().with_files([("/d/f.ts", "f")]);

        let dir = sys.rename("/d", "/d").await;
        assert!(dir.is_ok());
        assert!(dir.is_directory);
        assert!(dir.new_files.is_empty());

        let file = sys.rename("/d/f.ts", "/d/./f.ts").await;
        assert!(file.is_ok());
        assert!(file.is_file);
        assert_eq!(sys.read_file("/d/f.ts").await.as_deref(), Some("f"));
    }

    #[tokio::test]
    async fn test_rename_directory_onto_file_fails() {
        let sys = InMemorySystem::new().with_files([("/d/inner.ts", "i"), ("/target.ts", "t")]);
        let result = sys.rename("/d", "/target.ts").await;
        assert_eq!(result.error.map(|e| e.kind), Some(FsErrorKind::NotADirectory));
        assert_eq!(sys.read_file("/target.ts").await.as_deref(), Some("t"));
        assert_eq!(sys.read_file("/d/inner.ts").await.as_deref(), Some("i"));
    }

    #[tokio::test]
    async fn test_copy_and_exit() {
        let sys = InMemorySystem::new().with_files([("/a.txt", "hello")]);
        assert!(sys.copy_file("/a.txt", "/b.txt").await);
        assert!(!sys.copy_file("/missing", "/c.txt").await);
        assert_eq!(sys.read_file("/b.txt").await.as_deref(), Some("hello"));

        sys.exit(1);
        assert_eq!(sys.exit_code(), Some(1));
    }
}
