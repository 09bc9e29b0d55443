//! Bulk copy of files and directory trees through a `CompilerSystem`.
//!
//! Only the port's own primitives are used, so a sandboxed host confines
//! every read and write. A failed entry is reported as a diagnostic and the
//! remaining tasks still run.

use tracing::debug;

use crate::domain::{CopyDiagnosticLevel, CopyResults, CopyTask, MkdirOptions};
use crate::paths::{basename, dirname, is_within, join_paths, resolve_against};
use crate::ports::CompilerSystem;

/// Editor and OS droppings never copied out of a directory.
const IGNORED_NAMES: &[&str] = &[".ds_store", ".gitignore", "desktop.ini", "thumbs.db"];

/// Run `tasks` with relative sources and destinations resolved against
/// `src_dir`.
pub async fn copy_tasks<S>(system: &S, tasks: &[CopyTask], src_dir: &str) -> CopyResults
where
    S: CompilerSystem + ?Sized,
{
    let src_dir = system.resolve_path(src_dir);
    let mut results = CopyResults::default();

    for task in tasks {
        let src = resolve_against(&src_dir, &task.src);
        let mut dest = resolve_against(&src_dir, &task.dest);
        if task.keep_dir_structure {
            dest = join_paths(&dest, &relative_below(&src_dir, &src));
        }

        match system.stat(&src).await {
            None if task.warn => results.push(
                CopyDiagnosticLevel::Warn,
                format!("Unable to copy {src}: no such file or directory"),
            ),
            None => debug!(src = %src, "Copy source missing, skipped"),
            Some(stat) if stat.is_directory => {
                copy_tree(system, &src, &dest, &mut results).await;
            }
            Some(_) => copy_one(system, &src, &dest, &mut results).await,
        }
    }

    results.dir_paths.sort();
    results.dir_paths.dedup();
    results.file_paths.sort();
    results.file_paths.dedup();
    debug!(
        dirs = results.dir_paths.len(),
        files = results.file_paths.len(),
        diagnostics = results.diagnostics.len(),
        "Copy tasks finished"
    );
    results
}

/// `path` relative to `root`, or its basename when it lies elsewhere.
fn relative_below(root: &str, path: &str) -> String {
    if is_within(root, path) && path != root {
        path[root.trim_end_matches('/').len()..]
            .trim_start_matches('/')
            .to_string()
    } else {
        basename(path)
    }
}

async fn ensure_dir<S>(system: &S, dir: &str, results: &mut CopyResults) -> bool
where
    S: CompilerSystem + ?Sized,
{
    let made = system.mkdir(dir, MkdirOptions::recursive()).await;
    results.dir_paths.extend(made.new_dirs);
    match made.error {
        Some(error) => {
            results.push(
                CopyDiagnosticLevel::Error,
                format!("Unable to create {dir}: {error}"),
            );
            false
        }
        None => true,
    }
}

async fn copy_one<S>(system: &S, src: &str, dest: &str, results: &mut CopyResults)
where
    S: CompilerSystem + ?Sized,
{
    if !ensure_dir(system, &dirname(dest), results).await {
        return;
    }
    if system.copy_file(src, dest).await {
        results.file_paths.push(dest.to_string());
    } else {
        results.push(
            CopyDiagnosticLevel::Error,
            format!("Unable to copy {src} to {dest}"),
        );
    }
}

async fn copy_tree<S>(system: &S, src: &str, dest: &str, results: &mut CopyResults)
where
    S: CompilerSystem + ?Sized,
{
    let mut pending = vec![(src.to_string(), dest.to_string())];
    while let Some((from, to)) = pending.pop() {
        if !ensure_dir(system, &to, results).await {
            continue;
        }
        for child in system.readdir(&from).await {
            let name = basename(&child);
            if IGNORED_NAMES.contains(&name.to_lowercase().as_str()) {
                continue;
            }
            let target = join_paths(&to, &name);
            match system.stat(&child).await {
                Some(stat) if stat.is_directory => pending.push((child, target)),
                Some(_) => copy_one(system, &child, &target, results).await,
                None => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_below_root() {
        assert_eq!(relative_below("/src", "/src/assets/logo.svg"), "assets/logo.svg");
        assert_eq!(relative_below("/src/", "/src/a"), "a");
        assert_eq!(relative_below("/src", "/elsewhere/b.txt"), "b.txt");
        assert_eq!(relative_below("/src", "/src"), "src");
    }
}
