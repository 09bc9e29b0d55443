//! Forward-slash path utilities shared by every host adapter.
//!
//! Paths handed across the `CompilerSystem` boundary are plain strings with
//! `/` separators regardless of platform. These helpers are purely lexical:
//! they never touch the filesystem.

/// Normalize a path to forward slashes and resolve `.` / `..` segments.
///
/// Leading `..` segments of relative paths are kept; `..` above the root of
/// an absolute path is dropped. A trailing slash is removed except for the
/// root itself. An empty input normalizes to `"."`.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    if unified.is_empty() {
        return ".".to_string();
    }

    let (prefix, rest) = split_root(&unified);
    let mut segments: Vec<&str> = Vec::new();

    for segment in rest.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if prefix.is_empty() {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    match (prefix.is_empty(), joined.is_empty()) {
        (true, true) => ".".to_string(),
        (true, false) => joined,
        (false, true) => prefix,
        (false, false) => format!("{prefix}{joined}"),
    }
}

/// Split an already slash-unified path into its root prefix and remainder.
///
/// The prefix is `"/"` for POSIX absolute paths, `"C:/"` for drive-rooted
/// Windows paths and empty for relative paths.
fn split_root(path: &str) -> (String, &str) {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        let drive = path[..2].to_ascii_uppercase();
        let rest = path[2..].trim_start_matches('/');
        return (format!("{drive}/"), rest);
    }
    if let Some(rest) = path.strip_prefix('/') {
        return ("/".to_string(), rest);
    }
    (String::new(), path)
}

/// Whether a path is absolute (POSIX root or drive-rooted).
pub fn is_absolute(path: &str) -> bool {
    let unified = path.replace('\\', "/");
    !split_root(&unified).0.is_empty()
}

/// Join `child` onto `base` and normalize the result.
///
/// An absolute `child` replaces `base` entirely.
pub fn join_paths(base: &str, child: &str) -> String {
    if is_absolute(child) {
        return normalize_path(child);
    }
    normalize_path(&format!("{base}/{child}"))
}

/// Resolve `path` against `cwd` when it is relative.
pub fn resolve_against(cwd: &str, path: &str) -> String {
    join_paths(cwd, path)
}

/// Parent directory of a normalized path.
///
/// The parent of the root is the root; the parent of a single relative
/// segment is `"."`.
pub fn dirname(path: &str) -> String {
    let normalized = normalize_path(path);
    let (prefix, rest) = split_root(&normalized);
    match rest.rfind('/') {
        Some(idx) => format!("{prefix}{}", &rest[..idx]),
        None if prefix.is_empty() => ".".to_string(),
        None => prefix,
    }
}

/// Final segment of a normalized path, empty for a root.
pub fn basename(path: &str) -> String {
    let normalized = normalize_path(path);
    let (_, rest) = split_root(&normalized);
    rest.rsplit('/').next().unwrap_or_default().to_string()
}

/// Every ancestor of `path` below its root, ordered root-to-leaf and
/// including `path` itself.
///
/// `"/a/b/c"` yields `["/a", "/a/b", "/a/b/c"]`.
pub fn ancestors_root_to_leaf(path: &str) -> Vec<String> {
    let normalized = normalize_path(path);
    let (prefix, rest) = split_root(&normalized);
    if rest.is_empty() || rest == "." {
        return Vec::new();
    }

    let mut out = Vec::new();
    let mut current = prefix;
    for segment in rest.split('/') {
        if !current.is_empty() && !current.ends_with('/') {
            current.push('/');
        }
        current.push_str(segment);
        out.push(current.clone());
    }
    out
}

/// Whether `path` equals `root` or lies beneath it (both normalized).
pub fn is_within(root: &str, path: &str) -> bool {
    let root = normalize_path(root);
    let path = normalize_path(path);
    if root == "/" {
        return path.starts_with('/');
    }
    path == root || path.starts_with(&format!("{}/", root.trim_end_matches('/')))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_unifies_separators() {
        assert_eq!(normalize_path("C:\\Users\\dev\\app"), "C:/Users/dev/app");
        assert_eq!(normalize_path("c:\\src"), "C:/src");
        assert_eq!(normalize_path("/a//b///c/"), "/a/b/c");
    }

    #[test]
    fn test_normalize_resolves_dots() {
        assert_eq!(normalize_path("/a/./b/../c"), "/a/c");
        assert_eq!(normalize_path("/.."), "/");
        assert_eq!(normalize_path("../x/../../y"), "../../y");
        assert_eq!(normalize_path(""), ".");
        assert_eq!(normalize_path("./"), ".");
    }

    #[test]
    fn test_join_and_resolve() {
        assert_eq!(join_paths("/src/components", "button.tsx"), "/src/components/button.tsx");
        assert_eq!(join_paths("/src", "../www/index.html"), "/www/index.html");
        assert_eq!(join_paths("/src", "/abs/file"), "/abs/file");
        assert_eq!(resolve_against("/work", "a/b"), "/work/a/b");
    }

    #[test]
    fn test_dirname_and_basename() {
        assert_eq!(dirname("/a/b/c.txt"), "/a/b");
        assert_eq!(dirname("/a"), "/");
        assert_eq!(dirname("/"), "/");
        assert_eq!(dirname("file.txt"), ".");
        assert_eq!(basename("/a/b/c.txt"), "c.txt");
        assert_eq!(basename("/"), "");
    }

    #[test]
    fn test_ancestors_root_to_leaf() {
        assert_eq!(
            ancestors_root_to_leaf("/a/b/c"),
            vec!["/a".to_string(), "/a/b".to_string(), "/a/b/c".to_string()]
        );
        assert!(ancestors_root_to_leaf("/").is_empty());
        assert_eq!(
            ancestors_root_to_leaf("C:\\x\\y"),
            vec!["C:/x".to_string(), "C:/x/y".to_string()]
        );
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("/project", "/project/src/a.ts"));
        assert!(is_within("/project", "/project"));
        assert!(!is_within("/project", "/project-other/a.ts"));
        assert!(!is_within("/project", "/project/../etc/passwd"));
        assert!(is_within("/", "/anything"));
    }
}
