//! Behaviour every `CompilerSystem` adapter must share.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;
use tessera_core::{
    CompilerSystem, CopyDiagnosticLevel, CopyTask, FsErrorKind, MkdirOptions, destroy_hook,
};
use tessera_runtime::{InMemorySystem, ProcessHost, ProcessSystem, SandboxPolicy, SandboxedSystem};

/// Each adapter rooted so that `root` is writable.
fn adapters(dir: &TempDir) -> Vec<(&'static str, Box<dyn CompilerSystem>, String)> {
    let root = dir.path().to_string_lossy().into_owned();
    let policy = SandboxPolicy::new()
        .allow_read(&root)
        .unwrap()
        .allow_write(&root)
        .unwrap();

    vec![
        ("memory", Box::new(InMemorySystem::new()), "/work".to_string()),
        (
            "process",
            Box::new(ProcessSystem::new(ProcessHost::at(dir.path()))),
            root.clone(),
        ),
        (
            "sandboxed",
            Box::new(SandboxedSystem::new(ProcessHost::at(dir.path()), policy)),
            root,
        ),
    ]
}

#[tokio::test]
async fn test_access_is_false_for_missing_paths() {
    let dir = TempDir::new().unwrap();
    for (name, system, root) in adapters(&dir) {
        let missing = format!("{root}/no/such/file.ts");
        assert!(!system.access(&missing).await, "{name}");
        assert!(system.stat(&missing).await.is_none(), "{name}");
        assert!(system.read_file(&missing).await.is_none(), "{name}");
        assert!(system.readdir(&missing).await.is_empty(), "{name}");
    }
}

#[tokio::test]
async fn test_recursive_mkdir_is_idempotent() {
    let dir = TempDir::new().unwrap();
    for (name, system, root) in adapters(&dir) {
        let deep = format!("{root}/a/b/c");

        let first = system.mkdir(&deep, MkdirOptions::recursive()).await;
        assert!(first.is_ok(), "{name}: {:?}", first.error);
        assert_eq!(first.basename, "c", "{name}");
        assert!(first.new_dirs.contains(&deep), "{name}");

        let second = system.mkdir(&deep, MkdirOptions::recursive()).await;
        assert!(second.is_ok(), "{name}");
        assert!(second.new_dirs.is_empty(), "{name}");

        let stat = system.stat(&deep).await.unwrap();
        assert!(stat.is_directory, "{name}");
    }
}

#[tokio::test]
async fn test_non_recursive_mkdir_needs_parent() {
    let dir = TempDir::new().unwrap();
    for (name, system, root) in adapters(&dir) {
        let result = system
            .mkdir(&format!("{root}/x/y"), MkdirOptions::default())
            .await;
        let error = result.error.unwrap_or_else(|| panic!("{name} created x/y"));
        assert_eq!(error.kind, FsErrorKind::NotFound, "{name}");
    }
}

#[tokio::test]
async fn test_write_read_unlink_then_destroy() {
    let dir = TempDir::new().unwrap();
    for (name, system, root) in adapters(&dir) {
        let file = format!("{root}/out/main.js");
        system
            .mkdir(&format!("{root}/out"), MkdirOptions::recursive())
            .await;

        let written = system.write_file(&file, "export {};\n").await;
        assert!(written.is_ok(), "{name}: {:?}", written.error);
        assert_eq!(
            system.read_file(&file).await.as_deref(),
            Some("export {};\n"),
            "{name}"
        );
        assert!(system.access(&file).await, "{name}");

        let removed = system.unlink(&file).await;
        assert!(removed.is_ok(), "{name}");
        assert!(removed.removed_files.is_empty(), "{name}");
        assert!(!system.access(&file).await, "{name}");

        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        system.add_destroy(destroy_hook(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }));

        let summary = system.destroy().await;
        assert_eq!(summary.invoked, 1, "{name}");
        assert_eq!(ran.load(Ordering::SeqCst), 1, "{name}");

        // Second drain has nothing left to run.
        assert_eq!(system.destroy().await.invoked, 0, "{name}");
    }
}

#[tokio::test]
async fn test_shared_helpers_agree_across_adapters() {
    let dir = TempDir::new().unwrap();
    let results: Vec<(String, String)> = adapters(&dir)
        .into_iter()
        .map(|(_, system, _)| {
            (
                system.generate_content_hash(b"tessera", Some(12)),
                system.encode_to_base64("tessera"),
            )
        })
        .collect();

    assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(results[0].0.len(), 12);
    assert_eq!(results[0].1, "dGVzc2VyYQ==");
}

#[tokio::test]
async fn test_copy_tasks_copy_trees_and_report_missing_sources() {
    let dir = TempDir::new().unwrap();
    for (name, system, root) in adapters(&dir) {
        let src = format!("{root}/src");
        assert!(system.mkdir(&format!("{src}/assets/icons"), MkdirOptions::recursive()).await.is_ok());
        for (path, content) in [
            ("assets/logo.svg", "logo"),
            ("assets/icons/a.svg", "a"),
            ("assets/.DS_Store", "junk"),
            ("readme.md", "hi"),
        ] {
            assert!(system.write_file(&format!("{src}/{path}"), content).await.is_ok(), "{name}");
        }

        let tasks = [
            CopyTask::new("assets", format!("{root}/www/assets")),
            CopyTask::new("readme.md", format!("{root}/www/readme.md")),
            CopyTask::new("assets/logo.svg", format!("{root}/flat")).keep_dir_structure(),
            CopyTask::new("missing.txt", format!("{root}/www/missing.txt")).warn(),
            CopyTask::new("gone.txt", format!("{root}/www/gone.txt")),
        ];
        let results = system.copy(&tasks, &src).await;

        assert_eq!(
            results.file_paths,
            vec![
                format!("{root}/flat/assets/logo.svg"),
                format!("{root}/www/assets/icons/a.svg"),
                format!("{root}/www/assets/logo.svg"),
                format!("{root}/www/readme.md"),
            ],
            "{name}"
        );
        for created in ["www", "www/assets", "www/assets/icons", "flat/assets"] {
            assert!(
                results.dir_paths.contains(&format!("{root}/{created}")),
                "{name}: {created} not reported"
            );
        }
        assert_eq!(results.diagnostics.len(), 1, "{name}: {:?}", results.diagnostics);
        assert_eq!(results.diagnostics[0].level, CopyDiagnosticLevel::Warn, "{name}");
        assert!(!results.has_errors(), "{name}");

        assert_eq!(
            system.read_file(&format!("{root}/www/assets/icons/a.svg")).await.as_deref(),
            Some("a"),
            "{name}"
        );
        assert!(!system.access(&format!("{root}/www/assets/.DS_Store")).await, "{name}");
    }
}
