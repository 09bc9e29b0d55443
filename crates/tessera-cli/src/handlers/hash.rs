//! Hash command handler.

use serde_json::{Value, json};
use tessera_core::{
    CompilerSystem, CoreError, FULL_HASH_LENGTH, FsError, TaskRequest, WorkerController,
};

use crate::bootstrap::CliContext;
use crate::error::CliError;

/// Hash each file on the worker pool and print `<digest>  <path>`.
pub async fn execute(
    ctx: &CliContext,
    files: &[String],
    length: Option<usize>,
) -> Result<(), CliError> {
    let workers = ctx.workers().await?;
    for (path, digest) in digests(ctx.system.as_ref(), workers, files, length).await? {
        println!("{digest}  {path}");
    }
    Ok(())
}

/// Read every file first, then fan the hashing out across the pool.
async fn digests(
    system: &dyn CompilerSystem,
    workers: &WorkerController,
    files: &[String],
    length: Option<usize>,
) -> Result<Vec<(String, String)>, CliError> {
    if let Some(n) = length
        && !(1..=FULL_HASH_LENGTH).contains(&n)
    {
        return Err(CoreError::Validation(format!(
            "--length must be between 1 and {FULL_HASH_LENGTH}"
        ))
        .into());
    }

    let mut pending = Vec::with_capacity(files.len());
    for file in files {
        let path = system.resolve_path(file);
        let content = system
            .read_file(&path)
            .await
            .ok_or_else(|| CoreError::fs("read", &path, FsError::not_found(&path)))?;

        let mut payload = json!({ "content": content });
        if let Some(n) = length {
            payload["length"] = json!(n);
        }
        let handle = workers
            .dispatch(TaskRequest::new("contentHash", payload))
            .await
            .map_err(CoreError::from)?;
        pending.push((path, handle));
    }

    let mut out = Vec::with_capacity(pending.len());
    for (path, handle) in pending {
        let digest = match handle.await.map_err(CoreError::from)? {
            Value::String(digest) => digest,
            other => {
                return Err(CliError::Host(format!(
                    "worker returned a non-string digest for {path}: {other}"
                )));
            }
        };
        out.push((path, digest));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tessera_core::{WorkerLauncher, WorkerPoolConfig, generate_content_hash};
    use tessera_runtime::{InMemorySystem, InProcessWorkerLauncher};

    async fn pool() -> WorkerController {
        let launcher: Arc<dyn WorkerLauncher> = Arc::new(InProcessWorkerLauncher::default());
        WorkerController::start(
            launcher,
            WorkerPoolConfig::new(2, 1, Duration::from_millis(100)),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_digests_follow_argument_order() {
        let system = InMemorySystem::new()
            .with_files([("/src/a.ts", "export const a = 1;"), ("/src/b.ts", "")]);
        let workers = pool().await;
        let files = vec!["/src/b.ts".to_string(), "/src/a.ts".to_string()];

        let out = digests(&system, &workers, &files, Some(10)).await.unwrap();
        assert_eq!(
            out,
            vec![
                ("/src/b.ts".to_string(), generate_content_hash(b"", Some(10))),
                (
                    "/src/a.ts".to_string(),
                    generate_content_hash(b"export const a = 1;", Some(10))
                ),
            ]
        );
        workers.shutdown(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn test_missing_file_and_bad_length() {
        let system = InMemorySystem::new();
        let workers = pool().await;

        let err = digests(&system, &workers, &["/nope.ts".to_string()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Core(CoreError::Fs { .. })));
        assert_eq!(err.exit_code(), 1);

        let err = digests(&system, &workers, &[], Some(0)).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);

        workers.shutdown(Duration::from_millis(100)).await;
    }
}
