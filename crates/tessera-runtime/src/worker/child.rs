//! Worker-side request loop.

use std::io;
use std::sync::Arc;

use tessera_core::{WorkerRequest, WorkerResponse, encode_line};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::handlers::TaskHandlerRegistry;

/// Serve tasks read from `reader`, writing results to `writer`.
///
/// Announces itself with `Ready`, runs tasks concurrently, and returns once
/// `Exit` arrives or the input ends and every started task has answered.
pub async fn run_worker<R, W>(
    reader: R,
    writer: W,
    registry: Arc<TaskHandlerRegistry>,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(write_responses(writer, rx));
    let _ = tx.send(WorkerResponse::Ready {
        pid: Some(std::process::id()),
    });

    let mut lines = BufReader::new(reader).lines();
    let mut running = JoinSet::new();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<WorkerRequest>(&line) {
            Ok(WorkerRequest::Task(task)) => {
                let registry = Arc::clone(&registry);
                let tx = tx.clone();
                running.spawn(async move {
                    let result = registry.run(task).await;
                    let _ = tx.send(WorkerResponse::Result(result));
                });
            }
            Ok(WorkerRequest::Exit) => {
                debug!("Exit requested");
                break;
            }
            Err(e) => warn!(error = %e, "Discarding malformed request"),
        }
        while running.try_join_next().is_some() {}
    }

    while running.join_next().await.is_some() {}
    drop(tx);
    writer_task.await.map_err(io::Error::other)?
}

async fn write_responses<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<WorkerResponse>,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let line = encode_line(&response).map_err(io::Error::other)?;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    writer.shutdown().await
}
