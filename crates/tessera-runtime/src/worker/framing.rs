//! Controller-side JSON-lines framing over a byte stream.
//!
//! Both launchers hand the controller typed channels; these tasks move
//! envelopes between those channels and the worker's pipes.

use tessera_core::{WorkerId, WorkerRequest, WorkerResponse, encode_line};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Write requests to the worker until the controller drops its sender.
/// Dropping `writer` afterwards closes the worker's input.
pub async fn pump_requests<W>(
    worker: WorkerId,
    mut writer: W,
    mut requests: mpsc::UnboundedReceiver<WorkerRequest>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(request) = requests.recv().await {
        let line = match encode_line(&request) {
            Ok(line) => line,
            Err(e) => {
                warn!(worker = %worker, error = %e, "Failed to encode request");
                continue;
            }
        };
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            debug!(worker = %worker, error = %e, "Worker input closed");
            break;
        }
        if let Err(e) = writer.flush().await {
            debug!(worker = %worker, error = %e, "Worker input closed");
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// Forward decoded responses until the worker's output ends. Dropping the
/// sender on return is what tells the controller the worker is gone.
pub async fn pump_responses<R>(
    worker: WorkerId,
    reader: R,
    responses: mpsc::UnboundedSender<WorkerResponse>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match serde_json::from_str::<WorkerResponse>(&line) {
                Ok(response) => {
                    if responses.send(response).is_err() {
                        trace!(worker = %worker, "Controller stopped listening");
                        break;
                    }
                }
                Err(e) => warn!(worker = %worker, error = %e, "Discarding malformed worker output"),
            },
            Ok(None) => {
                debug!(worker = %worker, "Worker output closed");
                break;
            }
            Err(e) => {
                warn!(worker = %worker, error = %e, "Failed reading worker output");
                break;
            }
        }
    }
}
