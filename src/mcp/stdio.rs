//! Stdio transport for the MCP server
//!
//! # Protocol
//!
//! - Inbound messages are read from stdin, one JSON object per line.
//! - Responses are written to stdout as a single JSON object followed by
//!   a newline. Nothing else may be written to stdout; logs go to stderr.
//!
//! Requests are handled concurrently; a single writer task serializes the
//! responses onto the output stream in completion order.

use super::server::McpServer;
use crate::central::RequestMeta;
use crate::error::{McpError, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Serve MCP over `reader`/`writer` until EOF or `shutdown`
///
/// In-flight requests are cancelled on shutdown; on EOF they are allowed
/// to finish and their responses are still written.
///
/// # Errors
///
/// Returns an error when reading the input or writing a response fails.
pub async fn serve<R, W>(
    server: Arc<McpServer>,
    reader: R,
    writer: W,
    shutdown: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(line) = out_rx.recv().await {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
        Ok::<(), std::io::Error>(())
    });

    let mut lines = BufReader::new(reader).lines();
    let mut in_flight = JoinSet::new();

    tracing::info!("Serving MCP over stdio");
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Stopping stdio server");
                break;
            }
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            tracing::info!("Stdin closed");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let server = server.clone();
        let out_tx = out_tx.clone();
        let cancel = shutdown.child_token();
        in_flight.spawn(async move {
            let response = server
                .handle_message(line.as_bytes(), RequestMeta::without_headers(), cancel)
                .await;
            if let Some(response) = response {
                match serde_json::to_string(&response) {
                    Ok(serialized) => {
                        let _ = out_tx.send(serialized);
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to serialize MCP response"),
                }
            }
        });

        // Reap finished handlers so the set does not grow without bound.
        while in_flight.try_join_next().is_some() {}
    }

    while in_flight.join_next().await.is_some() {}
    drop(out_tx);

    writer_task
        .await
        .map_err(|e| McpError::Transport(format!("stdio writer task failed: {}", e)))??;
    Ok(())
}
