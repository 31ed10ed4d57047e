//! Stdio transport: framed JSON-RPC on a reader, answers on a writer.
//!
//! Reads happen on a dedicated thread so blocking stdin never stalls the
//! runtime; requests are dispatched one at a time in arrival order.

use super::framing::{read_message, write_message, WireFormat};
use super::jsonrpc::{RpcRequest, RpcResponse};
use super::McpServer;
use std::io::{self, BufRead, Write};
use tokio::sync::mpsc;

/// Serve until the reader hits EOF or an unrecoverable read error.
pub async fn serve<R, W>(server: &McpServer, reader: R, mut writer: W) -> io::Result<()>
where
    R: BufRead + Send + 'static,
    W: Write,
{
    let (tx, mut rx) = mpsc::channel::<(Vec<u8>, WireFormat)>(16);

    let reader_thread = std::thread::spawn(move || {
        let mut reader = reader;
        loop {
            match read_message(&mut reader) {
                Ok(Some(message)) => {
                    if tx.blocking_send(message).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    tracing::info!("EOF on input, shutting down");
                    break;
                }
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    tracing::error!(error = %e, "Skipping unreadable message");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read message");
                    break;
                }
            }
        }
    });

    while let Some((body, format)) = rx.recv().await {
        let response = match serde_json::from_slice::<RpcRequest>(&body) {
            Ok(req) => server.dispatch(&req).await,
            Err(e) => {
                tracing::error!(error = %e, "Invalid JSON-RPC");
                Some(RpcResponse::parse_error())
            }
        };

        if let Some(response) = response {
            write_message(&mut writer, &response, format)?;
        }
    }

    if reader_thread.join().is_err() {
        tracing::error!("Input reader thread panicked");
    }
    Ok(())
}
