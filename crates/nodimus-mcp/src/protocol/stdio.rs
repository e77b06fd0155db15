//! stdio Transport
//!
//! Handles JSON-RPC communication over stdin/stdout. Logs go to stderr so
//! stdout carries nothing but responses.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::server::MemoryServer;

/// Sent when a response cannot be serialized, so the client doesn't hang
const FALLBACK_ERROR: &str =
    r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error"}}"#;

/// stdio Transport for the memory server
pub struct StdioTransport;

impl StdioTransport {
    pub fn new() -> Self {
        Self
    }

    /// Serve requests from the process's stdin until EOF or `shutdown`
    pub async fn run(self, server: &MemoryServer, shutdown: CancellationToken) -> io::Result<()> {
        let reader = BufReader::new(tokio::io::stdin());
        let writer = tokio::io::stdout();
        self.run_with(server, reader, writer, shutdown).await
    }

    /// Serve requests from `reader`, writing responses to `writer`
    pub async fn run_with<R, W>(
        self,
        server: &MemoryServer,
        reader: R,
        mut writer: W,
        shutdown: CancellationToken,
    ) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();

        loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Transport shutting down");
                    break;
                }
                line = lines.next_line() => line,
            };

            let line = match line {
                Ok(Some(l)) => l,
                Ok(None) => {
                    debug!("stdin closed");
                    break;
                }
                Err(e) => {
                    error!("Failed to read line: {}", e);
                    break;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            debug!("Received: {} bytes", line.len());

            // Parse JSON-RPC request
            let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
                Ok(request) => server.handle_request(request).await,
                Err(e) => {
                    warn!("Failed to parse request: {}", e);
                    Some(JsonRpcResponse::error(None, JsonRpcError::parse_error()))
                }
            };

            if let Some(response) = response {
                write_response(&mut writer, &response).await?;
            }
        }

        writer.flush().await
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &JsonRpcResponse,
) -> io::Result<()> {
    let mut payload = match serde_json::to_string(response) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            FALLBACK_ERROR.to_string()
        }
    };
    debug!("Sending: {} bytes", payload.len());
    payload.push('\n');
    writer.write_all(payload.as_bytes()).await?;
    writer.flush().await
}
