//! Newline-delimited JSON-RPC over stdio.
//!
//! One message per line in each direction. Every request runs in its own
//! task, and responses funnel through a single writer task so lines never
//! interleave. `notifications/cancelled` trips the token of the named
//! in-flight request; a cancelled request gets no response.

use crate::error::{McpError, McpResult};
use crate::protocol::{error_codes, CancelledParams, JsonRpcRequest, JsonRpcResponse, RequestId};
use crate::serve::{McpServer, McpToolContext};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Longest accepted request line.
pub const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

type InFlight = Arc<Mutex<HashMap<RequestId, CancellationToken>>>;

/// Serve `server` on the process's stdin and stdout.
pub async fn serve_stdio(server: Arc<McpServer>) -> McpResult<()> {
    serve(server, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Serve `server` over any line-oriented byte stream pair.
///
/// Returns once `reader` reaches EOF and every in-flight request has been
/// answered.
pub async fn serve<R, W>(server: Arc<McpServer>, reader: R, writer: W) -> McpResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(write_responses(writer, rx));
    let in_flight: InFlight = Arc::new(Mutex::new(HashMap::new()));
    let mut tasks = JoinSet::new();
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));

    info!("MCP server listening on stdio");

    let mut result = Ok(());
    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                warn!("Dropping oversized MCP message");
                let _ = tx.send(JsonRpcResponse::error(
                    None,
                    error_codes::INVALID_REQUEST,
                    "Message too long",
                ));
                continue;
            }
            Err(e) => {
                result = Err(McpError::from(e));
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let request = match parse_request(&line) {
            Ok(request) => request,
            Err(response) => {
                let _ = tx.send(response);
                continue;
            }
        };

        let Some(id) = request.id.clone() else {
            handle_notification(&request, &in_flight);
            continue;
        };

        let token = CancellationToken::new();
        in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), token.clone());

        let server = server.clone();
        let in_flight = in_flight.clone();
        let tx = tx.clone();
        tasks.spawn(async move {
            let ctx = McpToolContext::new(id.to_string()).with_abort(token.clone());
            let response = server.handle_request(request, &ctx).await;
            in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);

            if token.is_cancelled() {
                debug!(id = %id, "Request cancelled, dropping response");
                return;
            }
            if let Some(response) = response {
                let _ = tx.send(response);
            }
        });

        while tasks.try_join_next().is_some() {}
    }

    debug!(pending = tasks.len(), "MCP input closed, draining requests");
    while tasks.join_next().await.is_some() {}
    drop(tx);

    match writer_task.await {
        Ok(written) => result.and(written),
        Err(e) => Err(McpError::connection_closed(format!("writer task failed: {e}"))),
    }
}

/// Parse one line, or produce the error response it deserves.
fn parse_request(line: &str) -> Result<JsonRpcRequest, JsonRpcResponse> {
    let value: Value = serde_json::from_str(line).map_err(|e| {
        JsonRpcResponse::error(None, error_codes::PARSE_ERROR, format!("Parse error: {e}"))
    })?;

    serde_json::from_value(value.clone()).map_err(|e| {
        let id = value
            .get("id")
            .and_then(|id| serde_json::from_value(id.clone()).ok());
        JsonRpcResponse::error(id, error_codes::INVALID_REQUEST, format!("Invalid request: {e}"))
    })
}

fn handle_notification(request: &JsonRpcRequest, in_flight: &InFlight) {
    match request.method.as_str() {
        "notifications/initialized" => debug!("Received initialized notification"),
        "notifications/cancelled" => {
            let params = request
                .params
                .clone()
                .and_then(|p| serde_json::from_value::<CancelledParams>(p).ok());
            let Some(params) = params else {
                warn!("Ignoring malformed cancellation");
                return;
            };
            let token = in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&params.request_id)
                .cloned();
            match token {
                Some(token) => {
                    info!(id = %params.request_id, reason = ?params.reason, "Cancelling request");
                    token.cancel();
                }
                None => debug!(id = %params.request_id, "Cancellation for unknown request"),
            }
        }
        other => debug!(method = %other, "Received unknown notification"),
    }
}

async fn write_responses<W>(writer: W, mut rx: mpsc::UnboundedReceiver<JsonRpcResponse>) -> McpResult<()>
where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(writer, LinesCodec::new());
    while let Some(response) = rx.recv().await {
        let line = serde_json::to_string(&response)?;
        sink.send(line).await?;
    }
    Ok(())
}
