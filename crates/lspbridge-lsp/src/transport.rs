//! LSP transport implementation (JSON-RPC over stdio).
//!
//! A single reader task owns the server's stdout. Responses are routed to the
//! waiting request by id, server-initiated requests are answered in place and
//! notifications are forwarded on a channel.

use crate::error::{LspError, LspResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, trace, warn};

/// JSON-RPC error code for unknown methods.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    fn method_not_found(method: &str) -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: format!("Method not found: {method}"),
            data: None,
        }
    }
}

/// JSON-RPC notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
        }
    }
}

/// A message read from the server, classified by shape.
#[derive(Debug)]
enum Incoming {
    Response(JsonRpcResponse),
    Request {
        id: Value,
        method: String,
        params: Option<Value>,
    },
    Notification(JsonRpcNotification),
}

fn classify(value: Value) -> LspResult<Incoming> {
    let has_method = value.get("method").is_some();
    let has_id = value.get("id").map(|id| !id.is_null()).unwrap_or(false);

    match (has_method, has_id) {
        (true, true) => {
            let id = value.get("id").cloned().unwrap_or(Value::Null);
            let method = value
                .get("method")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let params = value.get("params").cloned();
            Ok(Incoming::Request { id, method, params })
        }
        (true, false) => Ok(Incoming::Notification(serde_json::from_value(value)?)),
        (false, true) => Ok(Incoming::Response(serde_json::from_value(value)?)),
        (false, false) => Err(LspError::protocol_error(
            "Message is neither request, response nor notification",
        )),
    }
}

/// Answer a request the server sent to us.
///
/// The bridge has no user interface and applies no server-driven edits.
pub fn server_request_reply(method: &str, params: Option<&Value>) -> Result<Value, JsonRpcError> {
    match method {
        "workspace/configuration" => {
            let count = params
                .and_then(|p| p.get("items"))
                .and_then(Value::as_array)
                .map(Vec::len)
                .unwrap_or(0);
            Ok(Value::Array(vec![Value::Null; count]))
        }
        "client/registerCapability"
        | "client/unregisterCapability"
        | "window/workDoneProgress/create"
        | "window/showMessageRequest" => Ok(Value::Null),
        "workspace/applyEdit" => Ok(json!({
            "applied": false,
            "failureReason": "Server-initiated edits are not supported"
        })),
        "workspace/workspaceFolders" => Ok(Value::Null),
        _ => Err(JsonRpcError::method_not_found(method)),
    }
}

type PendingMap = Arc<std::sync::Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;
type SharedWriter = Arc<Mutex<Option<Box<dyn AsyncWrite + Send + Unpin>>>>;

/// Removes a pending entry when the waiting request is dropped or finished.
struct PendingGuard {
    pending: PendingMap,
    id: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// LSP transport over stdio.
pub struct LspTransport {
    child: Mutex<Option<Child>>,
    writer: SharedWriter,
    pending: PendingMap,
    next_id: AtomicU64,
    request_timeout: Duration,
}

impl LspTransport {
    /// Spawn the server process and start the reader task.
    ///
    /// Returns the transport and the stream of server notifications.
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        cwd: Option<&Path>,
        request_timeout: Duration,
    ) -> LspResult<(Self, mpsc::UnboundedReceiver<JsonRpcNotification>)> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .envs(env)
            .kill_on_drop(true);

        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        debug!(command = command, args = ?args, "Starting LSP server");

        let mut child = cmd
            .spawn()
            .map_err(|e| LspError::ProcessError(format!("Failed to start {command}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LspError::ProcessError("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LspError::ProcessError("Failed to get stdout".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_logger(stderr);
        }

        let (transport, notifications) = Self::from_io(stdout, stdin, request_timeout);
        *transport.child.lock().await = Some(child);
        Ok((transport, notifications))
    }

    /// Build a transport over an arbitrary reader/writer pair.
    pub fn from_io<R, W>(
        reader: R,
        writer: W,
        request_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<JsonRpcNotification>)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let boxed: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        let writer: SharedWriter = Arc::new(Mutex::new(Some(boxed)));
        let pending: PendingMap = Arc::new(std::sync::Mutex::new(HashMap::new()));
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();

        tokio::spawn(reader_loop(
            BufReader::new(reader),
            Arc::clone(&pending),
            Arc::clone(&writer),
            notify_tx,
        ));

        let transport = Self {
            child: Mutex::new(None),
            writer,
            pending,
            next_id: AtomicU64::new(1),
            request_timeout,
        };
        (transport, notify_rx)
    }

    /// Send a request and wait for its result using the default timeout.
    pub async fn request(&self, method: &str, params: Option<Value>) -> LspResult<Value> {
        self.request_with_timeout(method, params, self.request_timeout)
            .await
    }

    /// Send a request and wait for its result.
    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> LspResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        let _guard = PendingGuard {
            pending: Arc::clone(&self.pending),
            id,
        };

        let request = JsonRpcRequest::new(id, method, params);
        self.send(&serde_json::to_vec(&request)?).await?;

        let response = match tokio::time::timeout(timeout, rx).await {
            Err(_) => {
                warn!(method, id, "LSP request timed out");
                return Err(LspError::timeout(method, timeout));
            }
            Ok(Err(_)) => {
                return Err(LspError::connection_failed(format!(
                    "Server closed connection during {method}"
                )))
            }
            Ok(Ok(response)) => response,
        };

        if let Some(error) = response.error {
            return Err(LspError::request_failed(format!(
                "{method}: {} (code {})",
                error.message, error.code
            )));
        }

        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Send a notification.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> LspResult<()> {
        let notification = JsonRpcNotification::new(method, params);
        self.send(&serde_json::to_vec(&notification)?).await
    }

    async fn send(&self, content: &[u8]) -> LspResult<()> {
        write_to_shared(&self.writer, content).await
    }

    /// Close the transport.
    pub async fn close(&self) -> LspResult<()> {
        *self.writer.lock().await = None;

        let mut child_guard = self.child.lock().await;
        if let Some(mut child) = child_guard.take() {
            match tokio::time::timeout(Duration::from_millis(500), child.wait()).await {
                Ok(Ok(status)) => debug!(%status, "LSP server exited"),
                _ => {
                    let _ = child.kill().await;
                }
            }
        }

        debug!("Closed LSP server transport");
        Ok(())
    }
}

impl Drop for LspTransport {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.child.try_lock() {
            if let Some(ref mut child) = *guard {
                let _ = child.start_kill();
            }
        }
    }
}

async fn write_to_shared(writer: &SharedWriter, content: &[u8]) -> LspResult<()> {
    let mut guard = writer.lock().await;
    let writer = guard
        .as_mut()
        .ok_or_else(|| LspError::connection_failed("Transport closed"))?;
    write_message(writer, content).await
}

/// Write one framed LSP message.
pub async fn write_message<W>(writer: &mut W, content: &[u8]) -> LspResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    trace!(message = %String::from_utf8_lossy(content), "Sending LSP message");
    let header = format!("Content-Length: {}\r\n\r\n", content.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(content).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed LSP message. Returns `None` on a clean end of stream.
pub async fn read_message<R>(reader: &mut R) -> LspResult<Option<Value>>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut saw_header = false;

    loop {
        let mut line = String::new();
        let bytes = reader.read_line(&mut line).await?;
        if bytes == 0 {
            if saw_header {
                return Err(LspError::connection_failed("Server closed connection"));
            }
            return Ok(None);
        }
        saw_header = true;

        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }

        if let Some(len_str) = line.strip_prefix("Content-Length:") {
            content_length = Some(
                len_str
                    .trim()
                    .parse()
                    .map_err(|_| LspError::protocol_error("Invalid Content-Length"))?,
            );
        }
    }

    let content_length = content_length
        .ok_or_else(|| LspError::protocol_error("Missing Content-Length header"))?;

    let mut content = vec![0u8; content_length];
    reader.read_exact(&mut content).await?;
    trace!(content = %String::from_utf8_lossy(&content), "Received LSP message");

    Ok(Some(serde_json::from_slice(&content)?))
}

async fn reader_loop<R>(
    mut reader: R,
    pending: PendingMap,
    writer: SharedWriter,
    notifications: mpsc::UnboundedSender<JsonRpcNotification>,
) where
    R: AsyncBufRead + Unpin,
{
    loop {
        let value = match read_message(&mut reader).await {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!("LSP server closed stdout");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read LSP message");
                break;
            }
        };

        match classify(value) {
            Ok(Incoming::Response(response)) => {
                let Some(id) = response.id.as_u64() else {
                    debug!(id = %response.id, "Response with non-numeric id");
                    continue;
                };
                let sender = pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id);
                match sender {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => debug!(id, "Response for unknown or abandoned request"),
                }
            }
            Ok(Incoming::Request { id, method, params }) => {
                debug!(method = %method, "Server request");
                let reply = match server_request_reply(&method, params.as_ref()) {
                    Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
                    Err(error) => json!({ "jsonrpc": "2.0", "id": id, "error": error }),
                };
                let sent = match serde_json::to_vec(&reply) {
                    Ok(bytes) => write_to_shared(&writer, &bytes).await,
                    Err(e) => Err(e.into()),
                };
                if let Err(e) = sent {
                    warn!(method = %method, error = %e, "Failed to answer server request");
                }
            }
            Ok(Incoming::Notification(notification)) => {
                if notifications.send(notification).is_err() {
                    trace!("Notification receiver dropped");
                }
            }
            Err(e) => warn!(error = %e, "Ignoring malformed LSP message"),
        }
    }

    // Wake every waiter with a closed channel.
    pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}

fn spawn_stderr_logger(stderr: tokio::process::ChildStderr) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => debug!(target: "lspbridge_lsp::stderr", "{}", line.trim_end()),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_transport_creation_failure() {
        let result = LspTransport::spawn(
            "nonexistent_lsp_12345",
            &[],
            &HashMap::new(),
            None,
            Duration::from_secs(1),
        )
        .await;

        assert!(matches!(result, Err(LspError::ProcessError(_))));
    }

    #[tokio::test]
    async fn test_write_then_read_message() {
        let mut buf: Vec<u8> = Vec::new();
        write_message(&mut buf, br#"{"jsonrpc":"2.0","method":"x"}"#)
            .await
            .unwrap();
        assert!(buf.starts_with(b"Content-Length: 30\r\n\r\n"));

        let mut reader = BufReader::new(buf.as_slice());
        let value = read_message(&mut reader).await.unwrap().unwrap();
        assert_eq!(value["method"], "x");
        assert!(read_message(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_message_missing_length() {
        let data = b"Content-Type: x\r\n\r\n{}";
        let mut reader = BufReader::new(&data[..]);
        let err = read_message(&mut reader).await.unwrap_err();
        assert!(err.to_string().contains("Missing Content-Length"));
    }

    #[tokio::test]
    async fn test_read_message_truncated_headers() {
        let data = b"Content-Length: 10\r\n";
        let mut reader = BufReader::new(&data[..]);
        assert!(matches!(
            read_message(&mut reader).await,
            Err(LspError::ConnectionFailed(_))
        ));
    }

    #[test]
    fn test_classify() {
        let req = classify(json!({"jsonrpc": "2.0", "id": 3, "method": "a"})).unwrap();
        assert!(matches!(req, Incoming::Request { .. }));

        let note = classify(json!({"jsonrpc": "2.0", "method": "b"})).unwrap();
        assert!(matches!(note, Incoming::Notification(_)));

        let resp = classify(json!({"jsonrpc": "2.0", "id": 3, "result": null})).unwrap();
        assert!(matches!(resp, Incoming::Response(_)));

        assert!(classify(json!({"jsonrpc": "2.0"})).is_err());
    }

    #[test]
    fn test_server_request_reply() {
        let params = json!({"items": [{"section": "a"}, {"section": "b"}]});
        assert_eq!(
            server_request_reply("workspace/configuration", Some(&params)).unwrap(),
            json!([null, null])
        );
        assert_eq!(
            server_request_reply("window/workDoneProgress/create", None).unwrap(),
            Value::Null
        );
        assert_eq!(
            server_request_reply("workspace/applyEdit", None).unwrap()["applied"],
            json!(false)
        );
        let err = server_request_reply("custom/thing", None).unwrap_err();
        assert_eq!(err.code, METHOD_NOT_FOUND);
    }

    /// Reads one request from the client side of a duplex pipe.
    async fn next_request<R: AsyncBufRead + Unpin>(reader: &mut R) -> Value {
        read_message(reader).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_request_routes_response_by_id() {
        let (client_io, server_io) = duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client_io);
        let (server_read, mut server_write) = tokio::io::split(server_io);
        let (transport, _notes) =
            LspTransport::from_io(client_read, client_write, Duration::from_secs(5));

        let server = tokio::spawn(async move {
            let mut reader = BufReader::new(server_read);
            let req = next_request(&mut reader).await;
            assert_eq!(req["method"], "workspace/symbol");
            let reply = json!({"jsonrpc": "2.0", "id": req["id"], "result": [1, 2]});
            write_message(&mut server_write, &serde_json::to_vec(&reply).unwrap())
                .await
                .unwrap();
            server_write
        });

        let result = transport
            .request("workspace/symbol", Some(json!({"query": "F"})))
            .await
            .unwrap();
        assert_eq!(result, json!([1, 2]));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_request_error_response() {
        let (client_io, server_io) = duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client_io);
        let (server_read, mut server_write) = tokio::io::split(server_io);
        let (transport, _notes) =
            LspTransport::from_io(client_read, client_write, Duration::from_secs(5));

        let server = tokio::spawn(async move {
            let mut reader = BufReader::new(server_read);
            let req = next_request(&mut reader).await;
            let reply = json!({
                "jsonrpc": "2.0",
                "id": req["id"],
                "error": {"code": -32603, "message": "boom"}
            });
            write_message(&mut server_write, &serde_json::to_vec(&reply).unwrap())
                .await
                .unwrap();
            server_write
        });

        let err = transport.request("x/y", None).await.unwrap_err();
        assert!(matches!(err, LspError::RequestFailed(_)));
        assert!(err.to_string().contains("boom"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_request_timeout_clears_pending() {
        let (client_io, _server_io) = duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client_io);
        let (transport, _notes) =
            LspTransport::from_io(client_read, client_write, Duration::from_millis(20));

        let err = transport.request("slow", None).await.unwrap_err();
        assert!(matches!(err, LspError::Timeout { .. }));
        assert!(transport.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notifications_are_forwarded_and_requests_answered() {
        let (client_io, server_io) = duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client_io);
        let (server_read, mut server_write) = tokio::io::split(server_io);
        let (_transport, mut notes) =
            LspTransport::from_io(client_read, client_write, Duration::from_secs(5));

        let note = json!({"jsonrpc": "2.0", "method": "window/logMessage", "params": {"type": 3, "message": "hi"}});
        write_message(&mut server_write, &serde_json::to_vec(&note).unwrap())
            .await
            .unwrap();
        let received = notes.recv().await.unwrap();
        assert_eq!(received.method, "window/logMessage");

        let req = json!({"jsonrpc": "2.0", "id": "cfg-1", "method": "workspace/configuration", "params": {"items": [{}]}});
        write_message(&mut server_write, &serde_json::to_vec(&req).unwrap())
            .await
            .unwrap();
        let mut reader = BufReader::new(server_read);
        let reply = next_request(&mut reader).await;
        assert_eq!(reply["id"], "cfg-1");
        assert_eq!(reply["result"], json!([null]));
    }

    #[tokio::test]
    async fn test_closed_stream_fails_pending_request() {
        let (client_io, server_io) = duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client_io);
        let (transport, _notes) =
            LspTransport::from_io(client_read, client_write, Duration::from_secs(5));

        let closer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(server_io);
        });

        let err = transport.request("x", None).await.unwrap_err();
        assert!(matches!(
            err,
            LspError::ConnectionFailed(_) | LspError::Io(_)
        ));
        closer.await.unwrap();
    }
}
