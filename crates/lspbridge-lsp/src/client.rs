//! LSP client implementation.

use crate::backend::{
    path_to_uri, uri_to_path, DiagnosticsReport, DocumentSymbolInfo, LspBackend, SourceLocation,
    WorkspaceSymbolInfo,
};
use crate::config::LspConfig;
use crate::error::{LspError, LspResult};
use crate::transport::{JsonRpcNotification, LspTransport, METHOD_NOT_FOUND};
use async_trait::async_trait;
use lsp_types::{
    ClientCapabilities, CodeLens, Command, Diagnostic, DidChangeTextDocumentParams,
    DidOpenTextDocumentParams, DocumentSymbol, InitializeParams, InitializeResult,
    InitializedParams, Location, LogMessageParams, MessageType, OneOf, Position,
    PublishDiagnosticsParams, ServerCapabilities, SymbolInformation,
    TextDocumentContentChangeEvent, TextDocumentItem, VersionedTextDocumentIdentifier,
    WorkspaceFolder, WorkspaceSymbolResponse,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, trace, warn};

/// A document the server has been told about.
#[derive(Debug)]
struct OpenDocument {
    version: i32,
    text: String,
    /// Diagnostics sequence number at the last sync.
    synced_at: u64,
}

/// Published diagnostics, tagged with the sequence number of their arrival.
#[derive(Debug)]
struct DiagnosticsStore {
    entries: std::sync::Mutex<HashMap<PathBuf, (u64, Vec<Diagnostic>)>>,
    seq: AtomicU64,
    updates: watch::Sender<u64>,
}

impl DiagnosticsStore {
    fn new() -> Self {
        Self {
            entries: std::sync::Mutex::new(HashMap::new()),
            seq: AtomicU64::new(0),
            updates: watch::channel(0).0,
        }
    }

    fn current_seq(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    fn publish(&self, path: PathBuf, diagnostics: Vec<Diagnostic>) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path, (seq, diagnostics));
        self.updates.send_replace(seq);
    }

    fn get(&self, path: &Path) -> Option<(u64, Vec<Diagnostic>)> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }
}

/// LSP client bound to a single language server and workspace root.
pub struct LspClient {
    config: LspConfig,
    root: PathBuf,
    transport: LspTransport,
    /// Server capabilities advertised during initialization.
    capabilities: ServerCapabilities,
    documents: Mutex<HashMap<PathBuf, OpenDocument>>,
    diagnostics: Arc<DiagnosticsStore>,
}

impl LspClient {
    /// Spawn the configured server and initialize it for `root`.
    pub async fn start(config: LspConfig, root: PathBuf) -> LspResult<Self> {
        info!(command = %config.command, root = %root.display(), "Spawning LSP server");

        let (transport, notifications) = LspTransport::spawn(
            &config.command,
            &config.args,
            &config.env,
            Some(&root),
            config.request_timeout(),
        )
        .await?;

        Self::connect(config, root, transport, notifications).await
    }

    /// Initialize a server reachable over an existing transport.
    pub async fn connect(
        config: LspConfig,
        root: PathBuf,
        transport: LspTransport,
        notifications: mpsc::UnboundedReceiver<JsonRpcNotification>,
    ) -> LspResult<Self> {
        let diagnostics = Arc::new(DiagnosticsStore::new());
        tokio::spawn(consume_notifications(notifications, Arc::clone(&diagnostics)));

        let root_uri = path_to_uri(&root)?;
        let workspace_folder = WorkspaceFolder {
            uri: root_uri.clone(),
            name: root
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("workspace")
                .to_string(),
        };

        #[allow(deprecated)]
        let init_params = InitializeParams {
            process_id: Some(std::process::id()),
            root_uri: Some(root_uri),
            workspace_folders: Some(vec![workspace_folder]),
            capabilities: client_capabilities(),
            ..Default::default()
        };

        let result = transport
            .request_with_timeout(
                "initialize",
                Some(serde_json::to_value(&init_params)?),
                config.initialize_timeout(),
            )
            .await
            .map_err(|e| LspError::InitializationFailed(e.to_string()))?;

        let init_result: InitializeResult = serde_json::from_value(result)
            .map_err(|e| LspError::InitializationFailed(format!("Invalid initialize result: {e}")))?;

        transport
            .notify(
                "initialized",
                Some(serde_json::to_value(InitializedParams {})?),
            )
            .await?;

        let server_name = init_result
            .server_info
            .as_ref()
            .map(|info| info.name.as_str())
            .unwrap_or("unknown");
        info!(server = %server_name, "LSP server initialized");

        Ok(Self {
            config,
            root,
            transport,
            capabilities: init_result.capabilities,
            documents: Mutex::new(HashMap::new()),
            diagnostics,
        })
    }

    /// The workspace root the server was initialized with.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Capabilities the server advertised.
    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    /// Shut the server down and close the transport.
    pub async fn shutdown(&self) -> LspResult<()> {
        if let Err(e) = self
            .transport
            .request_with_timeout("shutdown", None, Duration::from_secs(2))
            .await
        {
            warn!(error = %e, "LSP shutdown request failed");
        }
        if let Err(e) = self.transport.notify("exit", None).await {
            debug!(error = %e, "LSP exit notification failed");
        }
        self.transport.close().await
    }

    fn require(&self, supported: bool, method: &str) -> LspResult<()> {
        if supported {
            Ok(())
        } else {
            Err(LspError::unsupported(method))
        }
    }

    /// Open the document if the server has not seen it yet.
    async fn ensure_open(&self, path: &Path) -> LspResult<()> {
        if self.documents.lock().await.contains_key(path) {
            return Ok(());
        }
        self.sync_document(path).await
    }

    async fn send_text(&self, path: &Path, text: &str) -> LspResult<()> {
        let mut documents = self.documents.lock().await;
        let synced_at = self.diagnostics.current_seq();
        let uri = path_to_uri(path)?;

        match documents.get_mut(path) {
            Some(doc) if doc.text == text => {
                trace!(file = %path.display(), "Document unchanged");
            }
            Some(doc) => {
                doc.version += 1;
                let params = DidChangeTextDocumentParams {
                    text_document: VersionedTextDocumentIdentifier {
                        uri,
                        version: doc.version,
                    },
                    content_changes: vec![TextDocumentContentChangeEvent {
                        range: None,
                        range_length: None,
                        text: text.to_string(),
                    }],
                };
                self.transport
                    .notify(
                        "textDocument/didChange",
                        Some(serde_json::to_value(&params)?),
                    )
                    .await?;
                doc.text = text.to_string();
                doc.synced_at = synced_at;
                debug!(file = %path.display(), version = doc.version, "Sent didChange");
            }
            None => {
                let language_id = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|ext| self.config.language_id(ext))
                    .unwrap_or_else(|| "plaintext".to_string());
                let params = DidOpenTextDocumentParams {
                    text_document: TextDocumentItem {
                        uri,
                        language_id,
                        version: 1,
                        text: text.to_string(),
                    },
                };
                self.transport
                    .notify("textDocument/didOpen", Some(serde_json::to_value(&params)?))
                    .await?;
                documents.insert(
                    path.to_path_buf(),
                    OpenDocument {
                        version: 1,
                        text: text.to_string(),
                        synced_at,
                    },
                );
                debug!(file = %path.display(), "Sent didOpen");
            }
        }
        Ok(())
    }

    async fn synced_at(&self, path: &Path) -> u64 {
        self.documents
            .lock()
            .await
            .get(path)
            .map(|doc| doc.synced_at)
            .unwrap_or(0)
    }

    async fn pull_diagnostics(&self, path: &Path) -> LspResult<Option<Vec<Diagnostic>>> {
        let params = json!({
            "textDocument": { "uri": path_to_uri(path)? },
            "identifier": null,
            "previousResultId": null
        });

        match self
            .transport
            .request("textDocument/diagnostic", Some(params))
            .await
        {
            Ok(value) => Ok(parse_document_diagnostic_report(value)?),
            Err(LspError::RequestFailed(message))
                if message.contains(&format!("code {METHOD_NOT_FOUND}")) =>
            {
                debug!("Server rejected pull diagnostics, waiting for publication");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn wait_for_published(&self, path: &Path) -> DiagnosticsReport {
        let synced_at = self.synced_at(path).await;
        let mut updates = self.diagnostics.updates.subscribe();
        let deadline = tokio::time::Instant::now() + self.config.diagnostics_wait();

        loop {
            if let Some((seq, diagnostics)) = self.diagnostics.get(path) {
                if seq > synced_at {
                    return DiagnosticsReport::Ready(diagnostics);
                }
            }
            match tokio::time::timeout_at(deadline, updates.changed()).await {
                Ok(Ok(())) => continue,
                _ => break,
            }
        }

        match self.diagnostics.get(path) {
            Some((_, diagnostics)) => {
                debug!(file = %path.display(), "Using diagnostics published before the last sync");
                DiagnosticsReport::Ready(diagnostics)
            }
            None => DiagnosticsReport::Unavailable,
        }
    }

    async fn resolve_code_lens(&self, lens: CodeLens) -> CodeLens {
        let params = match serde_json::to_value(&lens) {
            Ok(params) => params,
            Err(_) => return lens,
        };
        match self.transport.request("codeLens/resolve", Some(params)).await {
            Ok(value) => match serde_json::from_value::<CodeLens>(value) {
                Ok(resolved) => resolved,
                Err(e) => {
                    warn!(error = %e, "Invalid codeLens/resolve result");
                    lens
                }
            },
            Err(e) => {
                warn!(error = %e, "codeLens/resolve failed");
                lens
            }
        }
    }
}

#[async_trait]
impl LspBackend for LspClient {
    async fn workspace_symbols(&self, query: &str) -> LspResult<Vec<WorkspaceSymbolInfo>> {
        self.require(
            is_enabled(&self.capabilities.workspace_symbol_provider),
            "workspace/symbol",
        )?;

        let result = self
            .transport
            .request("workspace/symbol", Some(json!({ "query": query })))
            .await?;
        parse_workspace_symbols(result)
    }

    async fn definition(&self, path: &Path, position: Position) -> LspResult<Vec<SourceLocation>> {
        self.require(
            is_enabled(&self.capabilities.definition_provider),
            "textDocument/definition",
        )?;
        self.ensure_open(path).await?;

        let result = self
            .transport
            .request(
                "textDocument/definition",
                Some(json!({
                    "textDocument": { "uri": path_to_uri(path)? },
                    "position": position,
                })),
            )
            .await?;
        to_source_locations(parse_goto_definition_response(result)?)
    }

    async fn references(
        &self,
        path: &Path,
        position: Position,
        include_declaration: bool,
    ) -> LspResult<Vec<SourceLocation>> {
        self.require(
            is_enabled(&self.capabilities.references_provider),
            "textDocument/references",
        )?;
        self.ensure_open(path).await?;

        let result = self
            .transport
            .request(
                "textDocument/references",
                Some(json!({
                    "textDocument": { "uri": path_to_uri(path)? },
                    "position": position,
                    "context": { "includeDeclaration": include_declaration },
                })),
            )
            .await?;
        if result.is_null() {
            return Ok(Vec::new());
        }
        to_source_locations(serde_json::from_value::<Vec<Location>>(result)?)
    }

    async fn document_symbols(&self, path: &Path) -> LspResult<Vec<DocumentSymbolInfo>> {
        self.require(
            is_enabled(&self.capabilities.document_symbol_provider),
            "textDocument/documentSymbol",
        )?;
        self.ensure_open(path).await?;

        let result = self
            .transport
            .request(
                "textDocument/documentSymbol",
                Some(json!({ "textDocument": { "uri": path_to_uri(path)? } })),
            )
            .await?;
        parse_document_symbols(result)
    }

    async fn sync_document(&self, path: &Path) -> LspResult<()> {
        let text = tokio::fs::read_to_string(path).await?;
        self.send_text(path, &text).await
    }

    async fn document_changed(&self, path: &Path, text: &str) -> LspResult<()> {
        self.send_text(path, text).await
    }

    async fn diagnostics(&self, path: &Path) -> LspResult<DiagnosticsReport> {
        self.ensure_open(path).await?;

        if self.capabilities.diagnostic_provider.is_some() {
            if let Some(diagnostics) = self.pull_diagnostics(path).await? {
                return Ok(DiagnosticsReport::Ready(diagnostics));
            }
        }

        Ok(self.wait_for_published(path).await)
    }

    async fn code_lenses(&self, path: &Path) -> LspResult<Vec<CodeLens>> {
        let options = self
            .capabilities
            .code_lens_provider
            .as_ref()
            .ok_or_else(|| LspError::unsupported("textDocument/codeLens"))?;
        let can_resolve = options.resolve_provider == Some(true);
        self.ensure_open(path).await?;

        let result = self
            .transport
            .request(
                "textDocument/codeLens",
                Some(json!({ "textDocument": { "uri": path_to_uri(path)? } })),
            )
            .await?;
        let lenses: Vec<CodeLens> = if result.is_null() {
            Vec::new()
        } else {
            serde_json::from_value(result)?
        };

        let mut resolved = Vec::with_capacity(lenses.len());
        for lens in lenses {
            if lens.command.is_none() && can_resolve {
                resolved.push(self.resolve_code_lens(lens).await);
            } else {
                resolved.push(lens);
            }
        }
        Ok(resolved)
    }

    async fn execute_command(&self, command: &Command) -> LspResult<Option<Value>> {
        self.require(
            self.capabilities.execute_command_provider.is_some(),
            "workspace/executeCommand",
        )?;

        let result = self
            .transport
            .request(
                "workspace/executeCommand",
                Some(json!({
                    "command": command.command,
                    "arguments": command.arguments.clone().unwrap_or_default(),
                })),
            )
            .await?;
        Ok((!result.is_null()).then_some(result))
    }
}

/// Capabilities announced to the server.
fn client_capabilities() -> ClientCapabilities {
    ClientCapabilities {
        text_document: Some(lsp_types::TextDocumentClientCapabilities {
            synchronization: Some(lsp_types::TextDocumentSyncClientCapabilities {
                did_save: Some(false),
                ..Default::default()
            }),
            publish_diagnostics: Some(lsp_types::PublishDiagnosticsClientCapabilities {
                related_information: Some(true),
                ..Default::default()
            }),
            document_symbol: Some(lsp_types::DocumentSymbolClientCapabilities {
                hierarchical_document_symbol_support: Some(true),
                ..Default::default()
            }),
            code_lens: Some(lsp_types::CodeLensClientCapabilities::default()),
            diagnostic: Some(lsp_types::DiagnosticClientCapabilities::default()),
            ..Default::default()
        }),
        workspace: Some(lsp_types::WorkspaceClientCapabilities {
            configuration: Some(true),
            workspace_folders: Some(true),
            symbol: Some(lsp_types::WorkspaceSymbolClientCapabilities::default()),
            execute_command: Some(lsp_types::DynamicRegistrationClientCapabilities::default()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// A `bool | Options` capability counts as enabled unless it is `false`.
fn is_enabled<T>(capability: &Option<OneOf<bool, T>>) -> bool {
    matches!(capability, Some(OneOf::Left(true)) | Some(OneOf::Right(_)))
}

async fn consume_notifications(
    mut notifications: mpsc::UnboundedReceiver<JsonRpcNotification>,
    store: Arc<DiagnosticsStore>,
) {
    while let Some(notification) = notifications.recv().await {
        let params = notification.params.unwrap_or(Value::Null);
        match notification.method.as_str() {
            "textDocument/publishDiagnostics" => {
                match serde_json::from_value::<PublishDiagnosticsParams>(params) {
                    Ok(p) => match uri_to_path(&p.uri) {
                        Ok(path) => {
                            debug!(
                                file = %path.display(),
                                count = p.diagnostics.len(),
                                "Diagnostics published"
                            );
                            store.publish(path, p.diagnostics);
                        }
                        Err(e) => debug!(error = %e, "Diagnostics for non-file URI"),
                    },
                    Err(e) => warn!(error = %e, "Invalid publishDiagnostics params"),
                }
            }
            "window/logMessage" | "window/showMessage" => {
                if let Ok(p) = serde_json::from_value::<LogMessageParams>(params) {
                    match p.typ {
                        MessageType::ERROR => error!(target: "lspbridge_lsp::server", "{}", p.message),
                        MessageType::WARNING => warn!(target: "lspbridge_lsp::server", "{}", p.message),
                        MessageType::INFO => info!(target: "lspbridge_lsp::server", "{}", p.message),
                        _ => debug!(target: "lspbridge_lsp::server", "{}", p.message),
                    }
                }
            }
            method => trace!(method, "Ignoring server notification"),
        }
    }
    debug!("Notification stream closed");
}

fn to_source_locations(locations: Vec<Location>) -> LspResult<Vec<SourceLocation>> {
    locations
        .into_iter()
        .map(|loc| {
            Ok(SourceLocation {
                path: uri_to_path(&loc.uri)?,
                range: loc.range,
            })
        })
        .collect()
}

/// Parse a `workspace/symbol` response in either its flat or nested form.
fn parse_workspace_symbols(value: Value) -> LspResult<Vec<WorkspaceSymbolInfo>> {
    if value.is_null() {
        return Ok(Vec::new());
    }

    let mut symbols = Vec::new();
    match serde_json::from_value::<WorkspaceSymbolResponse>(value)? {
        WorkspaceSymbolResponse::Flat(items) => {
            for s in items {
                let Ok(path) = uri_to_path(&s.location.uri) else {
                    continue;
                };
                symbols.push(WorkspaceSymbolInfo {
                    name: s.name,
                    kind: s.kind,
                    container_name: s.container_name,
                    path,
                    range: s.location.range,
                });
            }
        }
        WorkspaceSymbolResponse::Nested(items) => {
            for s in items {
                let (uri, range) = match s.location {
                    OneOf::Left(loc) => (loc.uri, loc.range),
                    OneOf::Right(loc) => (loc.uri, lsp_types::Range::default()),
                };
                let Ok(path) = uri_to_path(&uri) else {
                    continue;
                };
                symbols.push(WorkspaceSymbolInfo {
                    name: s.name,
                    kind: s.kind,
                    container_name: s.container_name,
                    path,
                    range,
                });
            }
        }
    }
    Ok(symbols)
}

/// Parse goto definition response.
fn parse_goto_definition_response(value: Value) -> LspResult<Vec<Location>> {
    if value.is_null() {
        return Ok(Vec::new());
    }

    // Try as single Location
    if let Ok(loc) = serde_json::from_value::<Location>(value.clone()) {
        return Ok(vec![loc]);
    }

    // Try as Location[]
    if let Ok(locs) = serde_json::from_value::<Vec<Location>>(value.clone()) {
        return Ok(locs);
    }

    // LocationLink[]: keep the target's identifier range
    let links = serde_json::from_value::<Vec<lsp_types::LocationLink>>(value)
        .map_err(|e| LspError::protocol_error(format!("Invalid definition result: {e}")))?;
    Ok(links
        .into_iter()
        .map(|link| Location {
            uri: link.target_uri,
            range: link.target_selection_range,
        })
        .collect())
}

/// Parse document symbols response.
fn parse_document_symbols(value: Value) -> LspResult<Vec<DocumentSymbolInfo>> {
    if value.is_null() {
        return Ok(Vec::new());
    }

    // Try as DocumentSymbol[]
    if let Ok(symbols) = serde_json::from_value::<Vec<DocumentSymbol>>(value.clone()) {
        return Ok(symbols.into_iter().map(convert_document_symbol).collect());
    }

    // SymbolInformation[] carries no separate identifier range
    let symbols = serde_json::from_value::<Vec<SymbolInformation>>(value)
        .map_err(|e| LspError::protocol_error(format!("Invalid documentSymbol result: {e}")))?;
    Ok(symbols
        .into_iter()
        .map(|s| DocumentSymbolInfo {
            name: s.name,
            kind: s.kind,
            detail: s.container_name,
            range: s.location.range,
            selection_range: s.location.range,
            children: Vec::new(),
        })
        .collect())
}

fn convert_document_symbol(symbol: DocumentSymbol) -> DocumentSymbolInfo {
    DocumentSymbolInfo {
        name: symbol.name,
        kind: symbol.kind,
        detail: symbol.detail,
        range: symbol.range,
        selection_range: symbol.selection_range,
        children: symbol
            .children
            .unwrap_or_default()
            .into_iter()
            .map(convert_document_symbol)
            .collect(),
    }
}

/// Parse a pull diagnostics report. `None` means the server reported no change.
fn parse_document_diagnostic_report(value: Value) -> LspResult<Option<Vec<Diagnostic>>> {
    if value.is_null() {
        return Ok(Some(Vec::new()));
    }
    if value.get("kind").and_then(Value::as_str) == Some("unchanged") {
        return Ok(None);
    }

    let Some(items) = value.get("items") else {
        return Ok(Some(Vec::new()));
    };
    Ok(Some(serde_json::from_value(items.clone())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{read_message, write_message};
    use lsp_types::{DiagnosticSeverity, Range};
    use std::sync::Mutex as StdMutex;
    use tokio::io::{duplex, BufReader};

    type Handler = Box<dyn Fn(&Value) -> Value + Send + Sync>;

    /// Scripted in-process language server.
    struct FakeServer {
        handlers: HashMap<String, Handler>,
        received: Arc<StdMutex<Vec<Value>>>,
        /// Notifications pushed to the client after `didOpen`/`didChange`.
        on_sync: Option<Box<dyn Fn(&Value) -> Vec<Value> + Send + Sync>>,
    }

    impl FakeServer {
        fn new(capabilities: Value) -> Self {
            let mut handlers: HashMap<String, Handler> = HashMap::new();
            handlers.insert(
                "initialize".to_string(),
                Box::new(move |_| {
                    json!({ "capabilities": capabilities, "serverInfo": { "name": "fake" } })
                }),
            );
            handlers.insert("shutdown".to_string(), Box::new(|_| Value::Null));
            Self {
                handlers,
                received: Arc::new(StdMutex::new(Vec::new())),
                on_sync: None,
            }
        }

        fn handle(mut self, method: &str, f: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
            self.handlers.insert(method.to_string(), Box::new(f));
            self
        }

        fn on_sync(mut self, f: impl Fn(&Value) -> Vec<Value> + Send + Sync + 'static) -> Self {
            self.on_sync = Some(Box::new(f));
            self
        }

        async fn start(self, root: &Path, config: LspConfig) -> (LspClient, Arc<StdMutex<Vec<Value>>>) {
            let (client_io, server_io) = duplex(256 * 1024);
            let (client_read, client_write) = tokio::io::split(client_io);
            let (server_read, mut server_write) = tokio::io::split(server_io);
            let received = Arc::clone(&self.received);

            tokio::spawn(async move {
                let mut reader = BufReader::new(server_read);
                while let Ok(Some(message)) = read_message(&mut reader).await {
                    self.received.lock().unwrap().push(message.clone());
                    let method = message["method"].as_str().unwrap_or_default().to_string();
                    let mut outgoing = Vec::new();
                    if message.get("id").is_some() {
                        let reply = match self.handlers.get(&method) {
                            Some(h) => json!({"jsonrpc": "2.0", "id": message["id"], "result": h(&message["params"])}),
                            None => json!({"jsonrpc": "2.0", "id": message["id"], "error": {"code": -32601, "message": "nope"}}),
                        };
                        outgoing.push(reply);
                    } else if method == "textDocument/didOpen" || method == "textDocument/didChange" {
                        if let Some(f) = &self.on_sync {
                            outgoing.extend(f(&message["params"]));
                        }
                    }
                    for out in outgoing {
                        let bytes = serde_json::to_vec(&out).unwrap();
                        if write_message(&mut server_write, &bytes).await.is_err() {
                            return;
                        }
                    }
                }
            });

            let (transport, notes) =
                LspTransport::from_io(client_read, client_write, Duration::from_secs(5));
            let client = LspClient::connect(config, root.to_path_buf(), transport, notes)
                .await
                .unwrap();
            (client, received)
        }
    }

    fn methods(received: &Arc<StdMutex<Vec<Value>>>) -> Vec<String> {
        received
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| m["method"].as_str().map(String::from))
            .collect()
    }

    #[test]
    fn test_is_enabled() {
        let off: Option<OneOf<bool, ()>> = Some(OneOf::Left(false));
        assert!(!is_enabled(&off));
        assert!(is_enabled(&Some(OneOf::<bool, ()>::Left(true))));
        assert!(is_enabled(&Some(OneOf::<bool, ()>::Right(()))));
        assert!(!is_enabled::<()>(&None));
    }

    #[cfg(unix)]
    #[test]
    fn test_parse_workspace_symbols_flat() {
        let value = json!([{
            "name": "F",
            "kind": 12,
            "containerName": "a",
            "location": {
                "uri": "file:///tmp/a.go",
                "range": {"start": {"line": 1, "character": 5}, "end": {"line": 1, "character": 6}}
            }
        }]);
        let symbols = parse_workspace_symbols(value).unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "F");
        assert_eq!(symbols[0].kind, lsp_types::SymbolKind::FUNCTION);
        assert_eq!(symbols[0].path, PathBuf::from("/tmp/a.go"));
        assert_eq!(symbols[0].range.start, Position::new(1, 5));
    }

    #[cfg(unix)]
    #[test]
    fn test_parse_workspace_symbols_nested_without_range() {
        let value = json!([{ "name": "T", "kind": 23, "location": { "uri": "file:///tmp/t.rs" } }]);
        let symbols = parse_workspace_symbols(value).unwrap();
        assert_eq!(symbols[0].range, Range::default());
        assert!(parse_workspace_symbols(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_parse_goto_definition_response_shapes() {
        let loc = json!({
            "uri": "file:///tmp/a.rs",
            "range": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 1}}
        });
        assert_eq!(parse_goto_definition_response(loc.clone()).unwrap().len(), 1);
        assert_eq!(parse_goto_definition_response(json!([loc])).unwrap().len(), 1);
        assert!(parse_goto_definition_response(Value::Null).unwrap().is_empty());

        let link = json!([{
            "targetUri": "file:///tmp/b.rs",
            "targetRange": {"start": {"line": 2, "character": 0}, "end": {"line": 9, "character": 1}},
            "targetSelectionRange": {"start": {"line": 2, "character": 3}, "end": {"line": 2, "character": 4}}
        }]);
        let locs = parse_goto_definition_response(link).unwrap();
        assert_eq!(locs[0].range.start, Position::new(2, 3));
    }

    #[test]
    fn test_parse_document_symbols_nested() {
        let value = json!([{
            "name": "Server",
            "kind": 23,
            "range": {"start": {"line": 0, "character": 0}, "end": {"line": 10, "character": 1}},
            "selectionRange": {"start": {"line": 0, "character": 5}, "end": {"line": 0, "character": 11}},
            "children": [{
                "name": "run",
                "kind": 6,
                "detail": "fn(&self)",
                "range": {"start": {"line": 2, "character": 4}, "end": {"line": 4, "character": 5}},
                "selectionRange": {"start": {"line": 2, "character": 7}, "end": {"line": 2, "character": 10}}
            }]
        }]);
        let symbols = parse_document_symbols(value).unwrap();
        assert_eq!(symbols[0].children.len(), 1);
        assert_eq!(symbols[0].children[0].detail.as_deref(), Some("fn(&self)"));
        assert_eq!(symbols[0].selection_range.start.character, 5);
    }

    #[test]
    fn test_parse_document_diagnostic_report() {
        let full = json!({"kind": "full", "items": [{
            "range": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 1}},
            "severity": 1,
            "message": "bad"
        }]});
        let diags = parse_document_diagnostic_report(full).unwrap().unwrap();
        assert_eq!(diags[0].severity, Some(DiagnosticSeverity::ERROR));

        assert!(parse_document_diagnostic_report(json!({"kind": "unchanged", "resultId": "1"}))
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_handshake_and_workspace_symbols() {
        let dir = tempfile::TempDir::new().unwrap();
        let file_uri = path_to_uri(&dir.path().join("a.go")).unwrap();
        let uri = file_uri.as_str().to_string();

        let server = FakeServer::new(json!({ "workspaceSymbolProvider": true }))
            .handle("workspace/symbol", move |params| {
                assert_eq!(params["query"], "F");
                json!([{
                    "name": "F",
                    "kind": 12,
                    "location": {
                        "uri": uri,
                        "range": {"start": {"line": 1, "character": 5}, "end": {"line": 1, "character": 6}}
                    }
                }])
            });
        let (client, received) = server.start(dir.path(), LspConfig::go()).await;

        let symbols = client.workspace_symbols("F").await.unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].path, dir.path().join("a.go"));

        let seen = methods(&received);
        assert_eq!(&seen[..2], &["initialize", "initialized"]);

        let err = client
            .definition(&dir.path().join("a.go"), Position::new(0, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, LspError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_sync_document_opens_then_changes() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.go");
        std::fs::write(&path, "package a\n").unwrap();

        let (client, received) = FakeServer::new(json!({}))
            .start(dir.path(), LspConfig::go())
            .await;

        client.sync_document(&path).await.unwrap();
        client.sync_document(&path).await.unwrap();
        client.document_changed(&path, "package b\n").await.unwrap();
        client.shutdown().await.unwrap();

        let messages = received.lock().unwrap().clone();
        let open: Vec<_> = messages
            .iter()
            .filter(|m| m["method"] == "textDocument/didOpen")
            .collect();
        let change: Vec<_> = messages
            .iter()
            .filter(|m| m["method"] == "textDocument/didChange")
            .collect();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0]["params"]["textDocument"]["languageId"], "go");
        assert_eq!(change.len(), 1);
        assert_eq!(change[0]["params"]["textDocument"]["version"], 2);
        assert_eq!(change[0]["params"]["contentChanges"][0]["text"], "package b\n");
    }

    #[tokio::test]
    async fn test_diagnostics_waits_for_publication() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.go");
        std::fs::write(&path, "package a\nfunc F() {\n").unwrap();

        let server = FakeServer::new(json!({})).on_sync(|params| {
            vec![json!({
                "jsonrpc": "2.0",
                "method": "textDocument/publishDiagnostics",
                "params": {
                    "uri": params["textDocument"]["uri"],
                    "diagnostics": [{
                        "range": {"start": {"line": 1, "character": 10}, "end": {"line": 1, "character": 10}},
                        "severity": 1,
                        "message": "expected '}'"
                    }]
                }
            })]
        });
        let (client, _) = server.start(dir.path(), LspConfig::go()).await;

        match client.diagnostics(&path).await.unwrap() {
            DiagnosticsReport::Ready(diags) => {
                assert_eq!(diags.len(), 1);
                assert_eq!(diags[0].message, "expected '}'");
            }
            DiagnosticsReport::Unavailable => panic!("expected diagnostics"),
        }
    }

    #[tokio::test]
    async fn test_diagnostics_unavailable_when_never_published() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.go");
        std::fs::write(&path, "package a\n").unwrap();

        let config = LspConfig::go().with_diagnostics_wait(Duration::from_millis(50));
        let (client, _) = FakeServer::new(json!({})).start(dir.path(), config).await;

        assert_eq!(
            client.diagnostics(&path).await.unwrap(),
            DiagnosticsReport::Unavailable
        );
    }

    #[tokio::test]
    async fn test_pull_diagnostics() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.rs");
        std::fs::write(&path, "fn main() {}\n").unwrap();

        let server = FakeServer::new(json!({
            "diagnosticProvider": { "interFileDependencies": false, "workspaceDiagnostics": false }
        }))
        .handle("textDocument/diagnostic", |_| {
            json!({"kind": "full", "items": [{
                "range": {"start": {"line": 0, "character": 3}, "end": {"line": 0, "character": 7}},
                "severity": 2,
                "message": "unused"
            }]})
        });
        let (client, _) = server.start(dir.path(), LspConfig::rust()).await;

        match client.diagnostics(&path).await.unwrap() {
            DiagnosticsReport::Ready(diags) => assert_eq!(diags[0].message, "unused"),
            DiagnosticsReport::Unavailable => panic!("expected pulled diagnostics"),
        }
    }

    #[tokio::test]
    async fn test_code_lenses_resolved_and_executed() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a_test.go");
        std::fs::write(&path, "package a\n").unwrap();

        let server = FakeServer::new(json!({
            "codeLensProvider": { "resolveProvider": true },
            "executeCommandProvider": { "commands": ["test"] }
        }))
        .handle("textDocument/codeLens", |_| {
            json!([
                {"range": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 1}},
                 "command": {"title": "run test", "command": "test", "arguments": ["a"]}},
                {"range": {"start": {"line": 1, "character": 0}, "end": {"line": 1, "character": 1}},
                 "data": 7}
            ])
        })
        .handle("codeLens/resolve", |lens| {
            let mut lens = lens.clone();
            lens["command"] = json!({"title": "resolved", "command": "test"});
            lens
        })
        .handle("workspace/executeCommand", |params| json!({"ran": params["command"]}));
        let (client, _) = server.start(dir.path(), LspConfig::go()).await;

        let lenses = client.code_lenses(&path).await.unwrap();
        assert_eq!(lenses.len(), 2);
        assert_eq!(lenses[0].command.as_ref().unwrap().title, "run test");
        assert_eq!(lenses[1].command.as_ref().unwrap().title, "resolved");

        let result = client
            .execute_command(lenses[0].command.as_ref().unwrap())
            .await
            .unwrap();
        assert_eq!(result, Some(json!({"ran": "test"})));
    }
}
