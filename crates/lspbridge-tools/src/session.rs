//! Shared state for all tool calls against one language server.

use crate::error::{ToolError, ToolResult};
use lspbridge_lsp::{LspBackend, LspResult};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Rendering settings shared by the tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Lines shown on each side of a diagnostic or reference.
    pub context_lines: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self { context_lines: 3 }
    }
}

/// The backend plus the locks that order access to it.
///
/// Requests to the backend go through a single connection gate, so at most
/// one is in flight at a time. Edits additionally hold a per-file lock for
/// their whole read-modify-write cycle.
pub struct Session {
    backend: Arc<dyn LspBackend>,
    connection: Mutex<()>,
    file_locks: std::sync::Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
    settings: SessionSettings,
}

impl Session {
    pub fn new(backend: Arc<dyn LspBackend>) -> Self {
        Self {
            backend,
            connection: Mutex::new(()),
            file_locks: std::sync::Mutex::new(HashMap::new()),
            settings: SessionSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn backend(&self) -> &dyn LspBackend {
        self.backend.as_ref()
    }

    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    /// Hold the connection gate.
    pub async fn lock_connection(&self) -> MutexGuard<'_, ()> {
        self.connection.lock().await
    }

    /// Hold the lock for one file.
    ///
    /// The entry for `path` is dropped from the table once no caller holds
    /// or waits for it.
    pub async fn lock_file(&self, path: &Path) -> FileGuard<'_> {
        let lock = {
            let mut locks = self
                .file_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            locks
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let mut file = FileGuard {
            session: self,
            path: path.to_path_buf(),
            lock,
            guard: None,
        };
        file.guard = Some(file.lock.clone().lock_owned().await);
        file
    }

    /// Run one backend request under the connection gate.
    ///
    /// Both waiting for the gate and the request itself stop early with
    /// [`ToolError::Cancelled`] when `abort` fires.
    pub async fn request<T>(
        &self,
        abort: &CancellationToken,
        request: impl Future<Output = LspResult<T>>,
    ) -> ToolResult<T> {
        let _gate = tokio::select! {
            _ = abort.cancelled() => return Err(ToolError::Cancelled),
            gate = self.connection.lock() => gate,
        };
        tokio::select! {
            _ = abort.cancelled() => Err(ToolError::Cancelled),
            result = request => result.map_err(|e| {
                if e.is_fatal() {
                    error!(error = %e, "Language server connection is no longer usable");
                }
                ToolError::from(e)
            }),
        }
    }
}

/// Exclusive access to one file, released on drop.
pub struct FileGuard<'a> {
    session: &'a Session,
    path: PathBuf,
    lock: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for FileGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self
            .session
            .file_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Only the table and this guard still reference the lock.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.path);
        }
    }
}
