//! Code-intelligence tools for lspbridge.
//!
//! This crate provides the tools and prompts an agent uses to navigate and
//! edit a codebase through a language server. Tools are registered once in a
//! [`ToolRegistry`] and dispatched by name with JSON arguments; prompts wrap
//! the read-only tools for clients that only speak MCP prompts.

pub mod error;
pub mod path;
pub mod prompt;
pub mod registry;
pub mod render;
pub mod schema;
pub mod session;
pub mod symbol;

// Tool implementations
pub mod codelens;
pub mod definition;
pub mod diagnostics;
pub mod edit;
pub mod references;

pub use error::{CallError, ToolError, ToolResult};
pub use prompt::{Prompt, PromptMessage, PromptRegistry, PromptRole};
pub use registry::ToolRegistry;
pub use schema::{FieldKind, FieldSpec, PromptSchema, ToolSchema};
pub use session::{FileGuard, Session, SessionSettings};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Identifier of the call, for logging.
    pub call_id: String,
    /// Cancellation token.
    pub abort: CancellationToken,
    /// Workspace root directory.
    pub root_dir: PathBuf,
    /// Directory relative paths are tried against first.
    pub cwd: PathBuf,
}

impl ToolContext {
    /// A context rooted at `root_dir` with a fresh cancellation token.
    pub fn new(call_id: impl Into<String>, root_dir: impl Into<PathBuf>) -> Self {
        let root_dir = root_dir.into();
        Self {
            call_id: call_id.into(),
            abort: CancellationToken::new(),
            cwd: root_dir.clone(),
            root_dir,
        }
    }

    /// Use `abort` as the cancellation token.
    pub fn with_abort(mut self, abort: CancellationToken) -> Self {
        self.abort = abort;
        self
    }

    /// Resolve relative paths against `cwd` before the root.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    /// Fail with [`ToolError::Cancelled`] once the call has been cancelled.
    pub fn check_cancelled(&self) -> ToolResult<()> {
        if self.abort.is_cancelled() {
            Err(ToolError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Result of tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Title/summary of the operation.
    pub title: String,
    /// Output text.
    pub output: String,
    /// Tool-specific metadata.
    pub metadata: Value,
}

impl ToolOutput {
    /// Create a new tool output.
    pub fn new(title: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            output: output.into(),
            metadata: Value::Null,
        }
    }

    /// Add metadata to the output.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// The main trait for tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name, description and arguments.
    fn schema(&self) -> &ToolSchema;

    /// Get the tool ID.
    fn id(&self) -> &str {
        self.schema().name
    }

    /// Get the tool description (for the agent).
    fn description(&self) -> &str {
        self.schema().description
    }

    /// Get the JSON Schema for the tool's parameters.
    fn parameters_schema(&self) -> Value {
        self.schema().to_json_schema()
    }

    /// Execute the tool.
    ///
    /// `args` has already been validated against [`Tool::schema`], with
    /// defaults filled in.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput>;
}

/// A boxed tool for dynamic dispatch.
pub type BoxedTool = Arc<dyn Tool>;

/// Decode validated arguments into a typed struct.
pub(crate) fn parse_args<T: DeserializeOwned>(args: Value) -> ToolResult<T> {
    serde_json::from_value(args).map_err(|e| ToolError::validation(format!("Invalid arguments: {e}")))
}
