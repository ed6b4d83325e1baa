//! Tool registry.

use crate::error::{CallError, ToolError};
use crate::session::Session;
use crate::{BoxedTool, ToolContext, ToolOutput};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Registry of available tools.
///
/// Populated at startup, then shared read-only.
pub struct ToolRegistry {
    tools: HashMap<String, BoxedTool>,
    order: Vec<String>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Create a registry with all built-in tools bound to `session`.
    pub fn with_builtins(session: Arc<Session>) -> Self {
        let mut registry = Self::new();

        registry.register(Arc::new(crate::definition::ReadDefinitionTool::new(session.clone())));
        registry.register(Arc::new(crate::references::FindReferencesTool::new(session.clone())));
        registry.register(Arc::new(crate::diagnostics::GetDiagnosticsTool::new(session.clone())));
        registry.register(Arc::new(crate::codelens::GetCodeLensTool::new(session.clone())));
        registry.register(Arc::new(crate::codelens::ExecuteCodeLensTool::new(session.clone())));
        registry.register(Arc::new(crate::edit::ApplyTextEditTool::new(session)));

        registry
    }

    /// Register a tool, replacing any tool with the same ID.
    pub fn register(&mut self, tool: BoxedTool) {
        let id = tool.id().to_string();
        if self.tools.insert(id.clone(), tool).is_none() {
            self.order.push(id);
        }
    }

    /// Get a tool by ID.
    pub fn get(&self, id: &str) -> Option<&BoxedTool> {
        self.tools.get(id)
    }

    /// List all tool IDs in registration order.
    pub fn list(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// Get all tools in registration order.
    pub fn all(&self) -> impl Iterator<Item = &BoxedTool> {
        self.order.iter().filter_map(|id| self.tools.get(id))
    }

    /// Validate `args` and run the named tool.
    pub async fn dispatch(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, CallError> {
        let result = match self.tools.get(name) {
            None => Err(ToolError::validation(format!("Unknown tool: {name}"))),
            Some(tool) => match tool.schema().validate(&args) {
                Ok(normalized) => {
                    debug!(tool = name, call_id = %ctx.call_id, "Executing tool");
                    tool.execute(Value::Object(normalized), ctx).await
                }
                Err(e) => Err(e),
            },
        };

        result.map_err(|source| {
            warn!(tool = name, call_id = %ctx.call_id, error = %source, "Tool call failed");
            CallError::new(name, source)
        })
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
