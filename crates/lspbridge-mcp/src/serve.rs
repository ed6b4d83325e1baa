//! MCP server: tool and prompt tables plus request handling.
//!
//! The server knows nothing about what its tools do. Tools and prompts are
//! registered as executors, and the transport in `stdio.rs` feeds requests
//! to [`McpServer::handle_request`].

use crate::protocol::{
    error_codes, CallToolParams, GetPromptParams, GetPromptResult, InitializeResult,
    JsonRpcRequest, JsonRpcResponse, ListPromptsResult, ListToolsResult, McpPrompt, McpTool,
    PromptArgument, PromptMessage, PromptsCapability, RequestId, Role, ServerCapabilities,
    ServerInfo, ToolCallResult, ToolContent, ToolsCapability, PROTOCOL_VERSION,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Trait for tool execution.
#[async_trait::async_trait]
pub trait McpToolExecutor: Send + Sync {
    /// Execute the tool with given arguments.
    async fn execute(&self, args: Value, ctx: &McpToolContext) -> Result<String, String>;
}

/// Trait for prompt rendering. Rendering always yields message text.
#[async_trait::async_trait]
pub trait McpPromptExecutor: Send + Sync {
    async fn render(&self, args: Value, ctx: &McpToolContext) -> String;
}

/// Context provided to executors for one request.
#[derive(Debug, Clone)]
pub struct McpToolContext {
    /// ID of the request being served.
    pub request_id: String,
    /// Cancelled when the client sends `notifications/cancelled`.
    pub abort: CancellationToken,
}

impl McpToolContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            abort: CancellationToken::new(),
        }
    }

    pub fn with_abort(mut self, abort: CancellationToken) -> Self {
        self.abort = abort;
        self
    }
}

/// Tool definition for the MCP server.
#[derive(Clone)]
pub struct McpServerTool {
    /// Tool name/ID.
    pub name: String,
    /// Tool description.
    pub description: String,
    /// JSON Schema for parameters.
    pub parameters: Value,
    /// Tool executor.
    pub executor: Arc<dyn McpToolExecutor>,
}

impl std::fmt::Debug for McpServerTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServerTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

/// Builder for McpServerTool.
pub struct McpServerToolBuilder {
    name: String,
    description: String,
    parameters: Value,
}

impl McpServerToolBuilder {
    /// Create a new tool builder.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    /// Set the tool description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the parameters schema.
    pub fn parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Build the tool with an executor.
    pub fn build(self, executor: impl McpToolExecutor + 'static) -> McpServerTool {
        McpServerTool {
            name: self.name,
            description: self.description,
            parameters: self.parameters,
            executor: Arc::new(executor),
        }
    }
}

/// Prompt definition for the MCP server.
#[derive(Clone)]
pub struct McpServerPrompt {
    pub name: String,
    pub description: String,
    /// Description attached to every `prompts/get` result.
    pub response_description: String,
    pub arguments: Vec<PromptArgument>,
    pub executor: Arc<dyn McpPromptExecutor>,
}

impl std::fmt::Debug for McpServerPrompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServerPrompt")
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .finish()
    }
}

/// An MCP server: named tools and prompts behind the JSON-RPC methods.
pub struct McpServer {
    name: String,
    version: String,
    tools: HashMap<String, McpServerTool>,
    tool_order: Vec<String>,
    prompts: HashMap<String, McpServerPrompt>,
    prompt_order: Vec<String>,
}

impl McpServer {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            tools: HashMap::new(),
            tool_order: Vec::new(),
            prompts: HashMap::new(),
            prompt_order: Vec::new(),
        }
    }

    /// Add a tool, replacing any tool with the same name.
    pub fn with_tool(mut self, tool: McpServerTool) -> Self {
        if !self.tools.contains_key(&tool.name) {
            self.tool_order.push(tool.name.clone());
        }
        self.tools.insert(tool.name.clone(), tool);
        self
    }

    /// Add a prompt, replacing any prompt with the same name.
    pub fn with_prompt(mut self, prompt: McpServerPrompt) -> Self {
        if !self.prompts.contains_key(&prompt.name) {
            self.prompt_order.push(prompt.name.clone());
        }
        self.prompts.insert(prompt.name.clone(), prompt);
        self
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tool_order.iter().map(String::as_str).collect()
    }

    pub fn prompt_names(&self) -> Vec<&str> {
        self.prompt_order.iter().map(String::as_str).collect()
    }

    /// Handle a JSON-RPC request. Notifications get no response.
    pub async fn handle_request(
        &self,
        request: JsonRpcRequest,
        ctx: &McpToolContext,
    ) -> Option<JsonRpcResponse> {
        debug!(method = %request.method, id = ?request.id, "Handling MCP request");

        let Some(id) = request.id else {
            debug!(method = %request.method, "Received notification");
            return None;
        };
        let id = Some(id);

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
            "tools/list" => self.handle_list_tools(id),
            "tools/call" => self.handle_call_tool(id, request.params, ctx).await,
            "prompts/list" => self.handle_list_prompts(id),
            "prompts/get" => self.handle_get_prompt(id, request.params, ctx).await,
            _ => JsonRpcResponse::error(id, error_codes::METHOD_NOT_FOUND, "Method not found"),
        };
        Some(response)
    }

    fn handle_initialize(&self, id: Option<RequestId>) -> JsonRpcResponse {
        info!(name = %self.name, version = %self.version, "Initializing MCP server");

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
                prompts: Some(PromptsCapability {
                    list_changed: false,
                }),
            },
            server_info: ServerInfo {
                name: self.name.clone(),
                version: Some(self.version.clone()),
            },
        };
        success(id, &result)
    }

    fn handle_list_tools(&self, id: Option<RequestId>) -> JsonRpcResponse {
        debug!(count = self.tools.len(), "Listing MCP tools");

        let tools: Vec<McpTool> = self
            .tool_order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| McpTool {
                name: tool.name.clone(),
                description: Some(tool.description.clone()),
                input_schema: Some(tool.parameters.clone()),
            })
            .collect();
        success(id, &ListToolsResult { tools })
    }

    async fn handle_call_tool(
        &self,
        id: Option<RequestId>,
        params: Option<Value>,
        ctx: &McpToolContext,
    ) -> JsonRpcResponse {
        let params: CallToolParams = match parse_params(params) {
            Ok(params) => params,
            Err(message) => {
                return JsonRpcResponse::error(id, error_codes::INVALID_PARAMS, message);
            }
        };

        debug!(tool = %params.name, "Calling MCP tool");

        let Some(tool) = self.tools.get(&params.name) else {
            return JsonRpcResponse::error(
                id,
                error_codes::INVALID_PARAMS,
                format!("Unknown tool: {}", params.name),
            );
        };

        let args = params
            .arguments
            .unwrap_or(Value::Object(serde_json::Map::new()));
        let tool_result = match tool.executor.execute(args, ctx).await {
            Ok(output) => {
                debug!(tool = %params.name, output_len = output.len(), "Tool completed successfully");
                ToolCallResult {
                    content: vec![ToolContent::Text { text: output }],
                    is_error: false,
                }
            }
            Err(e) => {
                warn!(tool = %params.name, error = %e, "Tool failed");
                ToolCallResult {
                    content: vec![ToolContent::Text { text: e }],
                    is_error: true,
                }
            }
        };
        success(id, &tool_result)
    }

    fn handle_list_prompts(&self, id: Option<RequestId>) -> JsonRpcResponse {
        let prompts: Vec<McpPrompt> = self
            .prompt_order
            .iter()
            .filter_map(|name| self.prompts.get(name))
            .map(|prompt| McpPrompt {
                name: prompt.name.clone(),
                description: Some(prompt.description.clone()),
                arguments: prompt.arguments.clone(),
            })
            .collect();
        success(id, &ListPromptsResult { prompts })
    }

    async fn handle_get_prompt(
        &self,
        id: Option<RequestId>,
        params: Option<Value>,
        ctx: &McpToolContext,
    ) -> JsonRpcResponse {
        let params: GetPromptParams = match parse_params(params) {
            Ok(params) => params,
            Err(message) => {
                return JsonRpcResponse::error(id, error_codes::INVALID_PARAMS, message);
            }
        };

        let Some(prompt) = self.prompts.get(&params.name) else {
            return JsonRpcResponse::error(
                id,
                error_codes::INVALID_PARAMS,
                format!("Unknown prompt: {}", params.name),
            );
        };

        let args = params
            .arguments
            .unwrap_or(Value::Object(serde_json::Map::new()));
        let text = prompt.executor.render(args, ctx).await;
        let result = GetPromptResult {
            description: Some(prompt.response_description.clone()),
            messages: vec![PromptMessage {
                role: Role::User,
                content: ToolContent::Text { text },
            }],
        };
        success(id, &result)
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T, String> {
    match params {
        Some(p) => serde_json::from_value(p).map_err(|e| format!("Invalid params: {e}")),
        None => Err("Missing params".to_string()),
    }
}

fn success(id: Option<RequestId>, result: &impl Serialize) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, error_codes::INTERNAL_ERROR, e.to_string()),
    }
}
