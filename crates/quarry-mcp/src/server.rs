//! MCP server implementation.
//!
//! Maps JSON-RPC methods onto the registry and dispatcher. The same
//! [`McpServer`] backs every transport; transports only differ in the
//! [`InvocationContext`] they build per request.

use crate::dispatcher::{Dispatcher, InvocationContext};
use crate::error::{InvocationError, McpError};
use crate::protocol::*;
use crate::registry::RegistryHandle;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// The MCP server.
#[derive(Clone)]
pub struct McpServer {
    dispatcher: Dispatcher,
}

impl McpServer {
    /// Create a new MCP server over the given registry.
    pub fn new(registry: RegistryHandle) -> Self {
        Self {
            dispatcher: Dispatcher::new(registry),
        }
    }

    pub fn registry(&self) -> &RegistryHandle {
        self.dispatcher.registry()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Serve newline-delimited JSON-RPC on stdin/stdout until stdin closes.
    ///
    /// stdout carries protocol messages only; logs go to stderr.
    pub async fn run_stdio(&self) -> Result<(), McpError> {
        tracing::info!("Starting MCP server with stdio transport");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();
        let ctx = InvocationContext::stdio();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
                Ok(request) => self.handle_request(request, &ctx).await,
                Err(e) => {
                    tracing::warn!(error = %e, "Unparseable message on stdin");
                    Some(JsonRpcResponse::error(
                        None,
                        codes::PARSE_ERROR,
                        format!("Parse error: {}", e),
                    ))
                }
            };

            if let Some(response) = response {
                let mut out = serde_json::to_vec(&response)?;
                out.push(b'\n');
                stdout.write_all(&out).await?;
                stdout.flush().await?;
            }
        }

        tracing::info!("stdin closed, stopping stdio transport");
        Ok(())
    }

    /// Handle a JSON-RPC request. Notifications produce no response.
    pub async fn handle_request(
        &self,
        request: JsonRpcRequest,
        ctx: &InvocationContext,
    ) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            tracing::debug!(method = %request.method, "Notification received");
            return None;
        }

        let id = request.id.clone();
        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(id, request.params),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => self.handle_list_tools(id, ctx).await,
            "tools/call" => self.handle_call_tool(id, request.params, ctx).await,
            _ => JsonRpcResponse::error(
                id,
                codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            ),
        };
        Some(response)
    }

    fn handle_initialize(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let requested = params
            .as_ref()
            .and_then(|p| p.get("protocolVersion"))
            .and_then(|v| v.as_str());
        JsonRpcResponse::success(id, initialize_result(requested))
    }

    async fn handle_list_tools(
        &self,
        id: Option<Value>,
        ctx: &InvocationContext,
    ) -> JsonRpcResponse {
        let snapshot = self.registry().snapshot().await;
        let tools = match snapshot.resolve_toolset(&ctx.toolset) {
            Ok(tools) => tools,
            Err(e) => return invocation_error_response(id, &e),
        };

        let listing = ListToolsResponse {
            tools: tools
                .into_iter()
                .map(|tool| ToolListing {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    input_schema: tool.input_schema(),
                    meta: tool.meta(),
                })
                .collect(),
        };

        match serde_json::to_value(listing) {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => JsonRpcResponse::error(id, codes::INTERNAL_ERROR, e.to_string()),
        }
    }

    async fn handle_call_tool(
        &self,
        id: Option<Value>,
        params: Option<Value>,
        ctx: &InvocationContext,
    ) -> JsonRpcResponse {
        let params: CallToolParams = match params.map(serde_json::from_value) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                return JsonRpcResponse::error(
                    id,
                    codes::INVALID_PARAMS,
                    format!("Invalid params: {}", e),
                );
            }
            None => return JsonRpcResponse::error(id, codes::INVALID_PARAMS, "Missing params"),
        };

        let result = self
            .dispatcher
            .invoke(&params.name, params.arguments, ctx)
            .await;

        let response = match result {
            Ok(result) => CallToolResponse::output(&result.output),
            Err(e) if e.is_execution_failure() => CallToolResponse::failure(e.to_string()),
            Err(e) => return invocation_error_response(id, &e),
        };

        match serde_json::to_value(response) {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => JsonRpcResponse::error(id, codes::INTERNAL_ERROR, e.to_string()),
        }
    }
}

fn invocation_error_response(id: Option<Value>, error: &InvocationError) -> JsonRpcResponse {
    JsonRpcResponse::error_with_data(
        id,
        error.json_rpc_code(),
        error.to_string(),
        Some(json!({ "kind": error.kind() })),
    )
}
