//! JSON-RPC dispatcher for the MCP server
//!
//! Transport-agnostic: the stdio and HTTP transports hand every inbound
//! message to [`McpServer`] together with the request metadata they could
//! gather and a cancellation token scoped to the request.

use super::types::{
    negotiate_protocol_version, CallToolParams, CallToolResponse, Implementation,
    InitializeParams, InitializeResponse, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    ListToolsResponse, McpTool, ServerCapabilities, ToolsCapability, METHOD_CANCELLED,
    METHOD_INITIALIZE, METHOD_INITIALIZED, METHOD_PING, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
};
use crate::central::{CallContext, RequestMeta};
use crate::error::McpError;
use crate::metrics;
use crate::tools::ToolRegistry;
use serde::de::DeserializeOwned;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Name reported in `serverInfo`
pub const SERVER_NAME: &str = "stackrox-mcp";

type Dispatch = std::result::Result<serde_json::Value, JsonRpcError>;

/// Parse one raw JSON-RPC message
///
/// Malformed JSON is a parse error; valid JSON that is not a request is an
/// invalid request.
pub fn parse_request(raw: &[u8]) -> std::result::Result<JsonRpcRequest, JsonRpcError> {
    let value: serde_json::Value =
        serde_json::from_slice(raw).map_err(JsonRpcError::parse_error)?;
    let request: JsonRpcRequest =
        serde_json::from_value(value).map_err(JsonRpcError::invalid_request)?;
    if request.jsonrpc != "2.0" {
        return Err(JsonRpcError::invalid_request("jsonrpc must be \"2.0\""));
    }
    Ok(request)
}

/// MCP request handler shared by all transports
#[derive(Debug, Clone)]
pub struct McpServer {
    registry: ToolRegistry,
    info: Implementation,
}

impl McpServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    /// Tool registry backing `tools/list` and `tools/call`
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Handle one raw message; `None` when no response is due
    pub async fn handle_message(
        &self,
        raw: &[u8],
        request: RequestMeta,
        cancel: CancellationToken,
    ) -> Option<JsonRpcResponse> {
        match parse_request(raw) {
            Ok(req) => self.handle_request(req, request, cancel).await,
            Err(error) => {
                tracing::warn!(error = %error, "Rejected malformed MCP message");
                Some(JsonRpcResponse::failure(serde_json::Value::Null, error))
            }
        }
    }

    /// Handle a parsed request; notifications produce no response
    pub async fn handle_request(
        &self,
        req: JsonRpcRequest,
        request: RequestMeta,
        cancel: CancellationToken,
    ) -> Option<JsonRpcResponse> {
        let Some(id) = req.id.clone() else {
            self.handle_notification(&req);
            return None;
        };

        let result = match req.method.as_str() {
            METHOD_INITIALIZE => self.initialize(req.params),
            METHOD_PING => Ok(serde_json::json!({})),
            METHOD_TOOLS_LIST => self.list_tools(),
            METHOD_TOOLS_CALL => {
                let ctx = CallContext::with_cancellation(cancel).with_request(request);
                self.call_tool(&ctx, req.params).await
            }
            other => Err(JsonRpcError::method_not_found(other)),
        };

        Some(match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(error) => JsonRpcResponse::failure(id, error),
        })
    }

    fn handle_notification(&self, req: &JsonRpcRequest) {
        match req.method.as_str() {
            METHOD_INITIALIZED => tracing::info!("MCP client initialized"),
            METHOD_CANCELLED => tracing::debug!("MCP client cancelled a request"),
            other => tracing::debug!(method = other, "Ignoring MCP notification"),
        }
    }

    fn initialize(&self, params: Option<serde_json::Value>) -> Dispatch {
        let params: InitializeParams = parse_params(params.unwrap_or_default())?;
        if let Some(client) = &params.client_info {
            tracing::info!(
                client = %client.name,
                client_version = %client.version,
                "MCP session initializing"
            );
        }

        let response = InitializeResponse {
            protocol_version: negotiate_protocol_version(params.protocol_version.as_deref())
                .to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: self.info.clone(),
        };
        serde_json::to_value(response).map_err(JsonRpcError::internal)
    }

    fn list_tools(&self) -> Dispatch {
        let response = ListToolsResponse {
            tools: self
                .registry
                .get_all_tools()
                .into_iter()
                .map(McpTool::from)
                .collect(),
        };
        serde_json::to_value(response).map_err(JsonRpcError::internal)
    }

    async fn call_tool(&self, ctx: &CallContext, params: Option<serde_json::Value>) -> Dispatch {
        let params: CallToolParams = parse_params(params.unwrap_or_default())?;
        let tool = self
            .registry
            .find(&params.name)
            .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown tool: {}", params.name)))?;

        metrics::record_tool_call(&params.name);
        let started = Instant::now();
        let outcome = tool
            .execute(ctx, params.arguments.unwrap_or(serde_json::Value::Null))
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let response = match outcome {
            Ok(value) => {
                tracing::info!(tool = %params.name, duration_ms, "Tool call completed");
                CallToolResponse::structured(value)
            }
            Err(err) => {
                if let Some(McpError::InvalidParams(message)) = err.downcast_ref::<McpError>() {
                    metrics::record_tool_error(&params.name, "invalid_params");
                    return Err(JsonRpcError::invalid_params(message));
                }
                metrics::record_tool_error(&params.name, "execution");
                tracing::error!(tool = %params.name, duration_ms, error = %err, "Tool call failed");
                CallToolResponse::error(err.to_string())
            }
        };
        serde_json::to_value(response).map_err(JsonRpcError::internal)
    }
}

fn parse_params<T: DeserializeOwned>(params: serde_json::Value) -> std::result::Result<T, JsonRpcError> {
    let params = if params.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        params
    };
    serde_json::from_value(params).map_err(JsonRpcError::invalid_params)
}
