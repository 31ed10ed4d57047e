//! Model Context Protocol surface.
//!
//! ```text
//! stdio framing | POST /mcp
//!         \        /
//!      McpServer::dispatch
//!              |
//!      catalog::call_tool -> LindormTools
//! ```

pub mod catalog;
pub mod framing;
pub mod jsonrpc;
pub mod stdio;

use crate::error::AppError;
use crate::tools::LindormTools;
use jsonrpc::{RpcRequest, RpcResponse};
use serde_json::{json, Value};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "lindorm-mcp";

pub struct McpServer {
    tools: LindormTools,
}

impl McpServer {
    pub fn new(tools: LindormTools) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &LindormTools {
        &self.tools
    }

    /// Answer one request. `None` for notifications.
    pub async fn dispatch(&self, req: &RpcRequest) -> Option<RpcResponse> {
        tracing::debug!(method = %req.method, "Dispatching");

        if req.is_notification() {
            return None;
        }

        if req.jsonrpc != "2.0" {
            return Some(RpcResponse::invalid_request(
                req.id.clone(),
                format!("Unsupported jsonrpc version: {}", req.jsonrpc),
            ));
        }

        let response = match req.method.as_str() {
            "initialize" => self.handle_initialize(req),
            "ping" => RpcResponse::success(req.id.clone(), json!({})),
            "tools/list" => RpcResponse::success(
                req.id.clone(),
                json!({ "tools": catalog::tool_definitions() }),
            ),
            "tools/call" => self.handle_tools_call(req).await,
            _ => {
                tracing::warn!(method = %req.method, "Unknown method");
                RpcResponse::method_not_found(req.id.clone(), &req.method)
            }
        };

        Some(response)
    }

    fn handle_initialize(&self, req: &RpcRequest) -> RpcResponse {
        if let Some(client) = req.params.get("clientInfo") {
            tracing::info!(client = %client, "MCP initialize");
        }

        RpcResponse::success(
            req.id.clone(),
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": { "listChanged": false }
                },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
    }

    async fn handle_tools_call(&self, req: &RpcRequest) -> RpcResponse {
        let Some(name) = req.params.get("name").and_then(Value::as_str) else {
            return RpcResponse::invalid_params(req.id.clone(), "Missing 'name' parameter");
        };
        let arguments = req.params.get("arguments").cloned().unwrap_or(Value::Null);

        tracing::info!(tool = name, "Calling tool");
        let start = std::time::Instant::now();

        let outcome = catalog::call_tool(&self.tools, name, arguments).await;

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        metrics::counter!("tool_calls_total", "tool" => name.to_string()).increment(1);
        metrics::histogram!("tool_latency_ms", "tool" => name.to_string()).record(elapsed_ms);

        match outcome {
            Ok(Some(text)) => {
                tracing::info!(tool = name, elapsed_ms, "Tool completed");
                RpcResponse::success(req.id.clone(), tool_result(text, false))
            }
            Ok(None) => RpcResponse::success(
                req.id.clone(),
                tool_result(format!("Unknown tool: {}", name), true),
            ),
            Err(AppError::ValidationError(msg)) => RpcResponse::invalid_params(req.id.clone(), msg),
            Err(e) => {
                tracing::error!(tool = name, error = %e, "Tool failed");
                RpcResponse::internal_error(req.id.clone(), e.to_string())
            }
        }
    }
}

fn tool_result(text: String, is_error: bool) -> Value {
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error
    })
}
