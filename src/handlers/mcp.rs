use crate::error::{AppError, Result};
use crate::mcp::jsonrpc::{RpcRequest, RpcResponse};
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

pub const SESSION_HEADER: &str = "mcp-session-id";

/// POST /mcp - One JSON-RPC message in, one JSON-RPC message out.
///
/// Notifications are acknowledged with 202 and no body. The `initialize`
/// response carries a fresh `Mcp-Session-Id`.
pub async fn mcp_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response> {
    if !state.is_ready() {
        return Err(AppError::ResourceError(
            "Backends are still initializing".to_string(),
        ));
    }

    let request: RpcRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            tracing::warn!(error = %e, "Invalid JSON-RPC body");
            return Ok((StatusCode::BAD_REQUEST, Json(RpcResponse::parse_error())).into_response());
        }
    };

    let Some(response) = state.server.dispatch(&request).await else {
        return Ok(StatusCode::ACCEPTED.into_response());
    };

    let mut http_response = Json(response).into_response();
    if request.method == "initialize" {
        let session_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(session_id = %session_id, "MCP session started");
        let value = HeaderValue::from_str(&session_id)
            .map_err(|e| AppError::ValidationError(format!("Invalid session id: {}", e)))?;
        http_response.headers_mut().insert(SESSION_HEADER, value);
    }

    Ok(http_response)
}
