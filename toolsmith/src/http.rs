//! HTTP front for the routing surface.
//!
//! `POST {prefix}/:tenant_id` carries MCP JSON-RPC for a mounted tenant,
//! `DELETE {prefix}/:tenant_id` ends the caller's session. `/health` answers
//! as soon as the process listens, `/ready` only after reconciliation.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::debug;

use crate::auth::{bearer_token, Authorizer};
use crate::host::RuntimeHost;
use crate::mcp::server::{INVALID_REQUEST, PARSE_ERROR};
use crate::mcp::{MCPRequest, MCPResponse};

pub const SESSION_HEADER: HeaderName = HeaderName::from_static("mcp-session-id");

#[derive(Clone)]
pub struct AppState {
    pub host: Arc<RuntimeHost>,
    pub authorizer: Arc<dyn Authorizer>,
}

pub fn router(host: Arc<RuntimeHost>, authorizer: Arc<dyn Authorizer>, prefix: &str) -> Router {
    let prefix = prefix.trim_end_matches('/');
    Router::new()
        .route(
            &format!("{}/:tenant_id", prefix),
            post(handle_post).delete(handle_delete),
        )
        .route("/health", get(handle_health))
        .route("/ready", get(handle_ready))
        .with_state(AppState { host, authorizer })
}

async fn handle_health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "server": "toolsmith" }))
}

async fn handle_ready(State(state): State<AppState>) -> Response {
    if state.host.is_ready() {
        Json(json!({
            "status": "ready",
            "tenants": state.host.mounted_tenants(),
        }))
        .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "reconciling" })),
        )
            .into_response()
    }
}

fn session_of(headers: &HeaderMap) -> Option<&str> {
    headers.get(&SESSION_HEADER).and_then(|v| v.to_str().ok())
}

async fn authorize(state: &AppState, tenant_id: &str, headers: &HeaderMap) -> Result<(), Response> {
    let credential = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token);
    if state.authorizer.authorize(tenant_id, credential).await {
        return Ok(());
    }
    debug!(tenant = %tenant_id, "rejected unauthorized request");
    Err((
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        Json(json!({ "error": "unauthorized" })),
    )
        .into_response())
}

fn not_mounted(tenant_id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("no tool server mounted for tenant '{}'", tenant_id) })),
    )
        .into_response()
}

fn rpc_failure(status: StatusCode, code: i32, message: String) -> Response {
    (status, Json(MCPResponse::failure(None, code, message))).into_response()
}

async fn handle_post(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(rejection) = authorize(&state, &tenant_id, &headers).await {
        return rejection;
    }
    let Some(server) = state.host.routes().resolve(&tenant_id) else {
        return not_mounted(&tenant_id);
    };

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            return rpc_failure(StatusCode::BAD_REQUEST, PARSE_ERROR, format!("Parse error: {}", e))
        }
    };
    let request: MCPRequest = match serde_json::from_value(payload) {
        Ok(request) => request,
        Err(e) => {
            return rpc_failure(
                StatusCode::BAD_REQUEST,
                INVALID_REQUEST,
                format!("Invalid request: {}", e),
            )
        }
    };

    let exchange = server.handle_request(request, session_of(&headers)).await;
    let Some(reply) = exchange.response else {
        return StatusCode::ACCEPTED.into_response();
    };

    let mut response = Json(reply).into_response();
    if let Some(value) = exchange
        .session_id
        .and_then(|sid| HeaderValue::from_str(&sid).ok())
    {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

async fn handle_delete(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(rejection) = authorize(&state, &tenant_id, &headers).await {
        return rejection;
    }
    let Some(server) = state.host.routes().resolve(&tenant_id) else {
        return not_mounted(&tenant_id);
    };
    match session_of(&headers) {
        Some(session) if server.sessions().close(session) => StatusCode::NO_CONTENT.into_response(),
        Some(_) => StatusCode::NOT_FOUND.into_response(),
        None => StatusCode::BAD_REQUEST.into_response(),
    }
}
