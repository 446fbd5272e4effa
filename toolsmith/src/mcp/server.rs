//! Tenant MCP server
//!
//! One per mounted tenant. Speaks JSON-RPC 2.0 with the MCP method set and
//! exposes exactly the tenant's compiled tools.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::session::SessionStore;
use crate::host::resources::InvocationGate;
use crate::tools::{CallableUnit, Invocation, InvocationError, InvocationLimits};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const UNKNOWN_SESSION: i32 = -32001;

/// MCP JSON-RPC Request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MCPRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl MCPRequest {
    pub fn new(id: Value, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: method.to_string(),
            params,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// MCP JSON-RPC Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MCPResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<MCPError>,
}

impl MCPResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(MCPError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// MCP JSON-RPC Error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MCPError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Tool definition for MCP
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Outcome of handling one request.
#[derive(Debug, Clone)]
pub struct Exchange {
    /// `None` for notifications.
    pub response: Option<MCPResponse>,
    /// Session opened by this request, if any.
    pub session_id: Option<String>,
}

pub struct TenantServer {
    tenant_id: String,
    endpoint_path: String,
    version: String,
    tools: IndexMap<String, (ToolDefinition, Arc<CallableUnit>)>,
    sessions: Arc<SessionStore>,
    gate: InvocationGate,
    limits: InvocationLimits,
}

impl TenantServer {
    pub fn new(
        tenant_id: &str,
        endpoint_path: &str,
        units: Vec<Arc<CallableUnit>>,
        limits: InvocationLimits,
    ) -> Self {
        let tools = units
            .into_iter()
            .map(|unit| {
                let definition = ToolDefinition {
                    name: unit.name().to_string(),
                    description: unit.description().to_string(),
                    input_schema: unit.input_schema(),
                };
                (unit.name().to_string(), (definition, unit))
            })
            .collect();
        Self {
            tenant_id: tenant_id.to_string(),
            endpoint_path: endpoint_path.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            tools,
            sessions: Arc::new(SessionStore::new()),
            gate: InvocationGate::new(),
            limits,
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn endpoint_path(&self) -> &str {
        &self.endpoint_path
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Get all tool definitions
    pub fn get_tools(&self) -> Vec<&ToolDefinition> {
        self.tools.values().map(|(def, _)| def).collect()
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn gate(&self) -> &InvocationGate {
        &self.gate
    }

    /// Call a tool by name with arguments
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Invocation, InvocationError> {
        let (_, unit) = self
            .tools
            .get(name)
            .ok_or_else(|| InvocationError::UnknownTool(name.to_string()))?;
        let _permit = self.gate.enter().await.ok_or(InvocationError::Unavailable)?;
        unit.invoke_blocking(arguments, self.limits).await
    }

    /// Handle a single MCP request
    pub async fn handle_request(&self, request: MCPRequest, session: Option<&str>) -> Exchange {
        if request.jsonrpc != "2.0" {
            return Exchange {
                response: Some(MCPResponse::failure(
                    request.id,
                    INVALID_REQUEST,
                    "jsonrpc must be \"2.0\"",
                )),
                session_id: None,
            };
        }

        if let Some(session) = session {
            if request.method != "initialize" && !self.sessions.touch(session) {
                return Exchange {
                    response: Some(MCPResponse::failure(
                        request.id,
                        UNKNOWN_SESSION,
                        format!("Unknown session: {}", session),
                    )),
                    session_id: None,
                };
            }
        }

        if request.is_notification() {
            debug!(tenant = %self.tenant_id, method = %request.method, "notification");
            return Exchange {
                response: None,
                session_id: None,
            };
        }

        let mut session_id = None;
        let result = match request.method.as_str() {
            "initialize" => {
                let id = self.sessions.open();
                session_id = Some(id);
                Ok(self.handle_initialize(&request.params))
            }
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.handle_tools_list()),
            "tools/call" => self.handle_tools_call(&request.params).await,
            _ => Err((
                METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            )),
        };

        let response = match result {
            Ok(result) => MCPResponse::success(request.id, result),
            Err((code, message)) => MCPResponse::failure(request.id, code, message),
        };
        Exchange {
            response: Some(response),
            session_id,
        }
    }

    fn handle_initialize(&self, _params: &Value) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": format!("toolsmith:{}", self.tenant_id),
                "version": self.version
            }
        })
    }

    fn handle_tools_list(&self) -> Value {
        json!({
            "tools": self.get_tools()
        })
    }

    async fn handle_tools_call(&self, params: &Value) -> Result<Value, (i32, String)> {
        let tool_name = params
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| (INVALID_PARAMS, "Missing tool name".to_string()))?;

        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        match self.call_tool(tool_name, arguments).await {
            Ok(invocation) => {
                let text = match &invocation.result {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Ok(json!({
                    "content": [{ "type": "text", "text": text }],
                    "structuredContent": { "result": invocation.result },
                    "isError": false
                }))
            }
            Err(e) if e.is_bad_request() => Err((INVALID_PARAMS, e.to_string())),
            Err(InvocationError::Unavailable) => {
                Err((INTERNAL_ERROR, InvocationError::Unavailable.to_string()))
            }
            Err(e) => {
                warn!(tenant = %self.tenant_id, tool = %tool_name, "tool call failed: {}", e);
                Ok(json!({
                    "content": [{ "type": "text", "text": e.to_string() }],
                    "isError": true
                }))
            }
        }
    }
}

impl std::fmt::Debug for TenantServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantServer")
            .field("tenant_id", &self.tenant_id)
            .field("endpoint_path", &self.endpoint_path)
            .field("tools", &self.tool_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{CapabilityPolicy, Tier};
    use crate::tools::{CompilerSettings, ParamType, ToolCompiler, ToolParameter, ToolSpec};
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use toolsmith_lang::runtime::ModuleRegistry;

    fn server() -> TenantServer {
        let compiler = ToolCompiler::new(
            Arc::new(CapabilityPolicy::standard()),
            Arc::new(ModuleRegistry::standard()),
            CompilerSettings::default(),
        );
        let add = ToolSpec::new("t1", "acme", "add", "return a + b")
            .with_description("Add two numbers")
            .with_parameters(vec![
                ToolParameter::required("a", ParamType::Integer),
                ToolParameter::optional("b", ParamType::Integer, json!(1)),
            ]);
        let spin = ToolSpec::new("t2", "acme", "spin", "while True { pass }");
        let units = [add, spin]
            .iter()
            .map(|spec| Arc::new(compiler.compile("acme", Tier::Restricted, spec).unwrap()))
            .collect();
        TenantServer::new(
            "acme",
            "/acme",
            units,
            InvocationLimits {
                max_call_depth: 32,
                timeout: Duration::from_millis(100),
            },
        )
    }

    async fn call(server: &TenantServer, method: &str, params: Value) -> MCPResponse {
        server
            .handle_request(MCPRequest::new(json!(1), method, params), None)
            .await
            .response
            .expect("request gets a response")
    }

    #[tokio::test]
    async fn test_initialize_opens_session() {
        let server = server();
        let exchange = server
            .handle_request(MCPRequest::new(json!(1), "initialize", json!({})), None)
            .await;
        let session = exchange.session_id.expect("session opened");
        assert_eq!(server.sessions().len(), 1);
        let result = exchange.response.unwrap().result.unwrap();
        assert_eq!(result["protocolVersion"], json!(PROTOCOL_VERSION));

        let ping = server
            .handle_request(MCPRequest::new(json!(2), "ping", json!({})), Some(&session))
            .await;
        assert!(ping.response.unwrap().error.is_none());

        let stale = server
            .handle_request(MCPRequest::new(json!(3), "ping", json!({})), Some("nope"))
            .await;
        assert_eq!(stale.response.unwrap().error.unwrap().code, UNKNOWN_SESSION);
    }

    #[tokio::test]
    async fn test_tools_list() {
        let response = call(&server(), "tools/list", json!({})).await;
        let tools = response.result.unwrap()["tools"].clone();
        assert_eq!(tools[0]["name"], json!("add"));
        assert_eq!(tools[0]["description"], json!("Add two numbers"));
        assert_eq!(tools[0]["inputSchema"]["required"], json!(["a"]));
        assert_eq!(tools[1]["name"], json!("spin"));
    }

    #[tokio::test]
    async fn test_tools_call() {
        let server = server();
        let response = call(
            &server,
            "tools/call",
            json!({"name": "add", "arguments": {"a": 2}}),
        )
        .await;
        let result = response.result.unwrap();
        assert_eq!(result["content"][0]["text"], json!("3"));
        assert_eq!(result["isError"], json!(false));

        let bad = call(
            &server,
            "tools/call",
            json!({"name": "add", "arguments": {"a": "x"}}),
        )
        .await;
        assert_eq!(bad.error.unwrap().code, INVALID_PARAMS);

        let missing = call(&server, "tools/call", json!({"name": "nope"})).await;
        assert_eq!(missing.error.unwrap().code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_tool_timeout_is_reported_as_tool_error() {
        let response = call(&server(), "tools/call", json!({"name": "spin"})).await;
        let result = response.result.unwrap();
        assert_eq!(result["isError"], json!(true));
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("timed out"));
    }

    #[tokio::test]
    async fn test_notifications_and_unknown_methods() {
        let server = server();
        let notification = MCPRequest {
            jsonrpc: "2.0".into(),
            id: None,
            method: "notifications/initialized".into(),
            params: Value::Null,
        };
        assert!(server.handle_request(notification, None).await.response.is_none());

        let response = call(&server, "resources/list", json!({})).await;
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_closed_gate_refuses_calls() {
        let server = server();
        server.gate().close();
        let err = server.call_tool("add", json!({"a": 1})).await.unwrap_err();
        assert!(matches!(err, InvocationError::Unavailable));
    }
}
