/// Wire and catalog types for the remote tool protocol.
use serde::{Deserialize, Serialize};

/// A JSON-RPC 2.0 message (MCP wire format).
///
/// Requests carry an `id`; notifications omit it. Optional fields are
/// skipped during serialization so notifications stay bit-exact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcMessage {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request ID (None for notifications).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    /// Method name (for requests/notifications).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Parameters (for requests/notifications).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    /// Result (for responses).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error (for error responses).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcMessage {
    /// Build a request with the given id, method, and params.
    pub fn request(id: u64, method: &str, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(serde_json::Value::Number(id.into())),
            method: Some(method.to_string()),
            params: Some(params),
            result: None,
            error: None,
        }
    }

    /// Build a notification (no id, no response expected).
    pub fn notification(method: &str) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: Some(method.to_string()),
            params: None,
            result: None,
            error: None,
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i64,
    /// Error message.
    pub message: String,
    /// Additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// A raw tool definition as returned by `tools/list`, before sanitization.
///
/// Every field originates from an untrusted remote server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawToolDef {
    /// Tool name as the server knows it.
    pub name: String,
    /// Unsanitized description.
    pub description: Option<String>,
    /// JSON Schema for the tool's input (opaque pass-through).
    #[serde(rename = "inputSchema")]
    pub input_schema: Option<serde_json::Value>,
}

/// A sanitized, namespaced tool catalog entry owned by one client.
#[derive(Debug, Clone)]
pub struct ToolRecord {
    /// Namespaced name exposed to callers (`tool__<server>__<name>`).
    pub name: String,
    /// Original tool name as the server knows it.
    pub original_name: String,
    /// Sanitized identifier of the owning server.
    pub server_id: String,
    /// Sanitized human-readable description.
    pub description: String,
    /// Parameter schema (opaque pass-through).
    pub input_schema: serde_json::Value,
    /// SHA-256 over the canonical `{name, description, inputSchema}` triple.
    pub hash: String,
}

/// A tool entry in the aggregated catalog handed to the agent layer.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    /// Namespaced tool name.
    pub name: String,
    /// Description, prefixed with the owning server id for disambiguation.
    pub description: String,
    /// Parameter schema.
    pub input_schema: serde_json::Value,
}

/// Successful result of a tool invocation.
#[derive(Debug, Clone)]
pub struct ToolCallResult {
    /// Concatenated textual content of the tool result.
    pub content: String,
    /// Display name of the server that produced it.
    pub server: String,
    /// Original tool name that was invoked.
    pub tool: String,
}

/// Identity and tool count reported by a successful handshake.
#[derive(Debug, Clone)]
pub struct ConnectInfo {
    /// Server-reported name (falls back to the configured display name).
    pub server_name: String,
    /// Server-reported version.
    pub server_version: String,
    /// Number of tools discovered during the handshake.
    pub tool_count: usize,
}

/// Per-server outcome of `initialize_all`.
#[derive(Debug, Clone, Serialize)]
pub struct ServerOutcome {
    /// Sanitized server id (None when the config had no usable id).
    pub id: Option<String>,
    /// Configured display name.
    pub name: String,
    /// Number of tools discovered.
    pub tools: usize,
    /// "connected" or "failed".
    pub status: ServerOutcomeStatus,
    /// Error message when status is `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Connection outcome for one configured server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerOutcomeStatus {
    /// Handshake and tool discovery succeeded.
    Connected,
    /// Construction or connection failed; other servers are unaffected.
    Failed,
}

/// Live status of a managed server, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    /// Sanitized server id.
    pub id: String,
    /// Configured display name.
    pub name: String,
    /// Whether the client currently holds a usable connection.
    pub connected: bool,
    /// Number of tools in the client's catalog.
    pub tools: usize,
    /// Base URL of the server.
    pub url: String,
}
