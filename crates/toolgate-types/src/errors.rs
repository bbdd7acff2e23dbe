/// Unified error type for the Toolgate MCP subsystem.
///
/// Every failure mode a remote tool server can produce is represented as a
/// structured variant. A misbehaving or unreachable server degrades to an
/// error result for that one server — never an uncaught failure.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// The `initialize` exchange was rejected or malformed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The server returned 404 while we held a session token. Recoverable
    /// by exactly one reconnect at the manager level.
    #[error("session expired (404)")]
    SessionExpired,

    /// A local or global rate ceiling was exceeded. No network call was made.
    #[error("rate limit exceeded: {0}")]
    RateLimit(String),

    /// Timeout, connection failure, unexpected HTTP status, or an
    /// oversized response body.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed or unmatched JSON-RPC response, including SSE streams
    /// with no event matching the outgoing request id.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The remote tool reported a failure (`isError` result or a JSON-RPC
    /// error object on `tools/call`).
    #[error("tool error: {0}")]
    Tool(String),

    /// Invalid server configuration (bad URL, credential over plain HTTP).
    #[error("config error: {0}")]
    Config(String),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Serialization(err.to_string())
    }
}
