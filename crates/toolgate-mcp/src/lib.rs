/// Remote tool protocol subsystem (MCP over streamable HTTP).
///
/// Discovers, authenticates against, and invokes tools exposed by
/// third-party MCP servers, while defending the host against a hostile
/// or compromised remote peer:
/// - Description sanitization (invisible Unicode, HTML stripping)
/// - Rug-pull detection via canonical tool-definition hashing
/// - Per-server and global sliding-window rate limits
/// - Bounded response bodies and mandatory timeouts
/// - Transparent one-shot reconnect on session expiry
pub mod client;
pub mod hash;
pub mod http;
pub mod manager;
pub mod rate_limit;
pub mod sanitize;
pub mod sse;

pub use client::McpClient;
pub use manager::McpManager;

/// MCP protocol revision spoken by this client.
pub const MCP_PROTOCOL_VERSION: &str = "2025-06-18";

/// Default per-server rate limit (calls per minute).
pub const DEFAULT_RATE_LIMIT: u32 = 10;

/// Global rate limit across all servers (calls per minute).
pub const GLOBAL_RATE_LIMIT: u32 = 50;

/// Sanitized descriptions are truncated to this many characters.
pub const DESCRIPTION_MAX_LENGTH: usize = 2000;

/// Namespaced tool names longer than this are dropped, not truncated.
pub const TOOL_NAME_MAX_LENGTH: usize = 64;

/// Timeout for handshake steps and notifications.
pub const CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

/// Timeout for tool invocations.
pub const CALL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Timeout for the best-effort disconnect notification.
pub const DISCONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Hard cap on response body size; exceeding it aborts the read.
pub const MAX_RESPONSE_BYTES: usize = 5 * 1024 * 1024;
