/// Configuration types for remote tool servers.
///
/// Loading these from disk is the host application's concern; this crate
/// only defines the shape. A config is immutable once handed to a client.
use serde::{Deserialize, Serialize};

/// Configuration for a single remote MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Stable identifier, used (sanitized) as the tool namespace prefix.
    #[serde(default)]
    pub id: String,
    /// Human-readable display name.
    pub name: String,
    /// Base URL of the server (the MCP endpoint itself).
    pub url: String,
    /// Optional bearer token sent as `Authorization: Bearer <token>`.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Per-minute rate limit override (default 10/minute).
    #[serde(default)]
    pub rate_limit: Option<u32>,
    /// Disabled servers are skipped during initialization.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ServerConfig {
    /// The identifier used for namespacing: `id`, falling back to `name`.
    pub fn effective_id(&self) -> &str {
        if self.id.is_empty() {
            &self.name
        } else {
            &self.id
        }
    }
}
