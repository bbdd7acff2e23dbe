//! Connection manager for the fleet of protocol clients.
//!
//! Owns one `McpClient` per configured server, aggregates their catalogs
//! under namespaced names, applies the global rate limit on top of each
//! client's local one, routes namespaced invocations, recovers from
//! session expiry with a single reconnect-and-retry, and wraps successful
//! results as untrusted external content.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use toolgate_types::{
    ContentWrapper, McpError, ServerConfig, ServerOutcome, ServerOutcomeStatus, ServerStatus,
    ToolCallResult, ToolDescriptor,
};

use crate::client::{sanitize_identifier, McpClient};
use crate::rate_limit::SlidingWindowLimiter;
use crate::GLOBAL_RATE_LIMIT;

/// Split a namespaced tool name into (server id, sanitized tool name).
///
/// Accepts only `tool__<server>__<tool>` with non-empty segments.
fn parse_namespaced_name(name: &str) -> Option<(&str, &str)> {
    let rest = name.strip_prefix("tool__")?;
    let (server, tool) = rest.split_once("__")?;
    if server.is_empty() || tool.is_empty() {
        return None;
    }
    Some((server, tool))
}

/// Manages every configured MCP server behind one routing surface.
///
/// Clients are keyed by sanitized server id. The manager never touches a
/// client's internals directly — only its public operations, each client
/// guarded by its own mutex so calls against different servers proceed
/// concurrently.
pub struct McpManager {
    /// Sanitized server id → client.
    servers: RwLock<HashMap<String, Arc<Mutex<McpClient>>>>,
    /// Global ceiling across all servers, independent of per-server limits.
    global_limit: Mutex<SlidingWindowLimiter>,
    /// Untrusted-content tagging seam, applied to successful results.
    wrapper: Option<Arc<dyn ContentWrapper>>,
}

impl McpManager {
    /// Create a manager with the default global rate limit and no wrapper.
    pub fn new() -> Self {
        Self::with_wrapper(None)
    }

    /// Create a manager with an optional content wrapper.
    pub fn with_wrapper(wrapper: Option<Arc<dyn ContentWrapper>>) -> Self {
        Self {
            servers: RwLock::new(HashMap::new()),
            global_limit: Mutex::new(SlidingWindowLimiter::per_minute(GLOBAL_RATE_LIMIT)),
            wrapper,
        }
    }

    /// Connect to every enabled server in config order.
    ///
    /// Each failure — missing id, duplicate id, bad config, refused
    /// handshake — is recorded as a `failed` outcome for that server and
    /// never aborts the rest.
    pub async fn initialize_all(&self, configs: &[ServerConfig]) -> Vec<ServerOutcome> {
        if configs.is_empty() {
            info!("no MCP servers configured");
            return Vec::new();
        }

        let mut outcomes = Vec::new();
        for cfg in configs {
            if !cfg.enabled {
                debug!(server = %cfg.name, "skipping disabled MCP server");
                continue;
            }

            let safe_id = sanitize_identifier(cfg.effective_id());
            if safe_id.is_empty() {
                warn!(server = %cfg.name, "skipping server with missing id");
                outcomes.push(ServerOutcome {
                    id: None,
                    name: cfg.name.clone(),
                    tools: 0,
                    status: ServerOutcomeStatus::Failed,
                    error: Some("missing server id".to_string()),
                });
                continue;
            }

            // "server-1" and "server_1" both sanitize to "server_1".
            if self.servers.read().await.contains_key(&safe_id) {
                warn!(server = %cfg.name, id = %safe_id, "duplicate server id, skipping");
                outcomes.push(ServerOutcome {
                    id: Some(safe_id),
                    name: cfg.name.clone(),
                    tools: 0,
                    status: ServerOutcomeStatus::Failed,
                    error: Some("duplicate server id".to_string()),
                });
                continue;
            }

            let mut client = match McpClient::new(cfg) {
                Ok(client) => client,
                Err(e) => {
                    warn!(server = %cfg.name, error = %e, "invalid MCP server config");
                    outcomes.push(ServerOutcome {
                        id: Some(safe_id),
                        name: cfg.name.clone(),
                        tools: 0,
                        status: ServerOutcomeStatus::Failed,
                        error: Some(e.to_string()),
                    });
                    continue;
                }
            };

            match client.connect().await {
                Ok(connect_info) => {
                    self.servers
                        .write()
                        .await
                        .insert(safe_id.clone(), Arc::new(Mutex::new(client)));
                    outcomes.push(ServerOutcome {
                        id: Some(safe_id),
                        name: cfg.name.clone(),
                        tools: connect_info.tool_count,
                        status: ServerOutcomeStatus::Connected,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(server = %cfg.name, error = %e, "failed to connect to MCP server");
                    outcomes.push(ServerOutcome {
                        id: Some(safe_id),
                        name: cfg.name.clone(),
                        tools: 0,
                        status: ServerOutcomeStatus::Failed,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let total = self.get_all_tools().await.len();
        let servers = self.servers.read().await.len();
        info!(servers = servers, tools = total, "MCP initialization complete");
        outcomes
    }

    /// Flatten every client's catalog into one list, each description
    /// prefixed with its owning server id for disambiguation downstream.
    pub async fn get_all_tools(&self) -> Vec<ToolDescriptor> {
        let servers = self.servers.read().await;
        let mut tools = Vec::new();
        for client in servers.values() {
            let guard = client.lock().await;
            if !guard.is_connected() {
                continue;
            }
            for record in guard.tools() {
                tools.push(ToolDescriptor {
                    name: record.name.clone(),
                    description: format!("[MCP: {}] {}", record.server_id, record.description),
                    input_schema: record.input_schema.clone(),
                });
            }
        }
        tools
    }

    /// Route a namespaced invocation to the owning client.
    ///
    /// Session expiry triggers exactly one transparent reconnect-and-retry;
    /// a second failure is surfaced as a reconnect failure. Successful
    /// textual content passes through the content wrapper when configured.
    pub async fn execute_tool(
        &self,
        namespaced_name: &str,
        args: Value,
    ) -> Result<ToolCallResult, McpError> {
        let (server_id, _) = parse_namespaced_name(namespaced_name).ok_or_else(|| {
            McpError::Protocol(format!(
                "malformed MCP tool name '{namespaced_name}' (expected tool__<server>__<name>)"
            ))
        })?;

        let client = self
            .servers
            .read()
            .await
            .get(server_id)
            .cloned()
            .ok_or_else(|| {
                McpError::Protocol(format!(
                    "MCP tool '{namespaced_name}' not found or server not connected"
                ))
            })?;

        // Resolve the original (pre-sanitization) tool name from the catalog.
        let original_name = {
            let guard = client.lock().await;
            guard
                .tools()
                .iter()
                .find(|t| t.name == namespaced_name)
                .map(|t| t.original_name.clone())
                .ok_or_else(|| {
                    McpError::Protocol(format!("MCP tool '{namespaced_name}' not found"))
                })?
        };

        {
            let mut limiter = self.global_limit.lock().await;
            if !limiter.can_proceed() {
                return Err(McpError::RateLimit(format!(
                    "global MCP rate limit exceeded ({}/min)",
                    limiter.max_ops()
                )));
            }
            limiter.record();
        }

        let mut guard = client.lock().await;
        let result = match guard.call_tool(&original_name, args.clone()).await {
            Ok(result) => result,
            Err(McpError::SessionExpired) => {
                warn!(server = %guard.name(), "session expired, reconnecting");
                if let Err(e) = guard.connect().await {
                    return Err(McpError::Transport(format!("MCP reconnect failed: {e}")));
                }
                match guard.call_tool(&original_name, args).await {
                    Ok(result) => result,
                    Err(e) => {
                        return Err(McpError::Transport(format!("MCP reconnect failed: {e}")))
                    }
                }
            }
            Err(e) => return Err(e),
        };
        drop(guard);

        let content = match &self.wrapper {
            Some(wrapper) => wrapper.wrap(
                &result.content,
                &format!("mcp: {}/{}", result.server, result.tool),
            ),
            None => result.content.clone(),
        };

        Ok(ToolCallResult {
            content,
            server: result.server,
            tool: result.tool,
        })
    }

    /// Live status of every managed server, for diagnostics.
    pub async fn get_status(&self) -> Vec<ServerStatus> {
        let servers = self.servers.read().await;
        let mut status = Vec::new();
        for (id, client) in servers.iter() {
            let guard = client.lock().await;
            status.push(ServerStatus {
                id: id.clone(),
                name: guard.name().to_string(),
                connected: guard.is_connected(),
                tools: guard.tools().len(),
                url: guard.url().to_string(),
            });
        }
        status
    }

    /// Disconnect every client and clear the server map. Idempotent.
    pub async fn shutdown(&self) {
        let mut servers = self.servers.write().await;
        for (_, client) in servers.drain() {
            client.lock().await.disconnect();
        }
        info!("all MCP servers disconnected");
    }
}

impl Default for McpManager {
    fn default() -> Self {
        Self::new()
    }
}
