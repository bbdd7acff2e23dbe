/// Shared types, traits, and errors for the Toolgate MCP subsystem.
///
/// This crate is the foundation the protocol crates depend on. It contains:
/// - **Error types** (`errors`) for unified error handling
/// - **Config types** (`config`) for server configuration
/// - **Protocol types** (`protocol`) for JSON-RPC messages and call results
/// - **Trait contracts** (`traits`) for collaborator seams
pub mod config;
pub mod errors;
pub mod protocol;
pub mod traits;

// Re-export commonly used types at the crate root for convenience.
pub use config::ServerConfig;
pub use errors::McpError;
pub use protocol::*;
pub use traits::ContentWrapper;
