/// Collaborator trait contracts.
///
/// The manager codes against these seams rather than concrete host types,
/// so the host application can supply its own implementations.

/// Tags externally sourced tool output before it is handed to downstream
/// consumers, so they treat it as data rather than instructions.
///
/// Invoked only on successful tool results, with a provenance tag of the
/// form `mcp: <server>/<tool>`.
pub trait ContentWrapper: Send + Sync {
    /// Wrap `text` with whatever delimiters mark it as untrusted.
    fn wrap(&self, text: &str, provenance: &str) -> String;
}
