//! Canonical tool-definition hashing for rug-pull detection.
//!
//! A remote server silently redefining a previously-advertised tool is a
//! supply-chain attack vector. Each tool definition is hashed over a
//! canonical (sorted-key) serialization so the comparison is independent
//! of the key order the server happens to emit.

use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

/// Recursively rebuild a JSON value with object keys in sorted order.
/// Arrays keep their element order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// SHA-256 hex digest over the canonical `{name, description, inputSchema}`
/// triple of a tool definition.
pub fn hash_tool_definition(name: &str, description: &str, input_schema: &Value) -> String {
    let canonical = canonicalize(&json!({
        "name": name,
        "description": description,
        "inputSchema": input_schema,
    }));
    // Canonical value serializes deterministically; failure would mean a
    // non-serializable Value, which serde_json cannot produce.
    let data = serde_json::to_string(&canonical).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}
