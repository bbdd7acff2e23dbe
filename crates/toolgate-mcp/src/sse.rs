//! Server-sent-event stream parser.
//!
//! Decodes a `text/event-stream` body into discrete events. Line endings
//! are normalized, events are separated by blank lines, and a trailing
//! event that never received its terminating blank line is still flushed.
//! Pure function: no state retained between calls.

/// One parsed SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field; defaults to `"message"` when absent.
    pub event_type: String,
    /// Accumulated `data:` payload (newline-joined across multiple lines).
    pub data: String,
    /// The `id:` field, when present.
    pub id: Option<String>,
}

impl SseEvent {
    fn new() -> Self {
        Self {
            event_type: "message".to_string(),
            data: String::new(),
            id: None,
        }
    }
}

/// Parse an SSE stream into ordered events.
///
/// Events without any `data:` payload (keep-alives, bare `id:` lines) are
/// dropped. `retry:`, comments, and unknown fields are ignored.
pub fn parse_sse_stream(text: &str) -> Vec<SseEvent> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut events = Vec::new();
    let mut current = SseEvent::new();

    for line in normalized.split('\n') {
        if line.is_empty() {
            if !current.data.is_empty() {
                events.push(current);
            }
            current = SseEvent::new();
        } else if let Some(value) = line.strip_prefix("event:") {
            current.event_type = value.trim().to_string();
        } else if let Some(raw) = line.strip_prefix("data:") {
            // SSE spec: strip only a single leading space, not all whitespace.
            let value = raw.strip_prefix(' ').unwrap_or(raw);
            if !current.data.is_empty() {
                current.data.push('\n');
            }
            current.data.push_str(value);
        } else if let Some(value) = line.strip_prefix("id:") {
            current.id = Some(value.trim().to_string());
        }
        // Comments (":...") and unknown fields fall through.
    }

    // Flush the final event if the stream didn't end with a blank line.
    if !current.data.is_empty() {
        events.push(current);
    }

    events
}
