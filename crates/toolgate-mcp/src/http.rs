//! Bounded HTTP transport.
//!
//! Thin wrapper over `reqwest` that enforces the two resource limits every
//! remote call must respect: a finite per-request timeout and a hard byte
//! ceiling on response bodies. Exceeding the ceiling aborts the in-flight
//! read instead of buffering unbounded data from a hostile server.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::HeaderMap;

use toolgate_types::McpError;

use crate::MAX_RESPONSE_BYTES;

/// A fully-read HTTP response with the fields the protocol layer needs.
#[derive(Debug)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Value of the `Mcp-Session-Id` response header, when present.
    pub session_id: Option<String>,
    /// Value of the `Content-Type` response header (empty when absent).
    pub content_type: String,
    /// Response body, capped at the configured byte ceiling.
    pub body: String,
}

/// HTTP client with bounded reads and per-request timeouts.
///
/// Cheap to clone; the underlying `reqwest::Client` is reference-counted.
#[derive(Clone, Debug)]
pub struct BoundedHttpClient {
    client: reqwest::Client,
    max_response_bytes: usize,
}

impl BoundedHttpClient {
    /// Build a client with the default 5 MiB response cap.
    pub fn new() -> Result<Self, McpError> {
        Self::with_max_response_bytes(MAX_RESPONSE_BYTES)
    }

    /// Build a client with a custom response cap (tests use small caps).
    pub fn with_max_response_bytes(max_response_bytes: usize) -> Result<Self, McpError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| McpError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            max_response_bytes,
        })
    }

    /// POST a JSON body and read the response, enforcing the byte ceiling.
    pub async fn post(
        &self,
        url: &str,
        headers: HeaderMap,
        body: String,
        timeout: Duration,
    ) -> Result<RawResponse, McpError> {
        let response = self
            .client
            .post(url)
            .headers(headers)
            .body(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let session_id = header_value(response.headers(), "mcp-session-id");
        let content_type =
            header_value(response.headers(), "content-type").unwrap_or_default();

        let body = self.read_bounded(response).await?;

        Ok(RawResponse {
            status,
            session_id,
            content_type,
            body,
        })
    }

    /// Send a DELETE request (session teardown). The body is discarded.
    pub async fn delete(
        &self,
        url: &str,
        headers: HeaderMap,
        timeout: Duration,
    ) -> Result<u16, McpError> {
        let response = self
            .client
            .delete(url)
            .headers(headers)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        Ok(response.status().as_u16())
    }

    /// Read the response body chunk-by-chunk, aborting once the cumulative
    /// size crosses the ceiling.
    async fn read_bounded(&self, response: reqwest::Response) -> Result<String, McpError> {
        let mut buf: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| McpError::Transport(format!("failed to read body: {e}")))?;
            if buf.len() + chunk.len() > self.max_response_bytes {
                return Err(McpError::Transport(format!(
                    "response exceeded {} byte limit",
                    self.max_response_bytes
                )));
            }
            buf.extend_from_slice(&chunk);
        }

        String::from_utf8(buf)
            .map_err(|e| McpError::Transport(format!("response body is not UTF-8: {e}")))
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// Map reqwest failures onto the transport error taxonomy.
fn classify_reqwest_error(err: reqwest::Error) -> McpError {
    if err.is_timeout() {
        McpError::Transport(format!("request timed out: {err}"))
    } else if err.is_connect() {
        McpError::Transport(format!("failed to connect: {err}"))
    } else {
        McpError::Transport(format!("HTTP request failed: {err}"))
    }
}
