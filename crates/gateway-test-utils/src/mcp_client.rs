//! Minimal MCP Streamable HTTP client for end-to-end tests.
//!
//! Speaks just enough of the transport to drive a tool through the gateway:
//! `initialize`, `notifications/initialized`, then session-scoped requests
//! whose responses may arrive as JSON or as SSE events.

use anyhow::{anyhow, ensure};
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// `Accept` value required on MCP POSTs.
pub const MCP_ACCEPT: &str = "application/json, text/event-stream";

/// Header carrying the MCP session id.
pub const MCP_SESSION_HEADER: &str = "mcp-session-id";

/// Protocol version offered by [`initialize_request`].
pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// An `initialize` request with the given JSON-RPC id.
pub fn initialize_request(id: u64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "initialize",
        "params": {
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {"name": "gateway-tests", "version": "0.1.0"}
        }
    })
}

/// First JSON-RPC response (a message with `result` or `error`) in a
/// `application/json` or `text/event-stream` body.
pub async fn read_rpc_response(response: reqwest::Response) -> Result<Value, anyhow::Error> {
    let is_sse = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/event-stream"));
    if !is_sse {
        return Ok(response.json().await?);
    }

    let mut stream = response.bytes_stream();
    let mut buffer = String::new();
    loop {
        let chunk = tokio::time::timeout(READ_TIMEOUT, stream.next())
            .await
            .map_err(|_| anyhow!("Timed out waiting for an SSE event"))?
            .ok_or_else(|| anyhow!("SSE stream ended before a response arrived"))??;
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(end) = buffer.find("\n\n") {
            let event: String = buffer.drain(..end + 2).collect();
            for data in event.lines().filter_map(|l| l.strip_prefix("data:")) {
                let data = data.trim();
                if data.is_empty() {
                    continue;
                }
                let message: Value = serde_json::from_str(data)?;
                if message.get("result").is_some() || message.get("error").is_some() {
                    return Ok(message);
                }
            }
        }
    }
}

/// An initialized MCP session against one endpoint URL.
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new().sign_rs256(&KEY_ONE);
/// let session =
///     McpTestSession::initialize(format!("{}/weather/mcp", server.url()), Some(&token)).await?;
/// let body = session.call_tool("get_time", json!({})).await?;
/// ```
pub struct McpTestSession {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    session_id: String,
    next_id: AtomicU64,
}

impl McpTestSession {
    /// Run the `initialize` handshake against `url`.
    ///
    /// `token` is sent as a bearer token on every request.
    pub async fn initialize(
        url: impl Into<String>,
        token: Option<&str>,
    ) -> Result<Self, anyhow::Error> {
        let url = url.into();
        let client = reqwest::Client::new();

        let mut request = client
            .post(&url)
            .header("accept", MCP_ACCEPT)
            .json(&initialize_request(0));
        if let Some(token) = token {
            request = request.header("authorization", format!("Bearer {}", token));
        }
        let response = request.send().await?;
        ensure!(
            response.status() == 200,
            "initialize returned {}",
            response.status()
        );

        let session_id = response
            .headers()
            .get(MCP_SESSION_HEADER)
            .ok_or_else(|| anyhow!("initialize returned no {} header", MCP_SESSION_HEADER))?
            .to_str()?
            .to_string();
        let body = read_rpc_response(response).await?;
        ensure!(body.get("result").is_some(), "initialize failed: {}", body);

        let session = Self {
            client,
            url,
            token: token.map(ToString::to_string),
            session_id,
            next_id: AtomicU64::new(1),
        };

        let response = session
            .post(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await?;
        ensure!(
            response.status() == 202,
            "notifications/initialized returned {}",
            response.status()
        );

        Ok(session)
    }

    /// Session id assigned by the server.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// POST a raw message with the session and bearer headers.
    pub async fn post(&self, body: &Value) -> Result<reqwest::Response, anyhow::Error> {
        let mut request = self
            .client
            .post(&self.url)
            .header("accept", MCP_ACCEPT)
            .header(MCP_SESSION_HEADER, &self.session_id)
            .json(body);
        if let Some(token) = &self.token {
            request = request.header("authorization", format!("Bearer {}", token));
        }
        Ok(request.send().await?)
    }

    /// Send a request and wait for its response. `Value::Null` params are omitted.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, anyhow::Error> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut body = json!({"jsonrpc": "2.0", "id": id, "method": method});
        if !params.is_null() {
            body["params"] = params;
        }

        let response = self.post(&body).await?;
        ensure!(
            response.status() == 200,
            "{} returned {}",
            method,
            response.status()
        );
        let message = read_rpc_response(response).await?;
        ensure!(message["id"] == id, "response id mismatch: {}", message);
        Ok(message)
    }

    /// `tools/call` with `name` and `arguments`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, anyhow::Error> {
        self.request("tools/call", json!({"name": name, "arguments": arguments}))
            .await
    }
}
