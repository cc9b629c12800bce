//! Forwarding to upstream tool servers.
//!
//! The request body is buffered (tool calls are small JSON documents); the
//! upstream response body is streamed back as it arrives.

use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::http::header::{self, HeaderMap, HeaderName};
use axum::response::Response;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Largest request body forwarded upstream.
pub const MAX_FORWARDED_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Headers that describe a single connection and are not forwarded.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Errors forwarding to an upstream.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    #[error("request body too large")]
    BodyTooLarge,

    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),
}

/// HTTP client for upstream tool servers.
#[derive(Clone)]
pub struct UpstreamClient {
    http_client: reqwest::Client,
}

impl UpstreamClient {
    /// Create a client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "gateway.proxy", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self { http_client }
    }

    /// Forward `request` to `base_url` + `forwarded_path` (+ original query).
    ///
    /// Status, end-to-end headers and body of the upstream response are
    /// relayed unchanged.
    ///
    /// # Errors
    ///
    /// - `Timeout` - the upstream did not answer in time
    /// - `Unavailable` - connection or protocol failure
    /// - `BodyTooLarge` - request body over [`MAX_FORWARDED_BODY_BYTES`]
    #[instrument(skip(self, request), fields(method = %request.method()))]
    pub async fn forward(
        &self,
        base_url: &str,
        forwarded_path: &str,
        request: Request,
    ) -> Result<Response, ProxyError> {
        let (parts, body) = request.into_parts();

        let url = match parts.uri.query() {
            Some(query) => format!("{}{}?{}", base_url, forwarded_path, query),
            None => format!("{}{}", base_url, forwarded_path),
        };

        let body = to_bytes(body, MAX_FORWARDED_BODY_BYTES)
            .await
            .map_err(|_| ProxyError::BodyTooLarge)?;

        let mut headers = end_to_end_headers(&parts.headers);
        // Host and length are set by the client for the new connection
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);

        tracing::debug!(target: "gateway.proxy", path = %forwarded_path, "Forwarding request upstream");

        let upstream = self
            .http_client
            .request(parts.method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    tracing::warn!(target: "gateway.proxy", error = %e, "Upstream request timed out");
                    ProxyError::Timeout
                } else if e.is_builder() {
                    ProxyError::InvalidRequest(e.to_string())
                } else {
                    tracing::warn!(target: "gateway.proxy", error = %e, "Upstream request failed");
                    ProxyError::Unavailable(e.to_string())
                }
            })?;

        let status = upstream.status();
        let headers = end_to_end_headers(upstream.headers());

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;

        tracing::debug!(target: "gateway.proxy", status = %status, "Upstream responded");
        Ok(response)
    }
}

/// Copy `headers` without hop-by-hop headers, including any named in `Connection`.
fn end_to_end_headers(headers: &HeaderMap) -> HeaderMap {
    let connection_listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    let mut filtered = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || connection_listed.contains(name) {
            continue;
        }
        filtered.append(name.clone(), value.clone());
    }
    filtered
}
