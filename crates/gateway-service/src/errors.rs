//! Gateway error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl. Messages
//! returned to clients are intentionally generic; the specific cause is
//! logged server-side.

use crate::auth::RejectionReason;
use crate::routing::proxy::ProxyError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Realm advertised in `WWW-Authenticate` challenges.
pub const AUTH_REALM: &str = "mcp-gateway";

/// Gateway error type.
///
/// Maps to HTTP status codes:
/// - Unauthorized: 401 (503 when the signing keys could not be fetched)
/// - Forbidden: 403
/// - RouteNotFound: 404
/// - PayloadTooLarge: 413
/// - UpstreamUnavailable: 502
/// - UpstreamTimeout: 504
/// - Internal: 500
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Unauthorized: {reason}")]
    Unauthorized {
        reason: RejectionReason,
        /// RFC 9728 metadata URL to advertise in the challenge.
        resource_metadata: Option<String>,
    },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("No route for path")]
    RouteNotFound,

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream timed out")]
    UpstreamTimeout,

    #[error("Internal server error")]
    Internal,
}

impl GatewayError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized {
                reason: RejectionReason::KeyFetchFailure,
                ..
            } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::RouteNotFound => StatusCode::NOT_FOUND,
            GatewayError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ProxyError> for GatewayError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::Timeout => GatewayError::UpstreamTimeout,
            ProxyError::BodyTooLarge => GatewayError::PayloadTooLarge,
            ProxyError::Unavailable(msg) | ProxyError::InvalidRequest(msg) => {
                GatewayError::UpstreamUnavailable(msg)
            }
        }
    }
}

/// Build a `WWW-Authenticate` challenge (RFC 6750 §3).
///
/// A request without credentials gets a bare challenge; a rejected token gets
/// `error="invalid_token"`.
pub fn bearer_challenge(reason: RejectionReason, resource_metadata: Option<&str>) -> String {
    let mut challenge = format!("Bearer realm=\"{}\"", AUTH_REALM);
    if reason != RejectionReason::MissingToken {
        challenge.push_str(", error=\"invalid_token\"");
    }
    if let Some(url) = resource_metadata {
        challenge.push_str(&format!(", resource_metadata=\"{}\"", url));
    }
    challenge
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: &'static str,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (code, message) = match &self {
            GatewayError::Unauthorized {
                reason: RejectionReason::KeyFetchFailure,
                ..
            } => {
                tracing::warn!(target: "gateway.availability", "Signing keys unavailable, failing closed");
                (
                    "SERVICE_UNAVAILABLE",
                    "Service temporarily unavailable",
                )
            }
            GatewayError::Unauthorized { .. } => ("UNAUTHORIZED", "Unauthorized"),
            GatewayError::Forbidden(reason) => {
                tracing::debug!(target: "gateway.errors", reason = %reason, "Request forbidden");
                ("FORBIDDEN", "Forbidden")
            }
            GatewayError::RouteNotFound => ("NOT_FOUND", "Not found"),
            GatewayError::PayloadTooLarge => ("PAYLOAD_TOO_LARGE", "Request body too large"),
            GatewayError::UpstreamUnavailable(err) => {
                tracing::error!(target: "gateway.proxy", error = %err, "Upstream unavailable");
                ("BAD_GATEWAY", "Upstream service unavailable")
            }
            GatewayError::UpstreamTimeout => ("GATEWAY_TIMEOUT", "Upstream service timed out"),
            GatewayError::Internal => ("INTERNAL_ERROR", "An internal error occurred"),
        };

        let mut response = (
            status,
            Json(ErrorResponse {
                error: ErrorDetail { code, message },
            }),
        )
            .into_response();

        if let GatewayError::Unauthorized {
            reason,
            resource_metadata,
        } = &self
        {
            if status == StatusCode::UNAUTHORIZED {
                let challenge = bearer_challenge(*reason, resource_metadata.as_deref());
                if let Ok(value) = HeaderValue::from_str(&challenge) {
                    response
                        .headers_mut()
                        .insert(header::WWW_AUTHENTICATE, value);
                }
            }
        }

        response
    }
}
