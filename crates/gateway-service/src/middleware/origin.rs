//! `Origin` validation for MCP Streamable HTTP.
//!
//! Browsers attach `Origin` to cross-site requests; a tool server reachable
//! from a browser must reject origins it does not trust (DNS rebinding).
//! Requests without `Origin` come from non-browser clients and are accepted
//! unless the policy says otherwise. `OPTIONS` always passes through.

use crate::errors::GatewayError;
use axum::{
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use weather_tool::server::SESSION_ID_HEADER;

/// How long browsers may cache a preflight response.
const CORS_MAX_AGE: Duration = Duration::from_secs(600);

/// Accepted origins for tool requests.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    allowed: HashSet<String>,
    allow_missing: bool,
}

/// Why an `Origin` was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginRejection {
    /// No `Origin` header and the policy requires one.
    Missing,

    /// `Origin` not in the allow list.
    NotAllowed,
}

impl OriginPolicy {
    pub fn new(allowed: impl IntoIterator<Item = String>, allow_missing: bool) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
            allow_missing,
        }
    }

    /// Check a request's method and `Origin` header.
    pub fn check(&self, method: &Method, origin: Option<&HeaderValue>) -> Result<(), OriginRejection> {
        if method == Method::OPTIONS {
            return Ok(());
        }

        match origin {
            None if self.allow_missing => Ok(()),
            None => Err(OriginRejection::Missing),
            Some(value) => match value.to_str() {
                Ok(origin) if self.allowed.contains(origin) => Ok(()),
                _ => Err(OriginRejection::NotAllowed),
            },
        }
    }

    /// CORS layer answering preflights for the allowed origins.
    ///
    /// Returns `None` when no origins are configured.
    pub fn cors_layer(&self) -> Option<CorsLayer> {
        let origins: Vec<HeaderValue> = self
            .allowed
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();
        if origins.is_empty() {
            return None;
        }

        Some(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers(AllowHeaders::mirror_request())
                .expose_headers([HeaderName::from_static(SESSION_ID_HEADER)])
                .max_age(CORS_MAX_AGE),
        )
    }
}

/// Reject requests whose `Origin` the policy does not accept (403).
pub async fn validate_origin(
    State(policy): State<Arc<OriginPolicy>>,
    req: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    match policy.check(req.method(), req.headers().get(header::ORIGIN)) {
        Ok(()) => Ok(next.run(req).await),
        Err(OriginRejection::Missing) => {
            tracing::info!(target: "gateway.middleware.origin", "Request without Origin refused");
            Err(GatewayError::Forbidden("Origin required".to_string()))
        }
        Err(OriginRejection::NotAllowed) => {
            tracing::info!(target: "gateway.middleware.origin", "Request from disallowed Origin refused");
            Err(GatewayError::Forbidden("Origin not allowed".to_string()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn policy(allow_missing: bool) -> OriginPolicy {
        OriginPolicy::new(["https://app.example.com".to_string()], allow_missing)
    }

    #[test]
    fn test_allowed_origin_passes() {
        let origin = HeaderValue::from_static("https://app.example.com");
        assert_eq!(policy(true).check(&Method::POST, Some(&origin)), Ok(()));
    }

    #[test]
    fn test_unknown_origin_is_refused() {
        let origin = HeaderValue::from_static("https://evil.example.com");
        assert_eq!(
            policy(true).check(&Method::POST, Some(&origin)),
            Err(OriginRejection::NotAllowed)
        );
    }

    #[test]
    fn test_origin_match_is_exact() {
        let origin = HeaderValue::from_static("https://app.example.com:443");
        assert_eq!(
            policy(true).check(&Method::POST, Some(&origin)),
            Err(OriginRejection::NotAllowed)
        );
    }

    #[test]
    fn test_missing_origin() {
        assert_eq!(policy(true).check(&Method::POST, None), Ok(()));
        assert_eq!(
            policy(false).check(&Method::POST, None),
            Err(OriginRejection::Missing)
        );
    }

    #[test]
    fn test_options_always_passes() {
        let origin = HeaderValue::from_static("https://evil.example.com");
        assert_eq!(policy(false).check(&Method::OPTIONS, Some(&origin)), Ok(()));
        assert_eq!(policy(false).check(&Method::OPTIONS, None), Ok(()));
    }

    #[test]
    fn test_empty_allow_list_refuses_any_origin() {
        let policy = OriginPolicy::new(Vec::new(), true);
        let origin = HeaderValue::from_static("http://localhost:3000");
        assert_eq!(
            policy.check(&Method::POST, Some(&origin)),
            Err(OriginRejection::NotAllowed)
        );
        assert!(policy.cors_layer().is_none());
    }

    #[test]
    fn test_cors_layer_built_for_allowed_origins() {
        assert!(policy(true).cors_layer().is_some());
    }
}
