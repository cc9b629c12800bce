//! Metrics definitions for the gateway.
//!
//! All metrics follow Prometheus naming conventions:
//! - `gateway_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: HTTP methods
//! - `endpoint`: fixed public paths, or the matched route prefix
//! - `outcome`/`reason`: bounded by [`RejectionReason`](crate::auth::RejectionReason)
//! - `target`: `upstream` or `local:<tool>`

use crate::routing::RouteTable;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Paths reported with their own `endpoint` label.
const PUBLIC_ENDPOINTS: &[&str] = &[
    "/health",
    "/ready",
    "/metrics",
    "/.well-known/oauth-protected-resource",
];

/// Initialize the Prometheus recorder and return the handle used to serve
/// `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("gateway_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("gateway_jwks_fetch".to_string()),
            &[0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000],
        )
        .map_err(|e| format!("Failed to set JWKS fetch buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `gateway_http_requests_total`, `gateway_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status` / `status_code`
///
/// `endpoint` should come from [`endpoint_label`].
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let endpoint = endpoint.to_string();
    let status = categorize_status_code(status_code);

    histogram!("gateway_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("gateway_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Map a request path to a bounded endpoint label.
///
/// Public paths label as themselves; a dispatched path labels as the prefix
/// of the route that `routes` selects for it; anything else is `/other`.
pub fn endpoint_label(path: &str, routes: &RouteTable) -> String {
    if PUBLIC_ENDPOINTS.contains(&path) {
        return path.to_string();
    }

    match routes.route(path) {
        Some(matched) => matched.route.prefix.clone(),
        None => "/other".to_string(),
    }
}

// ============================================================================
// Authentication Metrics
// ============================================================================

/// Record an authentication decision.
///
/// Metric: `gateway_auth_decisions_total`
/// Labels: `outcome` (`accepted`/`rejected`), `reason` (`none` when accepted)
pub fn record_auth_decision(outcome: &str, reason: Option<&str>) {
    counter!("gateway_auth_decisions_total",
        "outcome" => outcome.to_string(),
        "reason" => reason.unwrap_or("none").to_string()
    )
    .increment(1);
}

/// Record a JWKS fetch.
///
/// Metric: `gateway_jwks_fetches_total`, `gateway_jwks_fetch_duration_seconds`
/// Labels: `status` (`success` or a fetch error label)
pub fn record_jwks_fetch(status: &str, duration: Duration) {
    histogram!("gateway_jwks_fetch_duration_seconds").record(duration.as_secs_f64());

    counter!("gateway_jwks_fetches_total",
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Dispatch Metrics
// ============================================================================

/// Record a dispatch to a backend.
///
/// Metric: `gateway_dispatch_total`
/// Labels: `target` (`upstream`/`local:<tool>`), `status` (`success`/`error`/`timeout`)
pub fn record_dispatch(target: &str, status_code: u16) {
    counter!("gateway_dispatch_total",
        "target" => target.to_string(),
        "status" => categorize_status_code(status_code).to_string()
    )
    .increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    // The metrics facade records to a no-op recorder when none is installed,
    // so these tests exercise the recording paths without inspecting values.

    fn routes() -> RouteTable {
        RouteTable::parse("/weather=local:weather,/weather/v2=http://v2:9000,/geo/=http://geo:9000")
            .unwrap()
    }

    #[test]
    fn test_public_endpoints_label_as_themselves() {
        let r = routes();
        assert_eq!(endpoint_label("/health", &r), "/health");
        assert_eq!(endpoint_label("/ready", &r), "/ready");
        assert_eq!(endpoint_label("/metrics", &r), "/metrics");
        assert_eq!(
            endpoint_label("/.well-known/oauth-protected-resource", &r),
            "/.well-known/oauth-protected-resource"
        );
    }

    #[test]
    fn test_dispatched_paths_label_as_selected_prefix() {
        let r = routes();
        assert_eq!(endpoint_label("/weather", &r), "/weather");
        assert_eq!(endpoint_label("/weather/mcp", &r), "/weather");
        assert_eq!(endpoint_label("/weather/v2/mcp", &r), "/weather/v2");
        assert_eq!(endpoint_label("/geo/anything", &r), "/geo/");
    }

    #[test]
    fn test_label_agrees_with_routing() {
        let r = routes();
        for path in ["/weather/v2", "/weather/v20", "/geo/", "/weatherman", "/"] {
            let expected = r
                .route(path)
                .map_or("/other".to_string(), |m| m.route.prefix.clone());
            assert_eq!(endpoint_label(path, &r), expected, "path {path}");
        }
    }

    #[test]
    fn test_unknown_paths_are_bounded() {
        let r = routes();
        assert_eq!(endpoint_label("/weatherman", &r), "/other");
        assert_eq!(endpoint_label("/random/uuid-1234", &r), "/other");
        assert_eq!(endpoint_label("/", &r), "/other");
    }

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(202), "success");
        assert_eq!(categorize_status_code(401), "error");
        assert_eq!(categorize_status_code(502), "error");
        assert_eq!(categorize_status_code(504), "timeout");
    }

    #[test]
    fn test_record_functions_do_not_panic() {
        record_http_request("POST", "/weather", 200, Duration::from_millis(20));
        record_http_request("GET", "/health", 200, Duration::from_millis(1));
        record_auth_decision("accepted", None);
        record_auth_decision("rejected", Some("expired_token"));
        record_jwks_fetch("success", Duration::from_millis(40));
        record_jwks_fetch("timeout", Duration::from_secs(5));
        record_dispatch("local:weather", 200);
        record_dispatch("upstream", 502);
    }
}
