//! Liveness and readiness probes.

use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

/// Service name reported by `/health`.
pub const SERVICE_NAME: &str = "mcp-gateway";

/// Liveness response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

/// Readiness response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,

    /// Number of signing keys currently cached (JWKS mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_keys: Option<usize>,

    /// When the cached key set was fetched (JWKS mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys_fetched_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

/// Liveness probe. Always 200 while the process is serving.
///
/// ```json
/// {"status": "healthy", "service": "mcp-gateway"}
/// ```
#[instrument(skip_all, name = "gateway.health.check")]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
    })
}

/// Readiness probe.
///
/// Ready once a key set has been loaded from the JWKS endpoint; a gateway
/// verifying HS256 with a shared secret has nothing to load and is always
/// ready. Returns 503 until then so no traffic is sent to an instance that
/// would fail every token.
#[instrument(skip_all, name = "gateway.health.ready")]
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let Some(cache) = &state.key_cache else {
        return (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ready",
                signing_keys: None,
                keys_fetched_at: None,
                error: None,
            }),
        );
    };

    match cache.snapshot().await {
        Some(keys) => (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ready",
                signing_keys: Some(keys.len()),
                keys_fetched_at: Some(keys.fetched_at()),
                error: None,
            }),
        ),
        None => {
            tracing::debug!(target: "gateway.health", "Readiness check failed: no signing keys loaded");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    status: "not_ready",
                    signing_keys: None,
                    keys_fetched_at: None,
                    error: Some("signing keys not loaded"),
                }),
            )
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_omits_empty_fields() {
        let json = serde_json::to_value(ReadinessResponse {
            status: "ready",
            signing_keys: None,
            keys_fetched_at: None,
            error: None,
        })
        .unwrap();

        assert_eq!(json, serde_json::json!({"status": "ready"}));
    }

    #[tokio::test]
    async fn test_health_body() {
        let Json(body) = health_check().await;
        assert_eq!(body.status, "healthy");
        assert_eq!(body.service, "mcp-gateway");
    }
}
