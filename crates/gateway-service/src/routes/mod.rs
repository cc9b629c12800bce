//! HTTP routes for the gateway.
//!
//! Defines the Axum router and application state.

use crate::auth::{KeySetCache, TokenValidator};
use crate::config::{AuthAlgorithm, Config};
use crate::handlers;
use crate::handlers::metadata::METADATA_PATH;
use crate::middleware::{
    http_metrics_middleware, require_auth, validate_origin, AuthState, MetricsState, OriginPolicy,
};
use crate::routing::proxy::UpstreamClient;
use crate::routing::{BackendTarget, WEATHER_TOOL};
use axum::{
    middleware,
    routing::{any, get},
    Router,
};
use common::secret::{ExposeSecret, SecretString};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use weather_tool::routes::WeatherState;

/// Headroom between the upstream timeout and the overall request timeout, so
/// a slow upstream surfaces as 504 rather than a generic timeout.
const REQUEST_TIMEOUT_HEADROOM: Duration = Duration::from_secs(5);

/// Application state shared across all handlers.
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Token validator pinned to the configured algorithm.
    pub validator: Arc<TokenValidator>,

    /// Signing key cache (RS256 only).
    pub key_cache: Option<Arc<KeySetCache>>,

    /// In-process tool routers by tool name.
    pub local_tools: HashMap<String, Router>,

    /// Client for upstream tool servers.
    pub upstream: UpstreamClient,

    /// Cancelled on shutdown. Background tasks and open MCP streams hold
    /// child tokens.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Build the validator, key cache and backends described by `config`.
    pub fn from_config(config: Config) -> Self {
        let (validator, key_cache) = match (&config.auth_algorithm, &config.secret_key) {
            (AuthAlgorithm::Hs256, Some(secret)) => (
                TokenValidator::with_shared_secret(
                    SecretString::from(secret.expose_secret()),
                    config.issuer.clone(),
                    config.audience.clone(),
                    config.jwt_clock_skew,
                ),
                None,
            ),
            _ => {
                let cache = Arc::new(KeySetCache::new(
                    config.jwks_url.clone(),
                    config.jwks_fetch_timeout,
                ));
                (
                    TokenValidator::with_jwks(
                        cache.clone(),
                        config.issuer.clone(),
                        config.audience.clone(),
                        config.jwt_clock_skew,
                    ),
                    Some(cache),
                )
            }
        };

        let shutdown = CancellationToken::new();
        let mut local_tools = HashMap::new();
        for route in config.routes.routes() {
            if let BackendTarget::Local { tool } = &route.target {
                if tool == WEATHER_TOOL && !local_tools.contains_key(tool) {
                    let weather = Arc::new(WeatherState::from_config(
                        &config.weather,
                        shutdown.child_token(),
                    ));
                    local_tools.insert(tool.clone(), weather_tool::routes::build_routes(weather));
                }
            }
        }

        let upstream = UpstreamClient::new(config.upstream_timeout);

        Self {
            config,
            validator: Arc::new(validator),
            key_cache,
            local_tools,
            upstream,
            shutdown,
        }
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe - public
/// - `/ready` - Readiness probe (signing keys loaded) - public
/// - `/metrics` - Prometheus metrics endpoint - public
/// - `/.well-known/oauth-protected-resource` - RFC 9728 metadata - public
/// - every other path - Origin check, token admission, then dispatch by
///   route prefix
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - Request timeout slightly above the upstream timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let auth_state = Arc::new(AuthState {
        validator: state.validator.clone(),
        resource_metadata_url: state.config.resource_metadata_url(),
    });
    let origin_policy = Arc::new(OriginPolicy::new(
        state.config.allowed_origins.clone(),
        state.config.allow_no_origin,
    ));
    let metrics_state = MetricsState {
        routes: Arc::new(state.config.routes.clone()),
    };
    let request_timeout = state.config.upstream_timeout + REQUEST_TIMEOUT_HEADROOM;
    let cors = origin_policy.cors_layer();

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route(METADATA_PATH, get(handlers::protected_resource_metadata))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Tool routes: origin checked first, then the token, then the route table
    let protected_routes = Router::new()
        .route("/", any(handlers::dispatch))
        .route("/*path", any(handlers::dispatch))
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth))
        .route_layer(middleware::from_fn_with_state(origin_policy, validate_origin))
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. CorsLayer - Answer preflights (only with allowed origins)
    // 4. http_metrics_middleware - Record ALL responses (outermost)
    let app = public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http());

    let app = match cors {
        Some(cors) => app.layer(cors),
        None => app,
    };

    app.layer(middleware::from_fn_with_state(
        metrics_state,
        http_metrics_middleware,
    ))
}
