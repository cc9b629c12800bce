//! HTTP routes for the weather tool.

use crate::config::Config;
use crate::handlers;
use crate::provider::{OpenMeteoClient, WeatherProvider};
use crate::server::mcp_service;
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// State shared by the weather tool handlers.
#[derive(Clone)]
pub struct WeatherState {
    /// Source of temperature readings.
    pub provider: Arc<dyn WeatherProvider>,

    /// Cancelled on shutdown; closes open MCP streams.
    pub shutdown: CancellationToken,
}

impl WeatherState {
    /// State backed by the Open-Meteo API described by `config`.
    pub fn from_config(config: &Config, shutdown: CancellationToken) -> Self {
        Self {
            provider: Arc::new(OpenMeteoClient::new(
                config.weather_api_url.clone(),
                config.weather_api_timeout,
            )),
            shutdown,
        }
    }
}

/// Build the tool's router.
///
/// - `/` and `/mcp` - MCP Streamable HTTP endpoint (POST, GET, DELETE)
/// - `GET /health` - liveness probe
///
/// Both MCP paths share one session store. No tracing, timeout or auth
/// layers are applied here; the caller (the gateway or the standalone
/// binary) owns those.
pub fn build_routes(state: Arc<WeatherState>) -> Router {
    let mcp = mcp_service(state.provider.clone(), state.shutdown.clone());

    Router::new()
        .route_service("/", mcp.clone())
        .route_service("/mcp", mcp)
        .route("/health", get(handlers::health_check))
}
