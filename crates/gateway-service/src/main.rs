//! MCP Gateway
//!
//! Authenticating front door for MCP tool servers. Verifies bearer tokens
//! and routes admitted requests by path prefix.

use gateway_service::config::{Config, ConfigError, LogFormat};
use gateway_service::observability::metrics::init_metrics_recorder;
use gateway_service::routes::{self, AppState};
use gateway_service::tasks::start_jwks_refresher;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Config is read before tracing so the log format can be honoured; a
    // config error is still reported through tracing.
    let config = Config::from_env();
    init_tracing(match &config {
        Ok(config) => config.log_format,
        Err(_) => LogFormat::Text,
    });

    info!("Starting MCP Gateway");

    let config = config.map_err(|e: ConfigError| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        issuer = %config.issuer,
        audience = %config.audience,
        auth_algorithm = ?config.auth_algorithm,
        jwks_url = %config.jwks_url,
        jwt_clock_skew_seconds = config.jwt_clock_skew.as_secs(),
        routes = config.routes.routes().len(),
        "Configuration loaded successfully"
    );
    for route in config.routes.routes() {
        info!(
            prefix = %route.prefix,
            target = %route.target,
            keep_prefix = route.keep_prefix,
            "Route registered"
        );
    }

    // Must be installed before any metric is recorded
    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    let bind_address = config.bind_address.clone();
    let drain_period = config.drain_period;
    let refresh_interval = config.jwks_refresh_interval;

    let state = Arc::new(AppState::from_config(config));

    let shutdown = state.shutdown.clone();
    let refresher_handle = match &state.key_cache {
        Some(cache) => {
            // Prime the cache; the gateway still starts (and reports not
            // ready) if the identity provider is unreachable.
            match cache.refresh().await {
                Ok(()) => info!("Signing keys loaded"),
                Err(e) => warn!(error = %e, "Initial JWKS fetch failed, will retry on demand"),
            }
            Some(tokio::spawn(start_jwks_refresher(
                cache.clone(),
                refresh_interval,
                shutdown.child_token(),
            )))
        }
        None => None,
    };

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("MCP Gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move {
                shutdown_signal(drain_period).await;
                // Open SSE streams would otherwise hold the drain open
                shutdown.cancel();
            }
        })
        .await?;

    shutdown.cancel();
    if let Some(handle) = refresher_handle {
        if let Err(e) = handle.await {
            warn!(error = %e, "JWKS refresher task ended abnormally");
        }
    }

    info!("MCP Gateway shutdown complete");

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "gateway_service=info,weather_tool=info,tower_http=info".into()
    });

    let (json, text) = match format {
        LogFormat::Json => (Some(tracing_subscriber::fmt::layer().json()), None),
        LogFormat::Text => (None, Some(tracing_subscriber::fmt::layer())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .init();
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and the drain period is complete.
async fn shutdown_signal(drain_period: Duration) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    if drain_period.is_zero() {
        info!("Skipping drain period (GATEWAY_DRAIN_SECONDS=0)");
    } else {
        warn!("Draining connections for {} seconds...", drain_period.as_secs());
        tokio::time::sleep(drain_period).await;
        info!("Drain period complete");
    }
}
