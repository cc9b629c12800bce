//! Test server harness for end-to-end testing.
//!
//! Provides `TestGatewayServer` for spawning real gateway instances in tests.

use crate::token_builders::{TEST_AUDIENCE, TEST_ISSUER};
use gateway_service::config::Config;
use gateway_service::routes::{self, AppState};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;

/// Process-wide metrics handle; a global recorder can be installed only once.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics handle shared by all test servers in the process.
pub fn test_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            gateway_service::observability::metrics::init_metrics_recorder()
                .unwrap_or_else(|_| PrometheusBuilder::new().build_recorder().handle())
        })
        .clone()
}

/// Base configuration for a test gateway verifying RS256 tokens from `jwks_url`.
pub fn test_vars(jwks_url: &str) -> HashMap<String, String> {
    HashMap::from([
        ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
        ("ISSUER_URL".to_string(), TEST_ISSUER.to_string()),
        ("AUDIENCE".to_string(), TEST_AUDIENCE.to_string()),
        ("JWKS_URL".to_string(), jwks_url.to_string()),
        ("JWKS_FETCH_TIMEOUT_SECONDS".to_string(), "2".to_string()),
        ("GATEWAY_DRAIN_SECONDS".to_string(), "0".to_string()),
    ])
}

/// Test harness for spawning the gateway in integration tests.
///
/// # Example
/// ```rust,ignore
/// let jwks = MockServer::start().await;
/// let server = TestGatewayServer::spawn(test_vars(&format!("{}/jwks", jwks.uri()))).await?;
///
/// let response = reqwest::get(format!("{}/health", server.url())).await?;
/// assert_eq!(response.status(), 200);
/// ```
pub struct TestGatewayServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    _handle: JoinHandle<()>,
}

impl TestGatewayServer {
    /// Spawn a gateway configured from `vars`.
    ///
    /// The server binds 127.0.0.1:0 and serves in the background. The key
    /// cache is NOT primed; use [`TestGatewayServer::spawn_primed`] for that.
    pub async fn spawn(vars: HashMap<String, String>) -> Result<Self, anyhow::Error> {
        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let state = Arc::new(AppState::from_config(config));
        let app = routes::build_routes(state.clone(), test_metrics_handle());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            state,
            _handle: handle,
        })
    }

    /// Spawn a gateway and load its key set before returning.
    pub async fn spawn_primed(vars: HashMap<String, String>) -> Result<Self, anyhow::Error> {
        let server = Self::spawn(vars).await?;
        if let Some(cache) = &server.state.key_cache {
            cache
                .refresh()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to prime key cache: {}", e))?;
        }
        Ok(server)
    }

    /// Base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Shared application state (config, key cache, validator).
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }
}

impl Drop for TestGatewayServer {
    fn drop(&mut self) {
        self.state.shutdown.cancel();
        self._handle.abort();
    }
}
