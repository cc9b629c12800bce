//! MCP server for the weather tools.
//!
//! [`WeatherServer`] implements the tool handlers; [`mcp_service`] wraps it
//! in rmcp's Streamable HTTP transport, which owns sessions, SSE streams and
//! JSON-RPC framing.

use crate::provider::WeatherProvider;
use crate::tools;
use axum::http::request::Parts;
use chrono::Utc;
use common::jwt::Claims;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Implementation, ServerCapabilities, ServerInfo};
use rmcp::service::NotificationContext;
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use rmcp::{schemars, tool, tool_handler, tool_router, ErrorData as McpError, RoleServer, ServerHandler};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Server name reported in `initialize`.
pub const SERVER_NAME: &str = "weather";

/// Header carrying the MCP session id.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Keep-alive interval for open SSE streams.
const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);

/// The Streamable HTTP service type mounted by [`crate::routes::build_routes`].
pub type WeatherMcpService = StreamableHttpService<WeatherServer, LocalSessionManager>;

/// Arguments of `current_temperature`.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CoordinatesArgs {
    /// Latitude in decimal degrees, -90 to 90.
    pub lat: f64,
    /// Longitude in decimal degrees, -180 to 180.
    pub lon: f64,
}

/// Tool handlers. One clone serves each MCP session.
#[derive(Clone)]
pub struct WeatherServer {
    provider: Arc<dyn WeatherProvider>,
    tool_router: ToolRouter<WeatherServer>,
}

#[tool_router]
impl WeatherServer {
    pub fn new(provider: Arc<dyn WeatherProvider>) -> Self {
        Self {
            provider,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Get the current temperature in °C at a location.")]
    async fn current_temperature(
        &self,
        Parameters(CoordinatesArgs { lat, lon }): Parameters<CoordinatesArgs>,
    ) -> Result<CallToolResult, McpError> {
        tracing::debug!(target: "weather.tools", tool = tools::CURRENT_TEMPERATURE, "Tool called");

        match tools::current_temperature(self.provider.as_ref(), lat, lon).await {
            Ok(temperature) => Ok(CallToolResult::structured(
                json!({ "temperature": temperature }),
            )),
            Err(e) => e.into_call_result(),
        }
    }

    #[tool(description = "Get the current UTC time.")]
    async fn get_time(&self) -> Result<CallToolResult, McpError> {
        tracing::debug!(target: "weather.tools", tool = tools::GET_TIME, "Tool called");

        Ok(CallToolResult::structured(
            json!({ "time": tools::format_time(Utc::now()) }),
        ))
    }
}

#[tool_handler]
impl ServerHandler for WeatherServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "Use current_temperature for the temperature at a latitude/longitude and get_time for the current UTC time."
                    .to_string(),
            ),
        }
    }

    async fn on_initialized(&self, context: NotificationContext<RoleServer>) {
        // Behind the gateway the validated claims ride along on the request
        let subject_present = context
            .extensions
            .get::<Parts>()
            .and_then(|parts| parts.extensions.get::<Claims>())
            .is_some_and(|claims| !claims.sub.is_empty());

        tracing::info!(
            target: "weather.mcp",
            authenticated = subject_present,
            "MCP session initialized"
        );
    }
}

/// Streamable HTTP service for [`WeatherServer`].
///
/// Stateful: `initialize` opens a session, later requests must carry its
/// `mcp-session-id`, `GET` opens the server-to-client SSE stream and `DELETE`
/// ends the session. Cancelling `shutdown` closes every open stream.
pub fn mcp_service(provider: Arc<dyn WeatherProvider>, shutdown: CancellationToken) -> WeatherMcpService {
    let server = WeatherServer::new(provider);
    StreamableHttpService::new(
        move || Ok(server.clone()),
        Arc::new(LocalSessionManager::default()),
        StreamableHttpServerConfig {
            stateful_mode: true,
            sse_keep_alive: Some(SSE_KEEP_ALIVE),
            cancellation_token: shutdown,
            ..Default::default()
        },
    )
}
