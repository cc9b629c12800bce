//! Weather tool error types.
//!
//! Provider failures become tool-level error results (`isError: true`);
//! bad arguments become a JSON-RPC `invalid params` error.
//! Upstream details are logged, never returned to the caller.

use rmcp::model::{CallToolResult, Content};
use rmcp::ErrorData as McpError;
use thiserror::Error;

/// Text of the tool error result returned when the provider fails.
pub const PROVIDER_FAILURE_MESSAGE: &str = "Unable to fetch the current temperature";

/// Errors from the weather data provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Weather API request failed: {0}")]
    Request(String),

    #[error("Weather API returned status {0}")]
    Status(u16),

    #[error("Weather API returned an unexpected payload: {0}")]
    InvalidResponse(String),
}

/// Errors from tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl ToolError {
    /// Map onto the MCP `tools/call` outcome.
    ///
    /// Argument errors are protocol errors; provider errors are reported
    /// inside a successful response as a tool error result.
    pub fn into_call_result(self) -> Result<CallToolResult, McpError> {
        match self {
            ToolError::InvalidArguments(message) => Err(McpError::invalid_params(message, None)),
            ToolError::Provider(e) => {
                tracing::warn!(target: "weather.tools", error = %e, "Temperature lookup failed");
                Ok(CallToolResult::error(vec![Content::text(
                    PROVIDER_FAILURE_MESSAGE,
                )]))
            }
        }
    }
}
