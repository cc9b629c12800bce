//! OAuth 2.0 Protected Resource Metadata (RFC 9728).
//!
//! Lets MCP clients discover which authorization server issues tokens for
//! this gateway. Served only when `RESOURCE_URL` is configured.

use crate::errors::GatewayError;
use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

/// Path of the metadata document.
pub const METADATA_PATH: &str = "/.well-known/oauth-protected-resource";

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ProtectedResourceMetadata {
    pub resource: String,
    pub authorization_servers: Vec<String>,
    pub bearer_methods_supported: Vec<&'static str>,
}

/// Handler for GET /.well-known/oauth-protected-resource
///
/// ```json
/// {
///   "resource": "https://gw.example.com",
///   "authorization_servers": ["https://idp.example.com/realms/tools"],
///   "bearer_methods_supported": ["header"]
/// }
/// ```
#[tracing::instrument(skip_all, name = "gateway.metadata")]
pub async fn protected_resource_metadata(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ProtectedResourceMetadata>, GatewayError> {
    let resource = state
        .config
        .resource_url
        .clone()
        .ok_or(GatewayError::RouteNotFound)?;

    Ok(Json(ProtectedResourceMetadata {
        resource,
        authorization_servers: vec![state.config.issuer.clone()],
        bearer_methods_supported: vec!["header"],
    }))
}
