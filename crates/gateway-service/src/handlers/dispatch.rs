//! Dispatch of admitted requests to the backend selected by the route table.

use crate::errors::GatewayError;
use crate::observability::metrics::record_dispatch;
use crate::routes::AppState;
use crate::routing::BackendTarget;
use axum::extract::{Request, State};
use axum::http::Uri;
use axum::response::Response;
use axum::Router;
use std::sync::Arc;
use tower::ServiceExt;
use tracing::instrument;

/// Route an authenticated request and forward it.
///
/// - No matching prefix: 404
/// - Local tool: the tool's router is called in-process with the forwarded path
/// - Upstream: the request is proxied; failures map to 502/504
#[instrument(skip_all, name = "gateway.dispatch", fields(target = tracing::field::Empty))]
pub async fn dispatch(
    State(state): State<Arc<AppState>>,
    req: Request,
) -> Result<Response, GatewayError> {
    let path = req.uri().path().to_string();

    let Some(matched) = state.config.routes.route(&path) else {
        tracing::debug!(target: "gateway.routing", path = %path, "No route matched");
        return Err(GatewayError::RouteNotFound);
    };

    let target = matched.route.target.label();
    tracing::Span::current().record("target", target.as_str());
    tracing::debug!(
        target: "gateway.routing",
        prefix = %matched.route.prefix,
        forwarded_path = %matched.forwarded_path,
        "Route matched"
    );

    let result = match &matched.route.target {
        BackendTarget::Local { tool } => match state.local_tools.get(tool) {
            Some(router) => call_local(router.clone(), &matched.forwarded_path, req).await,
            None => {
                tracing::error!(target: "gateway.routing", tool = %tool, "Local tool is not registered");
                Err(GatewayError::Internal)
            }
        },
        BackendTarget::Upstream { base_url } => state
            .upstream
            .forward(base_url, &matched.forwarded_path, req)
            .await
            .map_err(GatewayError::from),
    };

    let status = match &result {
        Ok(response) => response.status().as_u16(),
        Err(err) => err.status_code().as_u16(),
    };
    record_dispatch(&target, status);

    result
}

/// Call an in-process tool router with the request rewritten to `forwarded_path`.
async fn call_local(
    router: Router,
    forwarded_path: &str,
    mut req: Request,
) -> Result<Response, GatewayError> {
    let path_and_query = match req.uri().query() {
        Some(query) => format!("{}?{}", forwarded_path, query),
        None => forwarded_path.to_string(),
    };

    let uri = Uri::builder()
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| {
            tracing::warn!(target: "gateway.routing", error = %e, "Failed to rewrite request URI");
            GatewayError::Internal
        })?;
    *req.uri_mut() = uri;

    match router.oneshot(req).await {
        Ok(response) => Ok(response),
        Err(never) => match never {},
    }
}
