//! HTTP metrics middleware.
//!
//! Captures metrics for every response, including rejections produced by
//! the auth and origin middleware and framework-level errors (404, 405).
//! Applied as the outermost layer.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;

use crate::observability::metrics::{endpoint_label, record_http_request};
use crate::routing::RouteTable;

/// Route table used to label dispatched requests by their matched prefix.
#[derive(Debug, Clone)]
pub struct MetricsState {
    pub routes: Arc<RouteTable>,
}

/// Records method, normalized endpoint, status code and duration.
pub async fn http_metrics_middleware(
    State(state): State<MetricsState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let endpoint = endpoint_label(request.uri().path(), &state.routes);

    let response = next.run(request).await;

    record_http_request(
        &method,
        &endpoint,
        response.status().as_u16(),
        start.elapsed(),
    );

    response
}
