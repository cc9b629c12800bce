//! Authentication middleware for tool routes.
//!
//! Runs the token validator on the raw `Authorization` header and injects
//! the admitted [`Claims`] into request extensions. Rejected requests never
//! reach routing.

use crate::auth::{Claims, RejectionReason, TokenValidator};
use crate::errors::GatewayError;
use crate::observability::metrics::record_auth_decision;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    /// Validator pinned to the configured issuer, audience and algorithm.
    pub validator: Arc<TokenValidator>,

    /// RFC 9728 metadata URL advertised in 401 challenges.
    pub resource_metadata_url: Option<String>,
}

/// Admit the request or reject it with 401 (503 if keys are unavailable).
///
/// # Authorization Header Format
///
/// ```text
/// Authorization: Bearer <token>
/// ```
#[instrument(skip_all, name = "gateway.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let result = match req.headers().get(header::AUTHORIZATION) {
        None => state.validator.validate(None).await,
        Some(value) => match value.to_str() {
            Ok(value) => state.validator.validate(Some(value)).await,
            Err(_) => Err(RejectionReason::MalformedToken),
        },
    };

    match result {
        Ok(claims) => {
            tracing::debug!(target: "gateway.middleware.auth", "Request admitted");
            record_auth_decision("accepted", None);
            req.extensions_mut().insert(claims);
            Ok(next.run(req).await)
        }
        Err(reason) => {
            tracing::info!(
                target: "gateway.middleware.auth",
                reason = reason.as_str(),
                "Request rejected"
            );
            record_auth_decision("rejected", Some(reason.as_str()));
            Err(GatewayError::Unauthorized {
                reason,
                resource_metadata: state.resource_metadata_url.clone(),
            })
        }
    }
}

/// Extension trait for extracting claims from a request.
pub trait ClaimsExt {
    /// The admitted claims, or `None` if the auth middleware did not run.
    fn claims(&self) -> Option<&Claims>;
}

impl<B> ClaimsExt for axum::extract::Request<B> {
    fn claims(&self) -> Option<&Claims> {
        self.extensions().get::<Claims>()
    }
}
