//! Middleware for the gateway.
//!
//! # Components
//!
//! - `auth` - Bearer token admission for tool routes
//! - `origin` - `Origin` validation and CORS for browser MCP clients
//! - `http_metrics` - Request metrics for every response

pub mod auth;
pub mod http_metrics;
pub mod origin;

pub use auth::{require_auth, AuthState};
pub use http_metrics::{http_metrics_middleware, MetricsState};
pub use origin::{validate_origin, OriginPolicy};
