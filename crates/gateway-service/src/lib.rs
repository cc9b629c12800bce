//! MCP Gateway Service Library
//!
//! Authenticating gateway in front of MCP tool servers. Every tool request
//! must carry a bearer token issued by the configured identity provider; the
//! gateway verifies it (signature against the provider's JWKS or a shared
//! secret, then issuer, audience and expiry) and only then routes the request
//! by path prefix to an in-process tool or an upstream tool server.
//!
//! # Modules
//!
//! - `auth` - Signing key cache and token validation
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status mapping
//! - `handlers` - HTTP handlers (dispatch, health, metadata, metrics)
//! - `middleware` - Auth, Origin and metrics middleware
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup and application state
//! - `routing` - Route table and upstream forwarding
//! - `tasks` - Background JWKS refresh

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod routes;
pub mod routing;
pub mod tasks;
