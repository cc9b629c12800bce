//! Weather MCP tool server.
//!
//! Exposes the `current_temperature` and `get_time` tools over MCP
//! Streamable HTTP (rmcp). The router built by [`routes::build_routes`]
//! is mounted in-process by the gateway as a local tool, or served on its
//! own internal port by the `weather-tool` binary as an upstream backend.
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Tool and provider error types
//! - `handlers` - HTTP handlers (health)
//! - `provider` - Weather data provider (Open-Meteo client)
//! - `routes` - Axum router setup
//! - `server` - MCP tool handlers and the Streamable HTTP service
//! - `tools` - Tool logic (coordinate checks, time formatting)

pub mod config;
pub mod errors;
pub mod handlers;
pub mod provider;
pub mod routes;
pub mod server;
pub mod tools;
