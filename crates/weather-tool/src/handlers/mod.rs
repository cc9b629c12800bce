//! HTTP request handlers for the weather tool.
//!
//! The MCP endpoint itself is rmcp's service; see [`crate::server`].

pub mod health;

pub use health::health_check;
