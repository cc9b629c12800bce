//! # Gateway Test Utilities
//!
//! Shared test utilities for the MCP gateway.
//!
//! This crate provides:
//! - RSA key fixtures and JWKS documents (`crypto_fixtures`)
//! - A claims/token builder (`TestTokenBuilder`)
//! - Server test harness (`TestGatewayServer` for end-to-end tests)
//! - An MCP Streamable HTTP client (`McpTestSession`) for driving tools
//!   through the gateway
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gateway_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<()> {
//!     let jwks = MockServer::start().await;
//!     Mock::given(method("GET"))
//!         .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json(&[KEY_ONE])))
//!         .mount(&jwks)
//!         .await;
//!
//!     let server = TestGatewayServer::spawn(test_vars(&jwks.uri())).await?;
//!     let token = TestTokenBuilder::new().sign_rs256(&KEY_ONE);
//!     // ...
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod mcp_client;
pub mod server_harness;
pub mod token_builders;

pub use crypto_fixtures::*;
pub use mcp_client::*;
pub use server_harness::*;
pub use token_builders::*;
