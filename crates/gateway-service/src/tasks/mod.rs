//! Background tasks for the gateway.
//!
//! # Tasks
//!
//! - `jwks_refresher` - Periodically refreshes the signing key cache

pub mod jwks_refresher;

pub use jwks_refresher::start_jwks_refresher;
