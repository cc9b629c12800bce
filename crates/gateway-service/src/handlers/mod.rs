//! HTTP request handlers for the gateway.

pub mod dispatch;
pub mod health;
pub mod metadata;
pub mod metrics;

pub use dispatch::dispatch;
pub use health::{health_check, readiness_check};
pub use metadata::protected_resource_metadata;
pub use metrics::metrics_handler;
