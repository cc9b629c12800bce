//! Observability for the gateway: Prometheus metrics definitions.

pub mod metrics;
