//! CloudEngineered Rate Limiting Library
//!
//! Tiered sliding-window rate limiting for the CloudEngineered HTTP surface,
//! plus the ambient pieces the `ce-ratelimit` service needs: configuration,
//! logging, Prometheus metrics and the axum server.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod rate_limit;
pub mod server;
