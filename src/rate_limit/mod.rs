//! Rate Limiting Module
//!
//! Tiered sliding-window rate limiting for inbound HTTP requests.
//!
//! # Features
//!
//! - Four caller tiers (anonymous, authenticated, premium, staff)
//! - Per-endpoint-class hourly quotas plus a per-tier burst quota
//! - Timestamp-list sliding windows in a pluggable shared store
//! - Explicit fail-open / fail-closed policy for store outages
//! - axum middleware emitting `X-RateLimit-*` headers and 429 responses
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │          rate_limit_middleware / RateLimiter::throttle       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                        RateLimiter                           │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐          │
//! │  │ QuotaTable  │  │ Rate window │  │ Burst window│          │
//! │  │ (immutable) │  │   (1 hour)  │  │  (1 minute) │          │
//! │  └─────────────┘  └─────────────┘  └─────────────┘          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │          WindowStore (MemoryWindowStore, ...)        │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod clock;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod identity;
pub mod limiter;
pub mod middleware;
pub mod store;
pub mod tier;

#[cfg(test)]
mod proptests;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    FailureMode, QuotaConfig, QuotaTable, RateLimitConfig, TierQuota, BURST_WINDOW, RATE_WINDOW,
};
pub use dashboard::{DashboardBuilder, DashboardData};
pub use error::RateLimitError;
pub use identity::{get_identifier, get_user_type, RequestDescriptor, UserDescriptor};
pub use limiter::{LimitReason, RateLimitDecision, RateLimitInfo, RateLimiter};
pub use middleware::{rate_limit_middleware, RateLimitState, Throttled};
pub use store::{MemoryWindowStore, WindowKey, WindowKind, WindowStore};
pub use tier::{EndpointClass, UserTier};
