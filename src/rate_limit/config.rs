//! Rate Limit Configuration
//!
//! Quota tables per caller tier and endpoint class, the window lengths, and
//! the policy for store failures. The configuration is built once at startup
//! and resolved into an immutable [`QuotaTable`] that the limiter owns.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use super::error::RateLimitError;
use super::tier::{EndpointClass, UserTier};

/// Hourly sliding window length in seconds
pub const RATE_WINDOW: u64 = 3600;

/// Burst sliding window length in seconds
pub const BURST_WINDOW: u64 = 60;

/// Extra lifetime given to stored windows beyond the window length
pub const TTL_GRACE: u64 = 60;

/// Hourly limit used when a cell is missing and anonymous/default is missing too
pub const FAIL_CLOSED_RATE_LIMIT: u32 = 100;

/// Burst limit used when a cell is missing and the anonymous burst is missing too
pub const FAIL_CLOSED_BURST_LIMIT: u32 = 20;

/// What to do when the window store cannot be reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    /// Admit the request and log the store error
    #[default]
    Open,
    /// Reject the request
    Closed,
}

impl FromStr for FailureMode {
    type Err = RateLimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(FailureMode::Open),
            "closed" => Ok(FailureMode::Closed),
            other => Err(RateLimitError::InvalidConfig(format!(
                "unknown failure mode '{}', expected 'open' or 'closed'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for FailureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureMode::Open => write!(f, "open"),
            FailureMode::Closed => write!(f, "closed"),
        }
    }
}

/// Quotas for one tier. Missing values fail closed when resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TierQuota {
    /// Requests per hour for `default` endpoints
    pub default: Option<u32>,
    /// Requests per hour for `api` endpoints
    pub api: Option<u32>,
    /// Requests per hour for `search` endpoints
    pub search: Option<u32>,
    /// Requests per hour for `view` endpoints
    pub view: Option<u32>,
    /// Requests per burst window, shared by all endpoint classes
    pub burst: Option<u32>,
}

impl TierQuota {
    /// Fully specified tier quota
    pub fn new(default: u32, api: u32, search: u32, view: u32, burst: u32) -> Self {
        Self {
            default: Some(default),
            api: Some(api),
            search: Some(search),
            view: Some(view),
            burst: Some(burst),
        }
    }

    /// Hourly limit for an endpoint class, if configured
    pub fn hourly(&self, class: EndpointClass) -> Option<u32> {
        match class {
            EndpointClass::Default => self.default,
            EndpointClass::Api => self.api,
            EndpointClass::Search => self.search,
            EndpointClass::View => self.view,
        }
    }
}

/// Quota rows for all four tiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuotaConfig {
    pub anonymous: TierQuota,
    pub authenticated: TierQuota,
    pub premium: TierQuota,
    pub staff: TierQuota,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            anonymous: TierQuota::new(100, 50, 30, 200, 20),
            authenticated: TierQuota::new(500, 200, 100, 1000, 60),
            premium: TierQuota::new(2000, 1000, 500, 5000, 120),
            staff: TierQuota::new(10000, 5000, 2000, 20000, 300),
        }
    }
}

impl QuotaConfig {
    pub fn tier(&self, tier: UserTier) -> &TierQuota {
        match tier {
            UserTier::Anonymous => &self.anonymous,
            UserTier::Authenticated => &self.authenticated,
            UserTier::Premium => &self.premium,
            UserTier::Staff => &self.staff,
        }
    }
}

/// Rate limit configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,

    /// Hourly window length in seconds
    pub rate_window_secs: u64,

    /// Burst window length in seconds
    pub burst_window_secs: u64,

    /// Seconds added to the window length when setting store TTLs
    pub ttl_grace_secs: u64,

    /// Behaviour when the window store fails
    pub failure_mode: FailureMode,

    /// Use the first `X-Forwarded-For` entry as the caller address
    pub trust_forwarded_for: bool,

    /// Path prefixes that bypass the global middleware
    pub excluded_paths: Vec<String>,

    /// Per-tier quotas
    pub quotas: QuotaConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rate_window_secs: RATE_WINDOW,
            burst_window_secs: BURST_WINDOW,
            ttl_grace_secs: TTL_GRACE,
            failure_mode: FailureMode::default(),
            trust_forwarded_for: true,
            excluded_paths: ["/admin/", "/static/", "/media/", "/health/", "/metrics/"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
            quotas: QuotaConfig::default(),
        }
    }
}

impl RateLimitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable rate limiting (for testing)
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Default settings with a replacement quota table
    pub fn with_quotas(quotas: QuotaConfig) -> Self {
        Self {
            quotas,
            ..Self::default()
        }
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs)
    }

    pub fn burst_window(&self) -> Duration {
        Duration::from_secs(self.burst_window_secs)
    }

    /// Store TTL for a window of the given length
    pub fn ttl_for(&self, window_secs: u64) -> Duration {
        Duration::from_secs(window_secs + self.ttl_grace_secs)
    }

    /// Whether the global middleware should skip this path
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded_paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Apply `CLOUDENGINEERED_*` environment overrides
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("CLOUDENGINEERED_RATE_LIMIT_ENABLED") {
            self.enabled = val.parse().unwrap_or(self.enabled);
        }

        if let Ok(val) = std::env::var("CLOUDENGINEERED_FAILURE_MODE") {
            match val.parse() {
                Ok(mode) => self.failure_mode = mode,
                Err(e) => warn!("Ignoring CLOUDENGINEERED_FAILURE_MODE: {}", e),
            }
        }

        self
    }

    /// Validate windows and the resolved quota table
    pub fn validate(&self) -> Result<()> {
        if self.rate_window_secs == 0 {
            bail!("rate_window_secs must be > 0");
        }
        if self.burst_window_secs == 0 {
            bail!("burst_window_secs must be > 0");
        }
        if self.burst_window_secs > self.rate_window_secs {
            bail!(
                "burst_window_secs ({}) must not exceed rate_window_secs ({})",
                self.burst_window_secs,
                self.rate_window_secs
            );
        }
        for prefix in &self.excluded_paths {
            if !prefix.starts_with('/') {
                bail!("Excluded path '{}' must start with '/'", prefix);
            }
        }

        let (table, _) = QuotaTable::build(self);

        for tier in UserTier::ALL {
            if table.burst_limit(tier) == 0 {
                bail!("Burst limit for tier '{}' must be > 0", tier);
            }
            for class in EndpointClass::ALL {
                let hourly = table.rate_limit(tier, class);
                if hourly == 0 {
                    bail!("Rate limit for {}/{} must be > 0", tier, class);
                }
                if hourly < table.burst_limit(tier) {
                    bail!(
                        "Rate limit for {}/{} ({}) is below the tier burst limit ({})",
                        tier,
                        class,
                        hourly,
                        table.burst_limit(tier)
                    );
                }
            }
        }

        for pair in UserTier::ALL.windows(2) {
            let (lower, higher) = (pair[0], pair[1]);
            if table.burst_limit(higher) < table.burst_limit(lower) {
                bail!(
                    "Burst limit for '{}' must not be lower than for '{}'",
                    higher,
                    lower
                );
            }
            for class in EndpointClass::ALL {
                if table.rate_limit(higher, class) < table.rate_limit(lower, class) {
                    bail!(
                        "Rate limit for {}/{} must not be lower than for {}/{}",
                        higher,
                        class,
                        lower,
                        class
                    );
                }
            }
        }

        Ok(())
    }
}

/// One row of a resolved quota table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRow {
    pub tier: UserTier,
    pub default: u32,
    pub api: u32,
    pub search: u32,
    pub view: u32,
    pub burst: u32,
}

/// Total, immutable quota lookup built from a [`RateLimitConfig`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaTable {
    rate: [[u32; 4]; 4],
    burst: [u32; 4],
}

impl QuotaTable {
    /// Resolve the configured quotas, filling missing cells with the
    /// anonymous/default values
    pub fn resolve(config: &RateLimitConfig) -> Self {
        let (table, filled) = Self::build(config);
        for cell in filled {
            warn!(cell = %cell, "Quota not configured, using anonymous fallback");
        }
        table
    }

    fn build(config: &RateLimitConfig) -> (Self, Vec<String>) {
        let anonymous = &config.quotas.anonymous;
        let fallback_rate = anonymous.default.unwrap_or(FAIL_CLOSED_RATE_LIMIT);
        let fallback_burst = anonymous.burst.unwrap_or(FAIL_CLOSED_BURST_LIMIT);

        let mut filled = Vec::new();
        let mut rate = [[0u32; 4]; 4];
        let mut burst = [0u32; 4];

        for tier in UserTier::ALL {
            let quota = config.quotas.tier(tier);
            for class in EndpointClass::ALL {
                rate[tier.index()][class.index()] = quota.hourly(class).unwrap_or_else(|| {
                    filled.push(format!("{}.{}", tier, class));
                    fallback_rate
                });
            }
            burst[tier.index()] = quota.burst.unwrap_or_else(|| {
                filled.push(format!("{}.burst", tier));
                fallback_burst
            });
        }

        (Self { rate, burst }, filled)
    }

    /// Requests per rate window
    pub fn rate_limit(&self, tier: UserTier, class: EndpointClass) -> u32 {
        self.rate[tier.index()][class.index()]
    }

    /// Requests per burst window
    pub fn burst_limit(&self, tier: UserTier) -> u32 {
        self.burst[tier.index()]
    }

    pub fn rows(&self) -> Vec<QuotaRow> {
        UserTier::ALL
            .iter()
            .map(|&tier| QuotaRow {
                tier,
                default: self.rate_limit(tier, EndpointClass::Default),
                api: self.rate_limit(tier, EndpointClass::Api),
                search: self.rate_limit(tier, EndpointClass::Search),
                view: self.rate_limit(tier, EndpointClass::View),
                burst: self.burst_limit(tier),
            })
            .collect()
    }
}

impl Default for QuotaTable {
    fn default() -> Self {
        Self::resolve(&RateLimitConfig::default())
    }
}
