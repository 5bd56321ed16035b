//! Sliding-Window Rate Limiter
//!
//! Every identity gets two independent windows per endpoint class: an hourly
//! "rate" window and a per-minute "burst" window. Each window is a list of
//! UNIX timestamps in the [`WindowStore`]. A check prunes both lists, rejects
//! if either is full, and otherwise appends `now` to both.
//!
//! # Concurrency
//!
//! The read-prune-check-append sequence for one (identifier, endpoint class)
//! pair is serialised by a striped async lock, so concurrent checks through
//! the same `RateLimiter` (and its clones) never over-admit. Separate
//! processes sharing a remote store are not coordinated and may each admit
//! a request the other has already counted.
//!
//! # Store failures
//!
//! Store errors never escape. [`FailureMode::Open`] admits and logs,
//! [`FailureMode::Closed`] rejects.
//!
//! The two lists are written one after the other, burst first. If the rate
//! write then fails, the admitted request is counted in the burst window
//! only; that window is short, so the skew clears within a minute.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};
use super::config::{FailureMode, QuotaTable, RateLimitConfig};
use super::dashboard::DecisionStats;
use super::error::RateLimitError;
use super::identity::{self, RequestDescriptor, UserDescriptor};
use super::store::{MemoryWindowStore, WindowKey, WindowStore};
use super::tier::{EndpointClass, UserTier};
use crate::metrics;

const LOCK_STRIPES: usize = 64;

/// Quota state reported with every decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    /// Requests allowed per rate window
    pub rate_limit: u32,
    /// Requests left in the rate window
    pub rate_remaining: u32,
    /// UNIX seconds at which a full rate window will have elapsed
    pub rate_reset: u64,
    pub burst_limit: u32,
    pub burst_remaining: u32,
    pub burst_reset: u64,
}

/// Why a request was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitReason {
    /// Hourly window full
    Rate,
    /// Burst window full
    Burst,
    /// Both windows full
    RateAndBurst,
    /// Store failed under [`FailureMode::Closed`]
    StoreUnavailable,
}

/// Outcome of one rate limit check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    /// Whether the request must be refused
    pub limited: bool,

    pub info: RateLimitInfo,

    pub identifier: String,

    pub tier: UserTier,

    pub endpoint_class: EndpointClass,

    /// Seconds until the rejecting window(s) admit again
    pub retry_after: Option<u64>,

    pub reason: Option<LimitReason>,
}

impl RateLimitDecision {
    /// The `(is_limited, info)` pair
    pub fn into_parts(self) -> (bool, RateLimitInfo) {
        (self.limited, self.info)
    }
}

/// Rate limiter over a shared window store
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: Arc<RateLimitConfig>,
    quotas: Arc<QuotaTable>,
    store: Arc<dyn WindowStore>,
    clock: Arc<dyn Clock>,
    locks: Arc<[Mutex<()>]>,
    stats: DecisionStats,
}

impl RateLimiter {
    /// Create a limiter on the wall clock
    pub fn new(config: RateLimitConfig, store: Arc<dyn WindowStore>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    /// Create a limiter with an explicit time source
    pub fn with_clock(
        config: RateLimitConfig,
        store: Arc<dyn WindowStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let quotas = QuotaTable::resolve(&config);
        let locks: Vec<Mutex<()>> = (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect();

        Self {
            config: Arc::new(config),
            quotas: Arc::new(quotas),
            store,
            clock,
            locks: locks.into(),
            stats: DecisionStats::new(),
        }
    }

    /// Limiter backed by a fresh [`MemoryWindowStore`]
    pub fn in_memory(config: RateLimitConfig) -> Self {
        Self::new(config, Arc::new(MemoryWindowStore::new()))
    }

    /// Limiter that admits everything (for testing)
    pub fn disabled() -> Self {
        Self::in_memory(RateLimitConfig::disabled())
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn quotas(&self) -> &QuotaTable {
        &self.quotas
    }

    pub fn store(&self) -> &Arc<dyn WindowStore> {
        &self.store
    }

    pub fn stats(&self) -> &DecisionStats {
        &self.stats
    }

    pub fn get_user_type(&self, user: Option<&UserDescriptor>) -> UserTier {
        identity::get_user_type(user)
    }

    /// Requests per rate window for this user and endpoint class
    pub fn get_rate_limit(&self, user: Option<&UserDescriptor>, class: EndpointClass) -> u32 {
        self.quotas.rate_limit(self.get_user_type(user), class)
    }

    /// Requests per burst window for this user
    pub fn get_burst_limit(&self, user: Option<&UserDescriptor>) -> u32 {
        self.quotas.burst_limit(self.get_user_type(user))
    }

    pub fn get_identifier(&self, request: &RequestDescriptor) -> String {
        identity::get_identifier(request, self.config.trust_forwarded_for)
    }

    /// Decide whether `request` exceeds its quota for `class`.
    ///
    /// Admitted requests are recorded in both windows; rejected requests
    /// are not recorded and cause no store writes.
    pub async fn is_rate_limited(
        &self,
        request: &RequestDescriptor,
        class: EndpointClass,
    ) -> RateLimitDecision {
        let timer = metrics::RATE_LIMIT_CHECK_DURATION_SECONDS.start_timer();

        let tier = self.get_user_type(request.user.as_ref());
        let identifier = self.get_identifier(request);
        let rate_limit = self.quotas.rate_limit(tier, class);
        let burst_limit = self.quotas.burst_limit(tier);
        let now = self.clock.now();

        let mut decision = RateLimitDecision {
            limited: false,
            info: RateLimitInfo {
                rate_limit,
                rate_remaining: rate_limit,
                rate_reset: now + self.config.rate_window_secs,
                burst_limit,
                burst_remaining: burst_limit,
                burst_reset: now + self.config.burst_window_secs,
            },
            identifier,
            tier,
            endpoint_class: class,
            retry_after: None,
            reason: None,
        };

        if !self.config.enabled {
            timer.stop_and_discard();
            return decision;
        }

        let rate_key = WindowKey::rate(&decision.identifier, class);
        let burst_key = WindowKey::burst(&decision.identifier, class);

        {
            let _guard = self.lock_for(&decision.identifier, class).lock().await;
            if let Err(e) = self
                .check_windows(&rate_key, &burst_key, now, &mut decision)
                .await
            {
                self.apply_failure_mode(e, &mut decision);
            }
        }

        self.stats.record(tier, class, decision.limited);
        metrics::record_decision(tier.as_str(), class.as_str(), decision.limited);

        debug!(
            identifier = %decision.identifier,
            tier = %tier,
            endpoint_class = %class,
            limited = decision.limited,
            rate_remaining = decision.info.rate_remaining,
            burst_remaining = decision.info.burst_remaining,
            "Rate limit check"
        );

        timer.observe_duration();
        decision
    }

    async fn check_windows(
        &self,
        rate_key: &WindowKey,
        burst_key: &WindowKey,
        now: u64,
        decision: &mut RateLimitDecision,
    ) -> Result<(), RateLimitError> {
        let rate_window = self.config.rate_window_secs;
        let burst_window = self.config.burst_window_secs;
        let rate_limit = decision.info.rate_limit;
        let burst_limit = decision.info.burst_limit;

        let mut rate_active = self.load_active(rate_key, rate_window, now).await?;
        let mut burst_active = self.load_active(burst_key, burst_window, now).await?;

        let rate_full = rate_active.len() >= rate_limit as usize;
        let burst_full = burst_active.len() >= burst_limit as usize;

        decision.reason = match (rate_full, burst_full) {
            (true, true) => Some(LimitReason::RateAndBurst),
            (true, false) => Some(LimitReason::Rate),
            (false, true) => Some(LimitReason::Burst),
            (false, false) => None,
        };

        if decision.reason.is_some() {
            decision.limited = true;
            decision.info.rate_remaining = remaining(rate_limit, rate_active.len());
            decision.info.burst_remaining = remaining(burst_limit, burst_active.len());

            let mut retry_after = 0;
            if rate_full {
                retry_after = retry_after.max(seconds_until_free(
                    &rate_active,
                    rate_limit,
                    rate_window,
                    now,
                ));
            }
            if burst_full {
                retry_after = retry_after.max(seconds_until_free(
                    &burst_active,
                    burst_limit,
                    burst_window,
                    now,
                ));
            }
            decision.retry_after = Some(retry_after);
            return Ok(());
        }

        rate_active.push(now);
        burst_active.push(now);
        decision.info.rate_remaining = remaining(rate_limit, rate_active.len());
        decision.info.burst_remaining = remaining(burst_limit, burst_active.len());

        self.store
            .set(
                &burst_key.cache_key(),
                burst_active,
                self.config.ttl_for(burst_window),
            )
            .await?;
        self.store
            .set(
                &rate_key.cache_key(),
                rate_active,
                self.config.ttl_for(rate_window),
            )
            .await?;

        Ok(())
    }

    async fn load_active(
        &self,
        key: &WindowKey,
        window: u64,
        now: u64,
    ) -> Result<Vec<u64>, RateLimitError> {
        let mut timestamps = self.store.get(&key.cache_key()).await?.unwrap_or_default();
        prune(&mut timestamps, now, window);
        Ok(timestamps)
    }

    fn apply_failure_mode(&self, err: RateLimitError, decision: &mut RateLimitDecision) {
        self.stats.record_store_error();
        metrics::RATE_LIMIT_STORE_ERRORS_TOTAL.inc();

        warn!(
            error = %err,
            identifier = %decision.identifier,
            failure_mode = ?self.config.failure_mode,
            "Rate limit store unavailable"
        );

        let info = &mut decision.info;
        match self.config.failure_mode {
            FailureMode::Open => {
                decision.limited = false;
                decision.reason = None;
                decision.retry_after = None;
                info.rate_remaining = info.rate_limit;
                info.burst_remaining = info.burst_limit;
            }
            FailureMode::Closed => {
                decision.limited = true;
                decision.reason = Some(LimitReason::StoreUnavailable);
                decision.retry_after = Some(self.config.burst_window_secs);
                info.rate_remaining = 0;
                info.burst_remaining = 0;
            }
        }
    }

    fn lock_for(&self, identifier: &str, class: EndpointClass) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        identifier.hash(&mut hasher);
        class.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.locks.len();
        &self.locks[idx]
    }
}

/// Drop timestamps at or before `now - window`
pub(crate) fn prune(timestamps: &mut Vec<u64>, now: u64, window: u64) {
    if let Some(cutoff) = now.checked_sub(window) {
        timestamps.retain(|&ts| ts > cutoff);
    }
}

fn remaining(limit: u32, active: usize) -> u32 {
    (limit as usize).saturating_sub(active) as u32
}

/// Seconds until enough entries age out for the window to admit one more
fn seconds_until_free(active: &[u64], limit: u32, window: u64, now: u64) -> u64 {
    let mut sorted = active.to_vec();
    sorted.sort_unstable();

    let must_expire = sorted.len().saturating_sub(limit as usize);
    match sorted.get(must_expire) {
        Some(&ts) => (ts + window).saturating_sub(now).max(1),
        None => window,
    }
}
