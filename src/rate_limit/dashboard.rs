//! Admin Dashboard Support
//!
//! In-process decision counters and the JSON snapshot built from them.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::config::{FailureMode, QuotaRow};
use super::limiter::RateLimiter;
use super::tier::{EndpointClass, UserTier};

#[derive(Debug, Default)]
struct Counters {
    admitted: AtomicU64,
    rejected: AtomicU64,
}

/// Admit/reject counters per tier and endpoint class
#[derive(Debug, Clone, Default)]
pub struct DecisionStats {
    cells: Arc<[[Counters; 4]; 4]>,
    store_errors: Arc<AtomicU64>,
}

impl DecisionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, tier: UserTier, class: EndpointClass, limited: bool) {
        let cell = &self.cells[tier.index()][class.index()];
        if limited {
            cell.rejected.fetch_add(1, Ordering::Relaxed);
        } else {
            cell.admitted.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn admitted(&self, tier: UserTier, class: EndpointClass) -> u64 {
        self.cells[tier.index()][class.index()]
            .admitted
            .load(Ordering::Relaxed)
    }

    pub fn rejected(&self, tier: UserTier, class: EndpointClass) -> u64 {
        self.cells[tier.index()][class.index()]
            .rejected
            .load(Ordering::Relaxed)
    }

    pub fn store_errors(&self) -> u64 {
        self.store_errors.load(Ordering::Relaxed)
    }
}

/// Dashboard data for admin interface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardData {
    /// Timestamp of data generation
    pub timestamp: chrono::DateTime<chrono::Utc>,

    pub enabled: bool,

    pub failure_mode: FailureMode,

    pub summary: DecisionSummary,

    pub by_tier: Vec<TierStats>,

    /// Resolved quota table
    pub quotas: Vec<QuotaRow>,

    /// Live timestamp lists in the store, if the backend reports it
    pub tracked_windows: Option<usize>,
}

/// Totals across all tiers and endpoint classes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionSummary {
    pub total_checks: u64,
    pub admitted: u64,
    pub rejected: u64,
    pub store_errors: u64,
    pub rejection_rate_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierStats {
    pub tier: UserTier,
    pub admitted: u64,
    pub rejected: u64,
    pub endpoints: Vec<EndpointStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointStats {
    pub endpoint_class: EndpointClass,
    pub admitted: u64,
    pub rejected: u64,
}

/// Dashboard builder for constructing dashboard data
pub struct DashboardBuilder {
    limiter: RateLimiter,
}

impl DashboardBuilder {
    pub fn new(limiter: RateLimiter) -> Self {
        Self { limiter }
    }

    pub async fn build(&self) -> DashboardData {
        let stats = self.limiter.stats();

        let by_tier: Vec<TierStats> = UserTier::ALL
            .iter()
            .map(|&tier| {
                let endpoints: Vec<EndpointStats> = EndpointClass::ALL
                    .iter()
                    .map(|&class| EndpointStats {
                        endpoint_class: class,
                        admitted: stats.admitted(tier, class),
                        rejected: stats.rejected(tier, class),
                    })
                    .collect();
                TierStats {
                    tier,
                    admitted: endpoints.iter().map(|e| e.admitted).sum(),
                    rejected: endpoints.iter().map(|e| e.rejected).sum(),
                    endpoints,
                }
            })
            .collect();

        let summary = Self::build_summary(&by_tier, stats.store_errors());

        DashboardData {
            timestamp: chrono::Utc::now(),
            enabled: self.limiter.config().enabled,
            failure_mode: self.limiter.config().failure_mode,
            summary,
            by_tier,
            quotas: self.limiter.quotas().rows(),
            tracked_windows: self.limiter.store().len().await,
        }
    }

    fn build_summary(by_tier: &[TierStats], store_errors: u64) -> DecisionSummary {
        let admitted: u64 = by_tier.iter().map(|t| t.admitted).sum();
        let rejected: u64 = by_tier.iter().map(|t| t.rejected).sum();
        let total_checks = admitted + rejected;

        let rejection_rate_percent = if total_checks > 0 {
            (rejected as f64 / total_checks as f64) * 100.0
        } else {
            0.0
        };

        DecisionSummary {
            total_checks,
            admitted,
            rejected,
            store_errors,
            rejection_rate_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::clock::ManualClock;
    use crate::rate_limit::config::{QuotaConfig, RateLimitConfig, TierQuota};
    use crate::rate_limit::identity::RequestDescriptor;
    use crate::rate_limit::store::MemoryWindowStore;

    #[test]
    fn test_decision_stats_counts() {
        let stats = DecisionStats::new();
        stats.record(UserTier::Anonymous, EndpointClass::Api, false);
        stats.record(UserTier::Anonymous, EndpointClass::Api, true);
        stats.record(UserTier::Staff, EndpointClass::View, false);
        stats.record_store_error();

        assert_eq!(stats.admitted(UserTier::Anonymous, EndpointClass::Api), 1);
        assert_eq!(stats.rejected(UserTier::Anonymous, EndpointClass::Api), 1);
        assert_eq!(stats.admitted(UserTier::Staff, EndpointClass::View), 1);
        assert_eq!(stats.admitted(UserTier::Premium, EndpointClass::Api), 0);
        assert_eq!(stats.store_errors(), 1);
    }

    #[test]
    fn test_summary_empty() {
        let summary = DashboardBuilder::build_summary(&[], 0);
        assert_eq!(summary, DecisionSummary::default());
    }

    #[tokio::test]
    async fn test_dashboard_build() {
        let quotas = QuotaConfig {
            anonymous: TierQuota::new(2, 2, 2, 2, 2),
            ..QuotaConfig::default()
        };
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let store = Arc::new(MemoryWindowStore::with_clock(clock.clone()));
        let limiter =
            RateLimiter::with_clock(RateLimitConfig::with_quotas(quotas), store, clock);

        let request = RequestDescriptor::anonymous("10.1.1.1");
        for _ in 0..4 {
            limiter.is_rate_limited(&request, EndpointClass::Api).await;
        }

        let data = DashboardBuilder::new(limiter).build().await;
        assert_eq!(data.summary.total_checks, 4);
        assert_eq!(data.summary.admitted, 2);
        assert_eq!(data.summary.rejected, 2);
        assert!((data.summary.rejection_rate_percent - 50.0).abs() < f64::EPSILON);
        assert_eq!(data.by_tier[0].tier, UserTier::Anonymous);
        assert_eq!(data.by_tier[0].rejected, 2);
        assert_eq!(data.quotas.len(), 4);
        assert_eq!(data.tracked_windows, Some(2));

        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["failure_mode"], "open");
        assert_eq!(json["by_tier"][0]["tier"], "anonymous");
    }
}
