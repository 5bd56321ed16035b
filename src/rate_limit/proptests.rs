//! Property-Based Tests for the Rate Limiter
//!
//! # Test Strategies
//!
//! - **Quota ordering**: limits never decrease from anonymous to staff
//! - **Classification**: tier resolution is a pure function of the user
//! - **Pruning**: calls spaced beyond the window never accumulate
//! - **Admission boundary**: exactly `limit` calls are admitted per window
//!
//! # Running the Tests
//!
//! ```bash
//! cargo test --lib rate_limit::proptests
//! ```

use proptest::prelude::*;
use std::sync::Arc;

use super::clock::ManualClock;
use super::config::{QuotaConfig, QuotaTable, RateLimitConfig, TierQuota};
use super::identity::{get_user_type, RequestDescriptor, UserDescriptor};
use super::limiter::{prune, RateLimiter};
use super::store::MemoryWindowStore;
use super::tier::{EndpointClass, UserTier};

const START: u64 = 1_700_000_000;

fn arb_user() -> impl Strategy<Value = Option<UserDescriptor>> {
    prop::option::of(
        ("[0-9]{1,6}", any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
            |(id, is_authenticated, is_staff, is_superuser, is_premium)| UserDescriptor {
                id,
                is_authenticated,
                is_staff,
                is_superuser,
                is_premium,
            },
        ),
    )
}

fn arb_class() -> impl Strategy<Value = EndpointClass> {
    prop::sample::select(EndpointClass::ALL.to_vec())
}

fn limiter(config: RateLimitConfig) -> (RateLimiter, ManualClock) {
    let clock = ManualClock::new(START);
    let store = Arc::new(MemoryWindowStore::with_clock(Arc::new(clock.clone())));
    (
        RateLimiter::with_clock(config, store, Arc::new(clock.clone())),
        clock,
    )
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn prop_limits_monotonic_across_tiers(lower in 0usize..3, step in 1usize..4, class in arb_class()) {
        let higher = (lower + step).min(3);
        let table = QuotaTable::default();
        let (t1, t2) = (UserTier::ALL[lower], UserTier::ALL[higher]);

        prop_assert!(table.rate_limit(t2, class) >= table.rate_limit(t1, class));
        prop_assert!(table.burst_limit(t2) >= table.burst_limit(t1));
    }

    #[test]
    fn prop_classification_is_stable(user in arb_user()) {
        let first = get_user_type(user.as_ref());
        let second = get_user_type(user.as_ref());
        prop_assert_eq!(first, second);

        if let Some(u) = &user {
            if u.is_authenticated && (u.is_staff || u.is_superuser) {
                prop_assert_eq!(first, UserTier::Staff);
            }
        } else {
            prop_assert_eq!(first, UserTier::Anonymous);
        }
    }

    #[test]
    fn prop_prune_keeps_only_window(
        mut offsets in prop::collection::vec(0u64..7200, 0..50),
        window in 1u64..3600,
    ) {
        offsets.sort_unstable();
        let now = START + 7200;
        let mut timestamps: Vec<u64> = offsets.iter().map(|o| START + o).collect();
        let before = timestamps.clone();

        prune(&mut timestamps, now, window);

        prop_assert!(timestamps.iter().all(|&ts| ts > now - window));
        let expected = before.iter().filter(|&&ts| ts > now - window).count();
        prop_assert_eq!(timestamps.len(), expected);
        prop_assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn prop_spaced_calls_never_accumulate(calls in 1usize..20, gap in 3601u64..10_000) {
        let (limiter, clock) = limiter(RateLimitConfig::default());
        let request = RequestDescriptor::anonymous("192.0.2.1");

        runtime().block_on(async {
            for _ in 0..calls {
                let decision = limiter.is_rate_limited(&request, EndpointClass::Api).await;
                prop_assert!(!decision.limited);
                // Active count after admission is exactly one
                prop_assert_eq!(decision.info.rate_remaining, decision.info.rate_limit - 1);
                clock.advance(gap);
            }
            Ok(())
        })?;
    }

    #[test]
    fn prop_admission_boundary(limit in 1u32..30, class in arb_class()) {
        let quotas = QuotaConfig {
            anonymous: TierQuota::new(limit, limit, limit, limit, limit),
            ..QuotaConfig::default()
        };
        let (limiter, _) = limiter(RateLimitConfig::with_quotas(quotas));
        let request = RequestDescriptor::anonymous("192.0.2.2");

        runtime().block_on(async {
            for _ in 0..limit {
                prop_assert!(!limiter.is_rate_limited(&request, class).await.limited);
            }
            let over = limiter.is_rate_limited(&request, class).await;
            prop_assert!(over.limited);
            prop_assert_eq!(over.info.rate_remaining, 0);
            prop_assert_eq!(over.info.burst_remaining, 0);
            Ok(())
        })?;
    }
}
