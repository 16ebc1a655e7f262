//! Per-category rate limiting
//!
//! Sliding-window admission control protecting backend capacity. Each tool
//! category owns an independent quota; market-data calls never consume the
//! trading budget. Buckets are created lazily and discarded by the
//! periodic sweep once empty.

use crate::config::LimitsConfig;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied { retry_after_secs: u64 },
}

/// Sliding-window limiter with one bucket per category
pub struct RateLimiter {
    limits: LimitsConfig,
    /// Call instants inside the trailing window, oldest first
    buckets: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(limits: LimitsConfig) -> Self {
        Self {
            limits,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or deny one call for `category`
    ///
    /// The prune-and-push sequence runs under a single lock so concurrent
    /// callers cannot both observe the same free slot.
    pub fn admit(&self, category: &str) -> Admission {
        let rule = self.limits.rule_for(category);
        let window = rule.window();
        let now = Instant::now();

        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let bucket = buckets.entry(category.to_string()).or_default();

        // Timestamps at or past the window boundary no longer count
        while bucket
            .front()
            .is_some_and(|t| now.duration_since(*t) >= window)
        {
            bucket.pop_front();
        }

        if bucket.len() >= rule.max {
            let retry_after_secs = match bucket.front() {
                Some(oldest) => {
                    let remaining = window.saturating_sub(now.duration_since(*oldest));
                    (remaining.as_millis().div_ceil(1000).max(1)) as u64
                }
                // max == 0: nothing ever admitted for this category
                None => window.as_secs().max(1),
            };

            tracing::debug!(
                category = category,
                in_window = bucket.len(),
                max = rule.max,
                retry_after_secs = retry_after_secs,
                "Rate limit exceeded"
            );
            return Admission::Denied { retry_after_secs };
        }

        bucket.push_back(now);
        Admission::Allowed
    }

    /// Prune all buckets and drop the ones that emptied out
    ///
    /// Called from the gateway's background sweep to bound memory for
    /// categories that went idle.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let before = buckets.len();
        buckets.retain(|category, bucket| {
            let window = self.limits.rule_for(category).window();
            while bucket
                .front()
                .is_some_and(|t| now.duration_since(*t) >= window)
            {
                bucket.pop_front();
            }
            !bucket.is_empty()
        });

        let dropped = before - buckets.len();
        if dropped > 0 {
            tracing::debug!(dropped = dropped, "Discarded idle rate buckets");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitRule;
    use std::collections::HashMap;
    use std::time::Duration;

    fn limits(max: usize, window_ms: u64) -> LimitsConfig {
        let mut categories = HashMap::new();
        categories.insert("test".to_string(), RateLimitRule { max, window_ms });
        LimitsConfig {
            categories,
            default_rule: RateLimitRule {
                max: 2,
                window_ms: 60_000,
            },
        }
    }

    #[test]
    fn admits_up_to_max_then_denies() {
        let limiter = RateLimiter::new(limits(3, 60_000));

        for _ in 0..3 {
            assert_eq!(limiter.admit("test"), Admission::Allowed);
        }

        match limiter.admit("test") {
            Admission::Denied { retry_after_secs } => {
                assert!(retry_after_secs > 0);
                assert!(retry_after_secs <= 60);
            }
            Admission::Allowed => panic!("fourth call must be denied"),
        }
    }

    #[test]
    fn window_elapse_readmits() {
        let limiter = RateLimiter::new(limits(1, 50));

        assert_eq!(limiter.admit("test"), Admission::Allowed);
        assert!(matches!(limiter.admit("test"), Admission::Denied { .. }));

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(limiter.admit("test"), Admission::Allowed);
    }

    #[test]
    fn categories_are_independent() {
        let limiter = RateLimiter::new(limits(1, 60_000));

        assert_eq!(limiter.admit("test"), Admission::Allowed);
        assert!(matches!(limiter.admit("test"), Admission::Denied { .. }));

        // Different category draws from the default rule, unaffected
        assert_eq!(limiter.admit("other"), Admission::Allowed);
        assert_eq!(limiter.admit("other"), Admission::Allowed);
    }

    #[test]
    fn unconfigured_category_uses_default_rule() {
        let limiter = RateLimiter::new(limits(100, 60_000));

        // default_rule.max is 2 in the fixture
        assert_eq!(limiter.admit("unlisted"), Admission::Allowed);
        assert_eq!(limiter.admit("unlisted"), Admission::Allowed);
        assert!(matches!(limiter.admit("unlisted"), Admission::Denied { .. }));
    }

    #[test]
    fn sweep_discards_empty_buckets() {
        let limiter = RateLimiter::new(limits(5, 30));

        limiter.admit("test");
        limiter.admit("other");
        assert_eq!(limiter.buckets.lock().unwrap().len(), 2);

        std::thread::sleep(Duration::from_millis(40));
        limiter.sweep();
        assert_eq!(limiter.buckets.lock().unwrap().len(), 0);
    }

    #[test]
    fn trading_scenario_thirty_per_minute() {
        let limiter = RateLimiter::new(limits(30, 60_000));

        for _ in 0..30 {
            assert_eq!(limiter.admit("test"), Admission::Allowed);
        }
        match limiter.admit("test") {
            Admission::Denied { retry_after_secs } => {
                assert!(retry_after_secs >= 1 && retry_after_secs <= 60);
            }
            Admission::Allowed => panic!("31st call inside the window must be denied"),
        }
    }
}
