//! Configuration for the tool-call gateway

pub mod backends;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

// Re-export backend config
pub use backends::{BackendConfig, Service};

/// Admission quota for one tool category
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitRule {
    /// Maximum calls admitted inside the trailing window
    pub max: usize,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl RateLimitRule {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Rate-limit table: one independent quota per tool category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Per-category overrides
    pub categories: HashMap<String, RateLimitRule>,
    /// Fallback rule for categories without an override
    pub default_rule: RateLimitRule,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let mut categories = HashMap::new();
        categories.insert(
            "real-trading".to_string(),
            RateLimitRule {
                max: 30,
                window_ms: 60_000,
            },
        );
        categories.insert(
            "market-data".to_string(),
            RateLimitRule {
                max: 120,
                window_ms: 60_000,
            },
        );
        categories.insert(
            "account".to_string(),
            RateLimitRule {
                max: 60,
                window_ms: 60_000,
            },
        );
        categories.insert(
            "ai-inference".to_string(),
            RateLimitRule {
                max: 20,
                window_ms: 60_000,
            },
        );

        Self {
            categories,
            // Conservative quota for anything not listed above
            default_rule: RateLimitRule {
                max: 10,
                window_ms: 60_000,
            },
        }
    }
}

impl LimitsConfig {
    /// Rule for a category, falling back to the default
    pub fn rule_for(&self, category: &str) -> RateLimitRule {
        self.categories
            .get(category)
            .copied()
            .unwrap_or(self.default_rule)
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Per-category rate limits
    pub limits: LimitsConfig,
    /// Default outbound request timeout (milliseconds)
    pub request_timeout_ms: u64,
    /// How long an issued confirmation token stays valid (seconds)
    pub confirmation_ttl_secs: u64,
    /// Refresh the service credential this long before it expires (seconds)
    pub refresh_margin_secs: u64,
    /// Interval for the background sweep of used tokens and idle buckets (seconds)
    pub sweep_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: LimitsConfig::default(),
            request_timeout_ms: 15_000, // generous for slow inference calls
            confirmation_ttl_secs: 300, // 5 minutes to confirm
            refresh_margin_secs: 60,
            sweep_interval_secs: 600,
        }
    }
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn confirmation_ttl(&self) -> Duration {
        Duration::from_secs(self.confirmation_ttl_secs)
    }

    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_cover_trading_category() {
        let limits = LimitsConfig::default();
        let rule = limits.rule_for("real-trading");
        assert_eq!(rule.max, 30);
        assert_eq!(rule.window_ms, 60_000);
    }

    #[test]
    fn unconfigured_category_uses_default_rule() {
        let limits = LimitsConfig::default();
        let rule = limits.rule_for("somewhere-new");
        assert_eq!(rule.max, limits.default_rule.max);
        assert_eq!(rule.window_ms, limits.default_rule.window_ms);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.request_timeout_ms, config.request_timeout_ms);
        assert_eq!(parsed.confirmation_ttl_secs, config.confirmation_ttl_secs);
    }
}
