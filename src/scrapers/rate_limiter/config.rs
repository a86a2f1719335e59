//! Rate limiter tuning.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Adaptive backoff constants.
///
/// The defaults are empirical; every value can be overridden per crawl.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Starting delay between requests to one domain, and the floor it recovers to.
    #[serde(with = "duration_ms")]
    pub default_delay: Duration,
    /// Upper bound for any inflated delay.
    #[serde(with = "duration_ms")]
    pub max_delay: Duration,
    /// Multiplier applied on every success.
    pub success_decay: f64,
    /// Multiplier for the first 429 in a row.
    pub rate_limit_multiplier: f64,
    /// Added to the 429 multiplier for each further consecutive 429.
    pub rate_limit_penalty: f64,
    /// Ceiling for the escalating 429 multiplier.
    pub rate_limit_multiplier_cap: f64,
    pub server_error_multiplier: f64,
    pub slow_response_multiplier: f64,
    /// Responses slower than this nudge the delay up.
    #[serde(with = "duration_ms")]
    pub slow_response_threshold: Duration,
    /// Base used when inflating from a zero delay.
    #[serde(with = "duration_ms")]
    pub min_backoff_delay: Duration,
    /// Requests allowed in flight per domain at once.
    pub max_concurrent_per_domain: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(60),
            success_decay: 0.9,
            rate_limit_multiplier: 1.5,
            rate_limit_penalty: 0.5,
            rate_limit_multiplier_cap: 3.0,
            server_error_multiplier: 1.5,
            slow_response_multiplier: 1.2,
            slow_response_threshold: Duration::from_secs(5),
            min_backoff_delay: Duration::from_millis(250),
            max_concurrent_per_domain: 2,
        }
    }
}

impl RateLimitConfig {
    /// Multiplier for the `n`th consecutive 429 (1-based).
    pub fn rate_limit_factor(&self, consecutive: u32) -> f64 {
        let escalation = self.rate_limit_penalty * consecutive.saturating_sub(1) as f64;
        (self.rate_limit_multiplier + escalation).min(self.rate_limit_multiplier_cap)
    }
}

/// Snapshot of one domain's limiter state.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainStats {
    pub current_delay: Duration,
    /// Lowest delay the domain recovers to (default or robots Crawl-delay).
    pub floor_delay: Duration,
    pub in_backoff: bool,
    pub total_requests: u64,
    pub rate_limit_hits: u64,
    pub in_flight: usize,
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_factor_escalates_to_cap() {
        let config = RateLimitConfig::default();
        assert_eq!(config.rate_limit_factor(1), 1.5);
        assert_eq!(config.rate_limit_factor(2), 2.0);
        assert_eq!(config.rate_limit_factor(3), 2.5);
        assert_eq!(config.rate_limit_factor(4), 3.0);
        assert_eq!(config.rate_limit_factor(10), 3.0);
    }

    #[test]
    fn test_deserialize_millis_with_defaults() {
        let config: RateLimitConfig =
            serde_json::from_str(r#"{"default_delay": 200, "max_delay": 5000}"#).unwrap();
        assert_eq!(config.default_delay, Duration::from_millis(200));
        assert_eq!(config.max_delay, Duration::from_secs(5));
        assert_eq!(config.success_decay, 0.9);
    }
}
