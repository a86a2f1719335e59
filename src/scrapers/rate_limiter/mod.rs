//! Adaptive per-domain rate limiter.
//!
//! Tracks request timing and in-flight requests per domain and adapts delays
//! based on responses. Backs off fast on 429/5xx, recovers slowly on success.

mod config;
mod domain_state;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, RwLock};
use tracing::{debug, info, warn};

pub use config::{DomainStats, RateLimitConfig};
use domain_state::DomainState;

use crate::utils::url::host_key;

/// Adaptive rate limiter that tracks per-domain request timing.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    pub(crate) config: RateLimitConfig,
    pub(crate) domains: Arc<RwLock<HashMap<String, DomainState>>>,
}

/// A held request slot for one domain. Dropping it frees the slot.
#[derive(Debug)]
pub struct DomainSlot {
    domain: String,
    _permit: OwnedSemaphorePermit,
}

impl DomainSlot {
    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl RateLimiter {
    /// Create a new rate limiter with default config.
    pub fn new() -> Self {
        Self::with_config(RateLimitConfig::default())
    }

    /// Create a new rate limiter with custom config.
    pub fn with_config(config: RateLimitConfig) -> Self {
        Self {
            config,
            domains: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Extract the limiter key (host plus explicit port) from a URL.
    pub fn extract_domain(url: &str) -> Option<String> {
        host_key(url)
    }

    /// Wait for a free slot on the URL's domain and for its delay to elapse,
    /// then mark a request as started.
    ///
    /// Returns `None` for URLs without a host.
    pub async fn acquire(&self, url: &str) -> Option<DomainSlot> {
        let domain = Self::extract_domain(url)?;

        let slots = {
            let mut domains = self.domains.write().await;
            domains
                .entry(domain.clone())
                .or_insert_with(|| DomainState::new(&self.config))
                .slots
                .clone()
        };
        let permit = slots.acquire_owned().await.ok()?;

        loop {
            let wait_time = {
                let mut domains = self.domains.write().await;
                let state = domains
                    .entry(domain.clone())
                    .or_insert_with(|| DomainState::new(&self.config));
                let wait = state.time_until_ready();
                if wait.is_zero() {
                    state.last_request = Some(Instant::now());
                    state.total_requests += 1;
                }
                wait
            };

            if wait_time.is_zero() {
                break;
            }
            debug!("Rate limiting {}: waiting {:?}", domain, wait_time);
            tokio::time::sleep(wait_time).await;
        }

        Some(DomainSlot {
            domain,
            _permit: permit,
        })
    }

    /// Feed a response back into the domain's delay.
    pub async fn report_response(&self, domain: &str, status_code: u16, elapsed: Duration) {
        match status_code {
            429 => self.report_rate_limit(domain, status_code).await,
            500..=599 => self.report_server_error(domain).await,
            400..=499 => self.report_client_error(domain).await,
            _ => self.report_success(domain).await,
        }
        if elapsed > self.config.slow_response_threshold {
            self.report_slow_response(domain, elapsed).await;
        }
    }

    /// Report a successful request - decreases delay down to the floor.
    pub async fn report_success(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            let was_backing_off = state.in_backoff;
            if state.relax(&self.config) {
                info!("Domain {} recovered from rate limit backoff", domain);
            } else if was_backing_off {
                debug!(
                    "Domain {} delay reduced to {:?}",
                    domain, state.current_delay
                );
            }
        }
    }

    /// Report a rate limit hit (429) - escalating increase up to the cap.
    pub async fn report_rate_limit(&self, domain: &str, status_code: u16) {
        let mut domains = self.domains.write().await;
        let state = domains
            .entry(domain.to_string())
            .or_insert_with(|| DomainState::new(&self.config));
        let factor = state.penalise_rate_limit(&self.config);

        warn!(
            "Rate limited by {} (HTTP {}, x{:.1}), backing off to {:?}",
            domain, status_code, factor, state.current_delay
        );
    }

    /// Report a client error (4xx other than 429) - no delay change.
    pub async fn report_client_error(&self, domain: &str) {
        let domains = self.domains.read().await;
        if let Some(state) = domains.get(domain) {
            debug!(
                "Client error for {}, delay unchanged at {:?}",
                domain, state.current_delay
            );
        }
    }

    /// Report a server error (5xx) - moderate backoff.
    pub async fn report_server_error(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            state.consecutive_rate_limits = 0;
            state.in_backoff = true;
            state.inflate(self.config.server_error_multiplier, &self.config);
            debug!(
                "Server error for {}, delay increased to {:?}",
                domain, state.current_delay
            );
        }
    }

    /// Report a slow response - small nudge up.
    pub async fn report_slow_response(&self, domain: &str, elapsed: Duration) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            state.in_backoff = true;
            state.inflate(self.config.slow_response_multiplier, &self.config);
            debug!(
                "Slow response from {} ({:?}), delay increased to {:?}",
                domain, elapsed, state.current_delay
            );
        }
    }

    /// Raise a domain's minimum delay, e.g. from a robots.txt Crawl-delay.
    pub async fn set_floor_delay(&self, domain: &str, floor: Duration) {
        let capped = floor.min(self.config.max_delay);
        let mut domains = self.domains.write().await;
        let state = domains
            .entry(domain.to_string())
            .or_insert_with(|| DomainState::new(&self.config));
        if capped > state.floor_delay {
            debug!("Domain {} delay floor raised to {:?}", domain, capped);
        }
        state.raise_floor(capped);
    }

    /// Current delay for a domain, if it has been seen.
    pub async fn current_delay(&self, domain: &str) -> Option<Duration> {
        let domains = self.domains.read().await;
        domains.get(domain).map(|s| s.current_delay)
    }

    /// Get time until domain is ready.
    pub async fn time_until_ready(&self, url: &str) -> Duration {
        let domain = match Self::extract_domain(url) {
            Some(d) => d,
            None => return Duration::ZERO,
        };

        let domains = self.domains.read().await;
        domains
            .get(&domain)
            .map(|s| s.time_until_ready())
            .unwrap_or(Duration::ZERO)
    }

    /// Get statistics for all domains.
    pub async fn get_stats(&self) -> HashMap<String, DomainStats> {
        let domains = self.domains.read().await;
        domains
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    DomainStats {
                        current_delay: v.current_delay,
                        floor_delay: v.floor_delay,
                        in_backoff: v.in_backoff,
                        total_requests: v.total_requests,
                        rate_limit_hits: v.rate_limit_hits,
                        in_flight: v.in_flight(),
                    },
                )
            })
            .collect()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RateLimitConfig {
        RateLimitConfig {
            default_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_extract_domain() {
        assert_eq!(
            RateLimiter::extract_domain("https://example.com/path"),
            Some("example.com".to_string())
        );
        assert_eq!(
            RateLimiter::extract_domain("http://127.0.0.1:8080/x"),
            Some("127.0.0.1:8080".to_string())
        );
        assert_eq!(RateLimiter::extract_domain("not a url"), None);
    }

    #[tokio::test]
    async fn test_consecutive_rate_limits_increase_to_cap() {
        let limiter = RateLimiter::with_config(test_config());
        let slot = limiter.acquire("https://example.com/1").await.unwrap();
        drop(slot);

        let mut previous = limiter.current_delay("example.com").await.unwrap();
        let mut reached_cap = false;
        for _ in 0..20 {
            limiter.report_rate_limit("example.com", 429).await;
            let delay = limiter.current_delay("example.com").await.unwrap();
            if previous < Duration::from_secs(5) {
                assert!(delay > previous, "{delay:?} should exceed {previous:?}");
            } else {
                assert_eq!(delay, Duration::from_secs(5));
            }
            assert!(delay <= Duration::from_secs(5));
            reached_cap |= delay == Duration::from_secs(5);
            previous = delay;
        }
        assert!(reached_cap);

        limiter.report_success("example.com").await;
        let after = limiter.current_delay("example.com").await.unwrap();
        assert!(after < previous);
        assert!(after >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_success_never_drops_below_default() {
        let limiter = RateLimiter::with_config(test_config());
        drop(limiter.acquire("https://example.com/").await);
        limiter.report_rate_limit("example.com", 429).await;
        for _ in 0..50 {
            limiter.report_success("example.com").await;
        }
        let stats = limiter.get_stats().await;
        let domain = stats.get("example.com").unwrap();
        assert_eq!(domain.current_delay, Duration::from_millis(100));
        assert!(!domain.in_backoff);
        assert_eq!(domain.rate_limit_hits, 1);
    }

    #[tokio::test]
    async fn test_server_error_and_slow_response_inflate() {
        let limiter = RateLimiter::with_config(test_config());
        drop(limiter.acquire("https://example.com/").await);

        limiter.report_server_error("example.com").await;
        let after_error = limiter.current_delay("example.com").await.unwrap();
        assert!((149..=150).contains(&after_error.as_millis()));

        limiter
            .report_response("example.com", 200, Duration::from_secs(6))
            .await;
        // Success decays to ~135ms, then the slow response nudges x1.2.
        let after_slow = limiter.current_delay("example.com").await.unwrap();
        assert!(
            (161..=162).contains(&after_slow.as_millis()),
            "got {after_slow:?}"
        );
    }

    #[tokio::test]
    async fn test_per_domain_concurrency_cap() {
        let limiter = RateLimiter::with_config(RateLimitConfig {
            default_delay: Duration::ZERO,
            max_concurrent_per_domain: 1,
            ..Default::default()
        });

        let first = limiter.acquire("https://example.com/a").await.unwrap();
        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            limiter.acquire("https://example.com/b"),
        )
        .await;
        assert!(blocked.is_err());

        // Another domain is unaffected.
        let other = limiter.acquire("https://other.org/").await;
        assert!(other.is_some());

        drop(first);
        let second = tokio::time::timeout(
            Duration::from_millis(200),
            limiter.acquire("https://example.com/b"),
        )
        .await;
        assert!(matches!(second, Ok(Some(_))));
    }

    #[tokio::test]
    async fn test_delay_gate_spaces_requests() {
        let limiter = RateLimiter::with_config(RateLimitConfig {
            default_delay: Duration::from_millis(80),
            ..Default::default()
        });
        let start = Instant::now();
        drop(limiter.acquire("https://example.com/1").await);
        drop(limiter.acquire("https://example.com/2").await);
        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_crawl_delay_floor() {
        let limiter = RateLimiter::with_config(test_config());
        limiter
            .set_floor_delay("example.com", Duration::from_secs(2))
            .await;
        limiter.report_success("example.com").await;
        assert_eq!(
            limiter.current_delay("example.com").await,
            Some(Duration::from_secs(2))
        );
    }
}
