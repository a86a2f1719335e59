//! Per-domain rate limiting state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;

use super::config::RateLimitConfig;

/// State for a single domain.
#[derive(Debug, Clone)]
pub struct DomainState {
    /// Current delay for this domain.
    pub current_delay: Duration,
    /// Delay the domain recovers to on success.
    pub floor_delay: Duration,
    /// Last request time.
    pub last_request: Option<Instant>,
    /// Consecutive 429 responses since the last success.
    pub consecutive_rate_limits: u32,
    /// Whether currently in backoff.
    pub in_backoff: bool,
    /// Total requests made.
    pub total_requests: u64,
    /// Total rate limit hits.
    pub rate_limit_hits: u64,
    /// In-flight cap. Fair, so waiters are served in arrival order.
    pub slots: Arc<Semaphore>,
    pub max_slots: usize,
}

impl DomainState {
    pub fn new(config: &RateLimitConfig) -> Self {
        let max_slots = config.max_concurrent_per_domain.max(1);
        Self {
            current_delay: config.default_delay,
            floor_delay: config.default_delay,
            last_request: None,
            consecutive_rate_limits: 0,
            in_backoff: false,
            total_requests: 0,
            rate_limit_hits: 0,
            slots: Arc::new(Semaphore::new(max_slots)),
            max_slots,
        }
    }

    /// Time until this domain is ready for another request.
    pub fn time_until_ready(&self) -> Duration {
        match self.last_request {
            Some(last) => self.current_delay.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.max_slots
            .saturating_sub(self.slots.available_permits())
    }

    /// Raise the recovery floor, e.g. from a robots.txt Crawl-delay.
    pub fn raise_floor(&mut self, floor: Duration) {
        if floor > self.floor_delay {
            self.floor_delay = floor;
        }
        if self.current_delay < self.floor_delay {
            self.current_delay = self.floor_delay;
        }
    }

    /// Relax the delay after a success. Returns true when the floor is reached
    /// from backoff.
    pub fn relax(&mut self, config: &RateLimitConfig) -> bool {
        self.consecutive_rate_limits = 0;
        let decayed = self.current_delay.mul_f64(config.success_decay);
        // Geometric decay never reaches a zero floor on its own.
        let decayed = if self.floor_delay.is_zero() && decayed < config.min_backoff_delay {
            Duration::ZERO
        } else {
            decayed
        };
        self.current_delay = decayed.max(self.floor_delay);

        if self.in_backoff && self.current_delay <= self.floor_delay {
            self.in_backoff = false;
            return true;
        }
        false
    }

    /// Multiply the delay, starting from `min_backoff_delay` when it is zero.
    pub fn inflate(&mut self, factor: f64, config: &RateLimitConfig) {
        let base = if self.current_delay.is_zero() {
            config.min_backoff_delay
        } else {
            self.current_delay
        };
        self.current_delay = base.mul_f64(factor).min(config.max_delay).max(self.floor_delay);
    }

    /// Apply a 429. Returns the multiplier used.
    pub fn penalise_rate_limit(&mut self, config: &RateLimitConfig) -> f64 {
        self.consecutive_rate_limits += 1;
        self.rate_limit_hits += 1;
        self.in_backoff = true;
        let factor = config.rate_limit_factor(self.consecutive_rate_limits);
        self.inflate(factor, config);
        factor
    }
}
