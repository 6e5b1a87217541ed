//! Domain rate limiter module
//!
//! Per-domain admission control for outbound requests:
//! - Minimum wall-clock spacing between recorded requests to one domain
//! - Per-domain interval overrides over a global default
//! - Cumulative wait statistics per domain
//!
//! State is in-memory only and keyed by domain; the outer map lock is held
//! just long enough to clone a per-domain handle, so unrelated domains never
//! serialize each other.

use crate::{ConfigError, ConfigResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub use crate::url::domain_or_unknown;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Whether admission control is active at all
    pub enabled: bool,

    /// Minimum spacing between requests to a domain without an override
    pub default_interval: Duration,

    /// Per-domain interval overrides
    pub overrides: HashMap<String, Duration>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_interval: Duration::from_millis(1000),
            overrides: HashMap::new(),
        }
    }
}

/// Tracks the admission-control state of one domain
#[derive(Debug, Clone)]
pub struct DomainState {
    /// Timestamp of the last recorded request to this domain
    pub last_request_time: Option<Instant>,

    /// Number of recorded requests
    pub request_count: u64,

    /// Total time callers have spent waiting on this domain
    pub cumulative_wait: Duration,

    /// Number of non-zero waits (for the average)
    wait_count: u64,

    /// Effective minimum spacing for this domain
    pub interval: Duration,
}

impl DomainState {
    fn new(interval: Duration) -> Self {
        Self {
            last_request_time: None,
            request_count: 0,
            cumulative_wait: Duration::ZERO,
            wait_count: 0,
            interval,
        }
    }
}

/// Per-domain statistics snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainStats {
    pub domain: String,
    pub request_count: u64,
    pub cumulative_wait: Duration,
    pub average_wait: Duration,
}

/// Per-domain admission control
///
/// Guarantees a minimum wall-clock gap between recorded requests for a
/// domain. It does NOT guarantee FIFO fairness among callers racing for the
/// same domain's next slot; whichever caller's wait expires first proceeds.
#[derive(Debug)]
pub struct DomainRateLimiter {
    config: Mutex<RateLimiterConfig>,
    domains: Mutex<HashMap<String, Arc<Mutex<DomainState>>>>,
}

impl DomainRateLimiter {
    /// Creates a rate limiter with the given configuration
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config: Mutex::new(config),
            domains: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the wait required before the next request to `domain`
    ///
    /// Zero if the limiter is disabled, the domain has never been recorded,
    /// or enough time has already elapsed. Never negative, and monotonically
    /// non-increasing as real time advances with no new `record_request`
    /// calls.
    pub fn wait_time(&self, domain: &str) -> Duration {
        self.wait_time_at(domain, Instant::now())
    }

    /// Like `wait_time`, with an explicit notion of "now" for tests
    pub fn wait_time_at(&self, domain: &str, now: Instant) -> Duration {
        if !self.config.lock().unwrap().enabled {
            return Duration::ZERO;
        }

        let slot = {
            let domains = self.domains.lock().unwrap();
            domains.get(domain).cloned()
        };

        let slot = match slot {
            Some(slot) => slot,
            None => return Duration::ZERO,
        };

        let state = slot.lock().unwrap();
        match state.last_request_time {
            Some(last) => {
                let elapsed = now.saturating_duration_since(last);
                state.interval.saturating_sub(elapsed)
            }
            None => Duration::ZERO,
        }
    }

    /// Waits until a request to `domain` is admissible, returning the time
    /// actually waited
    ///
    /// The wait is folded into the domain's cumulative statistics before
    /// suspending.
    pub async fn wait_for_domain(&self, domain: &str) -> Duration {
        let wait = self.wait_time(domain);
        if !wait.is_zero() {
            {
                let slot = self.slot(domain);
                let mut state = slot.lock().unwrap();
                state.cumulative_wait += wait;
                state.wait_count += 1;
            }
            tracing::debug!("Rate limiting {}: waiting {:?}", domain, wait);
            tokio::time::sleep(wait).await;
        }
        wait
    }

    /// Records that a request to `domain` is being issued now
    ///
    /// Callers must invoke this immediately around the actual request;
    /// spacing correctness depends on it.
    pub fn record_request(&self, domain: &str) {
        self.record_request_at(domain, Instant::now());
    }

    /// Like `record_request`, with an explicit timestamp for tests
    pub fn record_request_at(&self, domain: &str, now: Instant) {
        let slot = self.slot(domain);
        let mut state = slot.lock().unwrap();
        state.last_request_time = Some(now);
        state.request_count += 1;
    }

    /// Returns statistics for a domain, or None if it was never seen
    pub fn stats(&self, domain: &str) -> Option<DomainStats> {
        let slot = {
            let domains = self.domains.lock().unwrap();
            domains.get(domain).cloned()
        }?;

        let state = slot.lock().unwrap();
        let average_wait = if state.wait_count > 0 {
            state.cumulative_wait / state.wait_count as u32
        } else {
            Duration::ZERO
        };

        Some(DomainStats {
            domain: domain.to_string(),
            request_count: state.request_count,
            cumulative_wait: state.cumulative_wait,
            average_wait,
        })
    }

    /// Sets a per-domain interval override
    ///
    /// A negative interval is a configuration error. Existing domain state
    /// picks up the new interval immediately.
    pub fn set_domain_interval(&self, domain: &str, interval_ms: i64) -> ConfigResult<()> {
        if interval_ms < 0 {
            return Err(ConfigError::NegativeInterval(interval_ms));
        }
        let interval = Duration::from_millis(interval_ms as u64);

        {
            let mut config = self.config.lock().unwrap();
            config.overrides.insert(domain.to_string(), interval);
        }

        let domains = self.domains.lock().unwrap();
        if let Some(slot) = domains.get(domain) {
            slot.lock().unwrap().interval = interval;
        }

        Ok(())
    }

    /// Enables or disables admission control
    pub fn set_enabled(&self, enabled: bool) {
        self.config.lock().unwrap().enabled = enabled;
    }

    /// Returns a snapshot of the current configuration
    pub fn configuration(&self) -> RateLimiterConfig {
        self.config.lock().unwrap().clone()
    }

    /// Drops all accumulated domain state
    pub fn clear(&self) {
        self.domains.lock().unwrap().clear();
    }

    /// Returns the effective interval for a domain
    pub fn effective_interval(&self, domain: &str) -> Duration {
        let config = self.config.lock().unwrap();
        config
            .overrides
            .get(domain)
            .copied()
            .unwrap_or(config.default_interval)
    }

    /// Gets or creates the per-domain state handle
    fn slot(&self, domain: &str) -> Arc<Mutex<DomainState>> {
        let interval = self.effective_interval(domain);
        let mut domains = self.domains.lock().unwrap();
        domains
            .entry(domain.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(DomainState::new(interval))))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(interval_ms: u64) -> RateLimiterConfig {
        RateLimiterConfig {
            enabled: true,
            default_interval: Duration::from_millis(interval_ms),
            overrides: HashMap::new(),
        }
    }

    #[test]
    fn test_unseen_domain_has_zero_wait() {
        let limiter = DomainRateLimiter::new(test_config(1000));
        assert_eq!(limiter.wait_time("x.com"), Duration::ZERO);
    }

    #[test]
    fn test_disabled_limiter_has_zero_wait() {
        let limiter = DomainRateLimiter::new(RateLimiterConfig {
            enabled: false,
            ..test_config(1000)
        });
        limiter.record_request("x.com");
        assert_eq!(limiter.wait_time("x.com"), Duration::ZERO);
    }

    #[test]
    fn test_wait_time_arithmetic() {
        let limiter = DomainRateLimiter::new(test_config(1000));
        let t0 = Instant::now();
        limiter.record_request_at("x.com", t0);

        // 200ms after the request: 800ms remain
        let wait = limiter.wait_time_at("x.com", t0 + Duration::from_millis(200));
        assert_eq!(wait, Duration::from_millis(800));

        // 1200ms after the request: interval has elapsed
        let wait = limiter.wait_time_at("x.com", t0 + Duration::from_millis(1200));
        assert_eq!(wait, Duration::ZERO);
    }

    #[test]
    fn test_wait_time_never_negative_and_non_increasing() {
        let limiter = DomainRateLimiter::new(test_config(1000));
        let t0 = Instant::now();
        limiter.record_request_at("x.com", t0);

        let mut previous = Duration::MAX;
        for elapsed_ms in [0u64, 100, 500, 999, 1000, 1500, 10_000] {
            let wait = limiter.wait_time_at("x.com", t0 + Duration::from_millis(elapsed_ms));
            assert!(wait <= previous, "wait increased as time advanced");
            previous = wait;
        }
        assert_eq!(previous, Duration::ZERO);
    }

    #[test]
    fn test_record_request_counts() {
        let limiter = DomainRateLimiter::new(test_config(1000));
        limiter.record_request("x.com");
        limiter.record_request("x.com");
        limiter.record_request("y.com");

        assert_eq!(limiter.stats("x.com").unwrap().request_count, 2);
        assert_eq!(limiter.stats("y.com").unwrap().request_count, 1);
        assert!(limiter.stats("z.com").is_none());
    }

    #[test]
    fn test_domain_override_beats_default() {
        let limiter = DomainRateLimiter::new(test_config(1000));
        limiter.set_domain_interval("slow.com", 5000).unwrap();

        let t0 = Instant::now();
        limiter.record_request_at("slow.com", t0);
        limiter.record_request_at("fast.com", t0);

        assert_eq!(
            limiter.wait_time_at("slow.com", t0 + Duration::from_millis(1000)),
            Duration::from_millis(4000)
        );
        assert_eq!(
            limiter.wait_time_at("fast.com", t0 + Duration::from_millis(1000)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_override_applies_to_existing_state() {
        let limiter = DomainRateLimiter::new(test_config(1000));
        let t0 = Instant::now();
        limiter.record_request_at("x.com", t0);

        limiter.set_domain_interval("x.com", 3000).unwrap();

        assert_eq!(
            limiter.wait_time_at("x.com", t0 + Duration::from_millis(500)),
            Duration::from_millis(2500)
        );
    }

    #[test]
    fn test_negative_interval_is_configuration_error() {
        let limiter = DomainRateLimiter::new(test_config(1000));
        let result = limiter.set_domain_interval("x.com", -1);
        assert!(matches!(result, Err(ConfigError::NegativeInterval(-1))));
    }

    #[test]
    fn test_configuration_snapshot() {
        let limiter = DomainRateLimiter::new(test_config(250));
        limiter.set_domain_interval("x.com", 900).unwrap();

        let config = limiter.configuration();
        assert!(config.enabled);
        assert_eq!(config.default_interval, Duration::from_millis(250));
        assert_eq!(
            config.overrides.get("x.com"),
            Some(&Duration::from_millis(900))
        );
    }

    #[test]
    fn test_clear_drops_state() {
        let limiter = DomainRateLimiter::new(test_config(1000));
        limiter.record_request("x.com");
        limiter.clear();
        assert!(limiter.stats("x.com").is_none());
        assert_eq!(limiter.wait_time("x.com"), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_wait_for_domain_spaces_requests() {
        let limiter = DomainRateLimiter::new(test_config(50));

        limiter.record_request("x.com");
        let start = Instant::now();
        let waited = limiter.wait_for_domain("x.com").await;
        let elapsed = start.elapsed();

        assert!(!waited.is_zero());
        assert!(
            elapsed >= Duration::from_millis(40),
            "waited only {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_wait_for_domain_unseen_returns_immediately() {
        let limiter = DomainRateLimiter::new(test_config(1000));
        let waited = limiter.wait_for_domain("fresh.com").await;
        assert_eq!(waited, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_wait_accumulates_stats() {
        let limiter = DomainRateLimiter::new(test_config(30));

        limiter.record_request("x.com");
        limiter.wait_for_domain("x.com").await;
        limiter.record_request("x.com");
        limiter.wait_for_domain("x.com").await;

        let stats = limiter.stats("x.com").unwrap();
        assert_eq!(stats.request_count, 2);
        assert!(!stats.cumulative_wait.is_zero());
        assert!(!stats.average_wait.is_zero());
        assert!(stats.average_wait <= stats.cumulative_wait);
    }

    #[test]
    fn test_stats_average_without_waits() {
        let limiter = DomainRateLimiter::new(test_config(1000));
        limiter.record_request("x.com");

        let stats = limiter.stats("x.com").unwrap();
        assert_eq!(stats.cumulative_wait, Duration::ZERO);
        assert_eq!(stats.average_wait, Duration::ZERO);
    }
}
