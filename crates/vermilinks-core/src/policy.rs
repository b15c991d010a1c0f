//! Polling policy and adaptive backoff.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use vermilinks_core::PollingPolicy;
//!
//! let policy = PollingPolicy::builder()
//!     .interval(Duration::from_secs(10))
//!     .device_id("vermilinks-esp32-a")
//!     .build();
//!
//! assert_eq!(policy.max_interval(), Duration::from_secs(60));
//! // min(10s * 0.6, 4s)
//! assert_eq!(policy.cache_ttl(), Duration::from_secs(4));
//! ```

use std::time::Duration;

use tracing::debug;

/// Shortest allowed poll interval.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1500);
/// Default poll interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(5000);
/// Default backoff ceiling.
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_millis(60_000);
/// Upper bound for the derived cache TTL.
pub const MAX_DEFAULT_CACHE_TTL: Duration = Duration::from_millis(4000);
/// Default snapshot fetch timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Immutable polling configuration for one subscription.
///
/// Values are clamped on construction: the interval is at least
/// [`MIN_INTERVAL`] and the backoff ceiling is at least the interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingPolicy {
    interval: Duration,
    max_interval: Duration,
    cache_ttl: Duration,
    device_id: Option<String>,
    immediate: bool,
    fetch_timeout: Duration,
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl PollingPolicy {
    /// Create a new builder.
    pub fn builder() -> PollingPolicyBuilder {
        PollingPolicyBuilder::default()
    }

    /// Build a policy from millisecond values, as found in configuration.
    pub fn from_millis(interval_ms: u64, max_interval_ms: u64, cache_ttl_ms: Option<u64>) -> Self {
        let mut builder = Self::builder()
            .interval(Duration::from_millis(interval_ms))
            .max_interval(Duration::from_millis(max_interval_ms));
        if let Some(ttl) = cache_ttl_ms {
            builder = builder.cache_ttl(Duration::from_millis(ttl));
        }
        builder.build()
    }

    /// Default cache TTL for an interval: `min(interval * 0.6, 4s)`.
    pub fn default_cache_ttl(interval: Duration) -> Duration {
        interval.mul_f64(0.6).min(MAX_DEFAULT_CACHE_TTL)
    }

    /// Regular poll interval, and the backoff floor.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Backoff ceiling.
    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    /// How long a fetched snapshot may be served without a network call.
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Device to request and to accept push events for.
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Whether to fetch as soon as polling starts.
    pub fn immediate(&self) -> bool {
        self.immediate
    }

    /// Timeout applied to each snapshot fetch.
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// A fresh backoff tracker bounded by this policy.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.interval, self.max_interval)
    }
}

/// Builder for [`PollingPolicy`].
#[derive(Debug, Clone)]
pub struct PollingPolicyBuilder {
    interval: Duration,
    max_interval: Duration,
    cache_ttl: Option<Duration>,
    device_id: Option<String>,
    immediate: bool,
    fetch_timeout: Duration,
}

impl Default for PollingPolicyBuilder {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_interval: DEFAULT_MAX_INTERVAL,
            cache_ttl: None,
            device_id: None,
            immediate: true,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

impl PollingPolicyBuilder {
    /// Set the poll interval.
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the backoff ceiling.
    #[must_use]
    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    /// Set an explicit cache TTL instead of the derived default.
    #[must_use]
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Restrict to one device.
    #[must_use]
    pub fn device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Set whether to fetch as soon as polling starts.
    #[must_use]
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    /// Set the fetch timeout.
    #[must_use]
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Build the policy, clamping out-of-range values.
    #[must_use]
    pub fn build(self) -> PollingPolicy {
        let interval = self.interval.max(MIN_INTERVAL);
        if interval != self.interval {
            debug!(
                "Poll interval {:?} below minimum, using {:?}",
                self.interval, interval
            );
        }
        let max_interval = self.max_interval.max(interval);
        let cache_ttl = self
            .cache_ttl
            .unwrap_or_else(|| PollingPolicy::default_cache_ttl(interval));

        PollingPolicy {
            interval,
            max_interval,
            cache_ttl,
            device_id: self.device_id.filter(|id| !id.trim().is_empty()),
            immediate: self.immediate,
            fetch_timeout: self.fetch_timeout,
        }
    }
}

/// Exact-doubling backoff between a floor and a ceiling, both inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    current: Duration,
}

impl Backoff {
    /// Create a backoff starting at `floor`.
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        let ceiling = ceiling.max(floor);
        Self {
            floor,
            ceiling,
            current: floor,
        }
    }

    /// The delay to use for the next scheduled poll.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Record a failure: double the delay, capped at the ceiling.
    ///
    /// Returns the new delay.
    pub fn escalate(&mut self) -> Duration {
        let doubled = self.current.saturating_mul(2).min(self.ceiling);
        self.current = doubled.max(self.floor);
        self.current
    }

    /// Record a success: return to the floor.
    pub fn reset(&mut self) {
        self.current = self.floor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_policy_defaults() {
        let policy = PollingPolicy::default();
        assert_eq!(policy.interval(), ms(5000));
        assert_eq!(policy.max_interval(), ms(60_000));
        assert_eq!(policy.cache_ttl(), ms(3000));
        assert_eq!(policy.device_id(), None);
        assert!(policy.immediate());
        assert_eq!(policy.fetch_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_interval_clamped_to_minimum() {
        let policy = PollingPolicy::builder().interval(ms(200)).build();
        assert_eq!(policy.interval(), MIN_INTERVAL);
        assert_eq!(policy.cache_ttl(), ms(900));
    }

    #[test]
    fn test_max_interval_at_least_interval() {
        let policy = PollingPolicy::from_millis(10_000, 2000, None);
        assert_eq!(policy.max_interval(), ms(10_000));
    }

    #[test]
    fn test_cache_ttl_derivation() {
        assert_eq!(PollingPolicy::default_cache_ttl(ms(2000)), ms(1200));
        assert_eq!(PollingPolicy::default_cache_ttl(ms(30_000)), ms(4000));

        let policy = PollingPolicy::from_millis(5000, 60_000, Some(2000));
        assert_eq!(policy.cache_ttl(), ms(2000));
    }

    #[test]
    fn test_blank_device_id_ignored() {
        let policy = PollingPolicy::builder().device_id("  ").build();
        assert_eq!(policy.device_id(), None);
    }

    #[test]
    fn test_backoff_sequence() {
        let mut backoff = PollingPolicy::default().backoff();
        let mut seen = vec![backoff.current()];
        for _ in 0..6 {
            seen.push(backoff.escalate());
        }
        assert_eq!(
            seen,
            vec![
                ms(5000),
                ms(10_000),
                ms(20_000),
                ms(40_000),
                ms(60_000),
                ms(60_000),
                ms(60_000)
            ]
        );
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new(ms(5000), ms(60_000));
        backoff.escalate();
        backoff.escalate();
        backoff.reset();
        assert_eq!(backoff.current(), ms(5000));
    }

    #[test]
    fn test_backoff_floor_equals_ceiling() {
        let mut backoff = Backoff::new(ms(5000), ms(5000));
        assert_eq!(backoff.escalate(), ms(5000));
    }
}
