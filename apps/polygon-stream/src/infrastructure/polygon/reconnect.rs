//! Reconnection Policy
//!
//! Exponential backoff with jitter between failed attempts to reopen the
//! stream. The first reopen after a disconnect is attempted immediately;
//! the policy only paces the attempts that follow a failure.

use std::time::Duration;

use rand::Rng;

use crate::infrastructure::config::ReconnectSettings;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Growth factor applied after each failed attempt.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Failed attempts tolerated before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::from_settings(&ReconnectSettings::default())
    }
}

impl ReconnectConfig {
    /// Build from environment-derived settings.
    #[must_use]
    pub const fn from_settings(settings: &ReconnectSettings) -> Self {
        Self {
            initial_delay: settings.delay_initial,
            max_delay: settings.delay_max,
            multiplier: settings.delay_multiplier,
            jitter_factor: 0.1,
            max_attempts: settings.max_attempts,
        }
    }

    /// Retry without waiting, up to `max_attempts` failures.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter_factor: 0.0,
            max_attempts,
        }
    }
}

/// Stateful backoff tracker for one stream.
///
/// # Example
///
/// ```rust
/// use polygon_stream::infrastructure::polygon::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig {
///     initial_delay: Duration::from_millis(100),
///     max_delay: Duration::from_millis(250),
///     multiplier: 2.0,
///     jitter_factor: 0.0,
///     max_attempts: 0,
/// });
///
/// assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_millis(200)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_millis(250)));
///
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        let current_delay = config.initial_delay;
        Self {
            config,
            current_delay,
            attempt_count: 0,
        }
    }

    /// Record a failed attempt and return how long to wait before the next.
    ///
    /// Returns `None` once `max_attempts` failures have been recorded.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }
        self.attempt_count += 1;

        let delay = self.jittered(self.current_delay);

        self.current_delay = scaled(self.current_delay, self.config.multiplier.max(1.0))
            .map_or(self.config.max_delay, |grown| grown.min(self.config.max_delay));

        Some(delay)
    }

    /// Forget previous failures after a successful reopen.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempt_count = 0;
    }

    /// Failed attempts recorded since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Check if another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 || delay.is_zero() {
            return delay;
        }

        let spread = self.config.jitter_factor.min(1.0);
        let factor = rand::rng().random_range((1.0 - spread)..=(1.0 + spread));
        scaled(delay, factor).unwrap_or(delay)
    }
}

/// `delay * factor`, or `None` when the product is not a representable duration.
fn scaled(delay: Duration, factor: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts,
        }
    }

    #[test]
    fn default_config_follows_settings() {
        let config = ReconnectConfig::default();
        let settings = ReconnectSettings::default();
        assert_eq!(config.initial_delay, settings.delay_initial);
        assert_eq!(config.max_delay, settings.delay_max);
        assert_eq!(config.max_attempts, settings.max_attempts);
        assert!((config.jitter_factor - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn delays_grow_and_cap() {
        let mut policy = ReconnectPolicy::new(no_jitter(0));
        let delays: Vec<_> = (0..6).map(|_| policy.next_delay().unwrap()).collect();

        assert_eq!(
            delays,
            [100, 200, 400, 800, 1000, 1000].map(Duration::from_millis)
        );
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut policy = ReconnectPolicy::new(no_jitter(2));

        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_none());
        assert!(!policy.should_retry());
        assert_eq!(policy.attempt_count(), 2);
    }

    #[test]
    fn reset_restores_initial_delay() {
        let mut policy = ReconnectPolicy::new(no_jitter(2));
        let _ = policy.next_delay();
        let _ = policy.next_delay();

        policy.reset();

        assert!(policy.should_retry());
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_millis(1000),
            jitter_factor: 0.1,
            ..no_jitter(0)
        };

        for _ in 0..100 {
            let delay = ReconnectPolicy::new(config.clone()).next_delay().unwrap();
            let millis = delay.as_millis();
            assert!((900..=1100).contains(&millis), "delay {millis}ms out of range");
        }
    }

    #[test]
    fn infinite_multiplier_jumps_to_max_delay() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            multiplier: f64::INFINITY,
            ..no_jitter(0)
        });

        assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn unbounded_max_delay_saturates() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            initial_delay: Duration::from_secs(u64::MAX / 2),
            max_delay: Duration::from_secs(u64::MAX),
            multiplier: 4.0,
            jitter_factor: 0.1,
            max_attempts: 0,
        });

        for _ in 0..4 {
            assert!(policy.next_delay().is_some());
        }
        assert_eq!(policy.current_delay, Duration::from_secs(u64::MAX));
    }

    #[test]
    fn immediate_policy_never_waits() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::immediate(3));
        for _ in 0..3 {
            assert_eq!(policy.next_delay(), Some(Duration::ZERO));
        }
        assert!(policy.next_delay().is_none());
    }
}
