//! # Backoff policy for retrying announcements.
//!
//! [`BackoffPolicy`] controls how retry delays grow after repeated publish failures.
//! It is parameterized by:
//! - [`BackoffPolicy::multiplier`] the multiplicative growth factor;
//! - [`BackoffPolicy::initial`] the initial delay;
//! - [`BackoffPolicy::max`] the maximum delay cap.
//!
//! The delay for attempt `n` is computed as `initial × multiplier^n`, clamped to `max`,
//! then jitter is applied and the result clamped to `max` again. Because the base delay
//! is derived purely from the attempt number, jitter output never feeds back into
//! subsequent calculations.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use expiryvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     initial: Duration::from_secs(1),
//!     max: Duration::from_secs(10),
//!     multiplier: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_secs(1));
//! assert_eq!(backoff.next(1), Duration::from_secs(2));
//! assert_eq!(backoff.next(2), Duration::from_secs(4));
//! assert_eq!(backoff.next(10), Duration::from_secs(10));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::serde_duration;
use crate::policies::jitter::JitterPolicy;

/// Retry backoff policy.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    #[serde(with = "serde_duration")]
    pub initial: Duration,
    /// Maximum delay cap for retries.
    #[serde(with = "serde_duration")]
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` keeps delays non-decreasing).
    pub multiplier: f64,
    /// Jitter policy to prevent thundering herd.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns a strategy with:
    /// - `initial = 1s`;
    /// - `multiplier = 2.0`;
    /// - `max = 2m`;
    /// - `jitter = RandomFactor { factor: 0.2 }`.
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(120),
            multiplier: 2.0,
            jitter: JitterPolicy::RandomFactor { factor: 0.2 },
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay for the given retry attempt (0-indexed).
    ///
    /// # Notes
    /// - If `multiplier` equals 1.0, delay remains constant at `initial` (up to `max`).
    /// - If `multiplier` is greater than 1.0, delays grow exponentially up to `max`.
    /// - Overflowing or non-finite intermediate values clamp to `max`.
    pub fn next(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let clamped_exp = attempt.min(i32::MAX as u32) as i32;
        let unclamped_secs = self.initial.as_secs_f64() * self.multiplier.powi(clamped_exp);

        let base =
            if !unclamped_secs.is_finite() || unclamped_secs < 0.0 || unclamped_secs > max_secs {
                self.max
            } else {
                Duration::from_secs_f64(unclamped_secs)
            };

        self.jitter.apply(base).min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(initial: Duration, max: Duration, multiplier: f64) -> BackoffPolicy {
        BackoffPolicy {
            initial,
            max,
            multiplier,
            jitter: JitterPolicy::None,
        }
    }

    #[test]
    fn test_attempt_zero_returns_initial() {
        let policy = plain(Duration::from_millis(100), Duration::from_secs(30), 2.0);
        assert_eq!(policy.next(0), Duration::from_millis(100));
    }

    #[test]
    fn test_exponential_growth_no_jitter() {
        let policy = plain(Duration::from_secs(1), Duration::from_secs(10), 2.0);

        let delays: Vec<_> = (0..6).map(|a| policy.next(a)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(10),
                Duration::from_secs(10),
            ]
        );
    }

    #[test]
    fn test_delays_never_decrease() {
        let policy = plain(Duration::from_millis(300), Duration::from_secs(45), 1.7);
        let mut prev = Duration::ZERO;
        for attempt in 0..64 {
            let d = policy.next(attempt);
            assert!(d >= prev, "attempt {attempt}: {d:?} < {prev:?}");
            prev = d;
        }
        assert_eq!(prev, Duration::from_secs(45));
    }

    #[test]
    fn test_constant_multiplier() {
        let policy = plain(Duration::from_millis(500), Duration::from_secs(30), 1.0);
        for attempt in 0..10 {
            assert_eq!(
                policy.next(attempt),
                Duration::from_millis(500),
                "attempt {} should be constant at 500ms",
                attempt
            );
        }
    }

    #[test]
    fn test_initial_exceeds_max() {
        let policy = plain(Duration::from_secs(10), Duration::from_secs(5), 2.0);
        assert_eq!(policy.next(0), Duration::from_secs(5));
    }

    #[test]
    fn test_random_factor_respects_cap() {
        let policy = BackoffPolicy {
            initial: Duration::from_secs(8),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: JitterPolicy::RandomFactor { factor: 1.0 },
        };
        for attempt in 0..20 {
            assert!(policy.next(attempt) <= Duration::from_secs(10));
        }
    }

    #[test]
    fn test_equal_jitter_bounds() {
        let policy = BackoffPolicy {
            initial: Duration::from_millis(1000),
            max: Duration::from_secs(30),
            multiplier: 1.0,
            jitter: JitterPolicy::Equal,
        };
        for attempt in 0..50 {
            let delay = policy.next(attempt);
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn test_non_finite_overflow_clamps_to_max() {
        let policy = plain(Duration::from_millis(100), Duration::from_secs(10), 2.0);
        assert_eq!(policy.next(u32::MAX), Duration::from_secs(10));
    }
}
