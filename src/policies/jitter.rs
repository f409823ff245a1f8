//! # Jitter policy for retry delays.
//!
//! [`JitterPolicy`] adds randomness to backoff delays so that thousands of workers
//! whose announcements failed at the same instant do not retry in lockstep.
//!
//! - [`JitterPolicy::None`]: no randomization, predictable delays
//! - [`JitterPolicy::Full`]: random delay in [0, backoff_delay]
//! - [`JitterPolicy::Equal`]: delay = backoff_delay/2 + random[0, backoff_delay/2]
//! - [`JitterPolicy::RandomFactor`]: delay = backoff_delay × (1 + random[0, factor])

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Policy controlling randomization of retry delays.
///
/// ## Trade-offs
/// - **None**: Predictable, but risks thundering herd
/// - **Full**: Maximum randomness, can shorten delays drastically
/// - **Equal**: Balanced, keeps at least half of the delay
/// - **RandomFactor**: Only ever lengthens the delay, by at most `factor`
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JitterPolicy {
    /// No jitter: use exact backoff delay.
    #[default]
    None,

    /// Full jitter: random delay in [0, backoff_delay].
    Full,

    /// Equal jitter: delay = backoff_delay/2 + random[0, backoff_delay/2].
    Equal,

    /// Proportional jitter: delay = backoff_delay × (1 + random[0, factor]).
    ///
    /// Negative or non-finite factors are treated as `0`.
    RandomFactor {
        /// Upper bound of the random extension, relative to the delay.
        factor: f64,
    },
}

impl JitterPolicy {
    /// Applies jitter to the given delay.
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => self.full_jitter(delay),
            JitterPolicy::Equal => self.equal_jitter(delay),
            JitterPolicy::RandomFactor { factor } => self.factor_jitter(delay, *factor),
        }
    }

    /// Full jitter: random[0, delay]
    fn full_jitter(&self, delay: Duration) -> Duration {
        let ms = delay.as_millis() as u64;
        if ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=ms))
    }

    /// Equal jitter: delay/2 + random[0, delay/2]
    fn equal_jitter(&self, delay: Duration) -> Duration {
        let ms = delay.as_millis() as u64;
        if ms == 0 {
            return Duration::ZERO;
        }
        let half = ms / 2;
        let jitter = if half == 0 {
            0
        } else {
            rand::rng().random_range(0..=half)
        };
        Duration::from_millis(half + jitter)
    }

    /// Proportional jitter: delay × (1 + random[0, factor])
    fn factor_jitter(&self, delay: Duration, factor: f64) -> Duration {
        if !factor.is_finite() || factor <= 0.0 || delay.is_zero() {
            return delay;
        }
        let stretch = 1.0 + rand::rng().random_range(0.0..=factor);
        let secs = delay.as_secs_f64() * stretch;
        if secs.is_finite() {
            Duration::from_secs_f64(secs)
        } else {
            delay
        }
    }
}
