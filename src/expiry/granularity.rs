//! # Expiry granularity.
//!
//! A [`Granularity`] is the rounding unit applied to subject expiries. Valid
//! values divide a day evenly (`1s`, `10s`, `1m`, `15m`, `1h`, `12h`, ...) or are
//! a whole number of days (`1d`, `7d`), so that boundaries counted from the Unix
//! epoch line up with the start of the minute, hour or day.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};
use thiserror::Error;

use crate::duration::{format_duration, parse_duration};

const SECS_PER_DAY: u64 = 86_400;

/// Error returned when a duration is not usable as a granularity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid expiry granularity <{input}>: {reason}")]
pub struct GranularityError {
    /// The rejected input.
    pub input: String,
    /// Why it was rejected.
    pub reason: &'static str,
}

/// Rounding step for subject expiries, in whole seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Granularity {
    secs: u64,
}

impl Granularity {
    pub const ONE_SECOND: Granularity = Granularity { secs: 1 };
    pub const TEN_SECONDS: Granularity = Granularity { secs: 10 };
    pub const ONE_MINUTE: Granularity = Granularity { secs: 60 };
    pub const FIFTEEN_MINUTES: Granularity = Granularity { secs: 900 };
    pub const ONE_HOUR: Granularity = Granularity { secs: 3_600 };
    pub const TWELVE_HOURS: Granularity = Granularity { secs: 43_200 };
    pub const ONE_DAY: Granularity = Granularity { secs: SECS_PER_DAY };

    /// Validates `d` as a granularity.
    ///
    /// Rejects zero, sub-second fractions, and steps that neither divide a day
    /// nor are a whole number of days.
    pub fn from_duration(d: Duration) -> Result<Self, GranularityError> {
        let err = |reason| GranularityError {
            input: format_duration(d),
            reason,
        };
        if d.subsec_nanos() != 0 {
            return Err(err("must be a whole number of seconds"));
        }
        let secs = d.as_secs();
        if secs == 0 {
            return Err(err("must be greater than zero"));
        }
        if i64::try_from(secs).is_err() {
            return Err(err("out of range"));
        }
        let aligned = if secs <= SECS_PER_DAY {
            SECS_PER_DAY % secs == 0
        } else {
            secs % SECS_PER_DAY == 0
        };
        if !aligned {
            return Err(err("must divide a day or be a whole number of days"));
        }
        Ok(Self { secs })
    }

    /// Step length in seconds.
    #[inline]
    pub fn as_secs(&self) -> u64 {
        self.secs
    }

    /// Step length in seconds as a timestamp offset.
    ///
    /// Construction keeps the step within `i64`, so this never saturates for a
    /// validated granularity.
    #[inline]
    pub(crate) fn step_secs(&self) -> i64 {
        i64::try_from(self.secs).unwrap_or(i64::MAX)
    }

    /// Step length as a [`Duration`].
    #[inline]
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.secs)
    }
}

impl Default for Granularity {
    /// One second: only the fractional part of an expiry is rounded away.
    fn default() -> Self {
        Granularity::ONE_SECOND
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_duration(self.as_duration()))
    }
}

impl FromStr for Granularity {
    type Err = GranularityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let d = parse_duration(s).map_err(|_| GranularityError {
            input: s.to_string(),
            reason: "not a duration",
        })?;
        Granularity::from_duration(d)
    }
}

impl Serialize for Granularity {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Granularity {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(D::Error::custom)
    }
}
