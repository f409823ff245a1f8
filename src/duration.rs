//! # Human-readable durations.
//!
//! Configuration and announcement settings express durations as `humantime`
//! strings (`"500ms"`, `"10s"`, `"15m"`, `"12h"`, `"1d"`, `"1h 30m"`). This module
//! wraps the parser with the crate's error type and provides the serde adapters
//! used with `#[serde(with = ...)]`.

use std::time::Duration;

use thiserror::Error;

/// Error returned by [`parse_duration`].
#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid duration <{input}>: {source}")]
pub struct ParseDurationError {
    /// The rejected input.
    pub input: String,
    #[source]
    pub source: humantime::DurationError,
}

/// Parses a duration such as `15m`, `250ms` or `1d 12h`.
///
/// Surrounding whitespace is ignored.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use expiryvisor::parse_duration;
///
/// assert_eq!(parse_duration("15m").unwrap(), Duration::from_secs(900));
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
/// assert!(parse_duration("10 parsecs").is_err());
/// ```
pub fn parse_duration(input: &str) -> Result<Duration, ParseDurationError> {
    humantime::parse_duration(input.trim()).map_err(|source| ParseDurationError {
        input: input.to_string(),
        source,
    })
}

/// Formats a duration the way [`parse_duration`] reads it back (`1h 30m`).
pub fn format_duration(d: Duration) -> String {
    humantime::format_duration(d).to_string()
}

/// Serde adapter for `Duration` fields.
pub(crate) mod serde_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_duration(&raw).map_err(D::Error::custom)
    }
}

/// Serde adapter for `Option<Duration>` fields.
pub(crate) mod serde_opt_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&super::format_duration(*d)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|raw| super::parse_duration(&raw).map_err(D::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_unit() {
        assert_eq!(parse_duration("1ms").unwrap(), Duration::from_millis(1));
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("12h").unwrap(), Duration::from_secs(43_200));
        assert_eq!(parse_duration(" 1d ").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_duration("1h 30m").unwrap(), Duration::from_secs(5_400));
    }

    #[test]
    fn rejects_malformed_input() {
        for raw in ["", "s", "10", "10 parsecs", "soon"] {
            let err = parse_duration(raw).unwrap_err();
            assert_eq!(err.input, raw);
        }
    }

    #[test]
    fn formatted_values_parse_back() {
        for d in [
            Duration::from_secs(900),
            Duration::from_secs(86_400),
            Duration::from_secs(90),
            Duration::from_millis(1_500),
        ] {
            assert_eq!(parse_duration(&format_duration(d)).unwrap(), d);
        }
        assert_eq!(format_duration(Duration::from_secs(900)), "15m");
    }
}
