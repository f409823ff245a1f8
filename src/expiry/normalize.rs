use chrono::{DateTime, Utc};

use crate::error::ExpiryError;
use crate::expiry::granularity::Granularity;

/// Rounds `raw` up to the next granularity boundary counted from the Unix epoch.
///
/// The instant is truncated down to a multiple of `granularity` and exactly one
/// step is added, so the result is always **strictly later** than `raw`, even if
/// `raw` already sits on a boundary. Sub-second fractions are discarded.
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use expiryvisor::{Granularity, normalize};
///
/// let raw = Utc.with_ymd_and_hms(2024, 3, 1, 12, 7, 44).unwrap();
/// let adjusted = normalize(raw, Granularity::TEN_SECONDS);
/// assert_eq!(adjusted, Utc.with_ymd_and_hms(2024, 3, 1, 12, 7, 50).unwrap());
/// ```
pub fn normalize(raw: DateTime<Utc>, granularity: Granularity) -> DateTime<Utc> {
    let step = granularity.step_secs();
    let truncated = raw.timestamp().div_euclid(step) * step;
    truncated
        .checked_add(step)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Normalizes `raw` and rejects the result if it is not strictly after `now`.
///
/// This is the check applied when a subject expiry is set; a rejected expiry
/// never reaches the scheduler.
pub fn adjust_expiry(
    raw: DateTime<Utc>,
    granularity: Granularity,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, ExpiryError> {
    let adjusted = normalize(raw, granularity);
    if adjusted <= now {
        return Err(ExpiryError::InThePast { adjusted });
    }
    Ok(adjusted)
}
