//! Expiry normalization.
//!
//! Subject expiries are rounded **up** to a configured [`Granularity`] before they
//! are stored. Many subjects then share the same few fire instants, which keeps
//! the number of distinct timers small and hides sub-second clock skew.
//!
//! ```text
//! granularity 10s:  12:07:44      ─► 12:07:50
//! granularity 1m:   12:07:03      ─► 12:08:00
//! granularity 1m:   12:08:00      ─► 12:09:00   (always one step forward)
//! ```

mod granularity;
mod normalize;

pub use granularity::{Granularity, GranularityError};
pub use normalize::{adjust_expiry, normalize};
