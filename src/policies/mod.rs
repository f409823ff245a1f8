//! Retry policies.
//!
//! Knobs that control **how long** a subject worker waits between failed
//! announcement attempts.
//!
//! ## Contents
//! - [`BackoffPolicy`] how retry delays evolve (initial / multiplier / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid thundering herd
//!
//! ## Quick wiring
//! ```text
//! SchedulerConfig { backoff: BackoffPolicy, max_timeout, .. }
//!      └─► core::worker::SubjectWorker uses:
//!           - backoff.next(attempt) to schedule the next publish attempt
//!           - max_timeout to give up on an announcement
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → initial=1s, multiplier=2.0, max=2m, jitter=RandomFactor(0.2).

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
