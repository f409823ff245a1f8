//! # Event subscribers
//!
//! - [`Subscribe`] trait implemented by event consumers
//! - [`SubscriberSet`] non-blocking fan-out with per-subscriber queues
//! - [`LogWriter`] built-in subscriber that renders events through `tracing`

mod log;
mod set;
mod subscribe;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
