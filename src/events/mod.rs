//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `LifecycleManager`, `SubjectWorker`, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the manager's subscriber listener (fans out to `SubscriberSet`)
//!   and any receiver obtained through `ManagerHandle::subscribe`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
