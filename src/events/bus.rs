//! # Per-policy event bus.
//!
//! Every manager owns one [`Bus`]. The manager and all of its subject workers
//! publish on it; the subscriber listener and any [`ManagerHandle::subscribe`]
//! receivers observe it.
//!
//! ```text
//!   Manager  ──┐
//!   Worker 1 ──┼──► Bus(policy) ──► subscriber listener ──► SubscriberSet
//!   Worker N ──┘        │
//!                       └─────────► ManagerHandle::subscribe()
//! ```
//!
//! Events published without a policy are stamped with the bus's policy, so a
//! receiver shared across managers can always tell them apart. Slow receivers
//! get `RecvError::Lagged(n)`; events published while nobody listens are lost.
//!
//! [`ManagerHandle::subscribe`]: crate::ManagerHandle::subscribe

use tokio::sync::broadcast;

use super::event::Event;
use crate::subjects::PolicyId;

/// Broadcast channel for the events of one policy.
#[derive(Clone, Debug)]
pub struct Bus {
    policy: PolicyId,
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus for `policy` retaining up to `capacity` events (minimum 1).
    pub fn new(policy: PolicyId, capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { policy, tx }
    }

    /// Policy this bus belongs to.
    pub fn policy(&self) -> &PolicyId {
        &self.policy
    }

    /// Stamps `ev` with the bus policy (unless it names one) and broadcasts it.
    pub fn publish(&self, mut ev: Event) {
        if ev.policy.is_none() {
            ev.policy = Some(self.policy.clone());
        }
        let _ = self.tx.send(ev);
    }

    /// Receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
