use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    announce::{AnnouncementPublisher, CommandForwarder, NoopForwarder, NoopPublisher},
    config::SchedulerConfig,
    events::Bus,
    subjects::PolicyId,
    subscribers::{Subscribe, SubscriberSet},
};
use super::manager::{LifecycleManager, ManagerHandle, spawn_listener};

/// Builder for constructing a [`LifecycleManager`] with its collaborators.
///
/// Without an explicit publisher announcements are discarded; without a
/// forwarder every revocation is reported as rejected.
pub struct ManagerBuilder {
    policy: PolicyId,
    cfg: SchedulerConfig,
    publisher: Arc<dyn AnnouncementPublisher>,
    forwarder: Arc<dyn CommandForwarder>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl ManagerBuilder {
    /// Creates a new builder for `policy` with the given configuration.
    pub fn new(policy: PolicyId, cfg: SchedulerConfig) -> Self {
        Self {
            policy,
            cfg,
            publisher: Arc::new(NoopPublisher),
            forwarder: Arc::new(NoopForwarder),
            subscribers: Vec::new(),
        }
    }

    /// Sets the sink announcements are published to.
    pub fn with_publisher(mut self, publisher: Arc<dyn AnnouncementPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    /// Sets the sink grant revocations are forwarded to.
    pub fn with_forwarder(mut self, forwarder: Arc<dyn CommandForwarder>) -> Self {
        self.forwarder = forwarder;
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive lifecycle events (snapshots, announcements, retries,
    /// terminations) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Spawns the manager (and its subscriber fan-out) on the current tokio runtime.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> ManagerHandle {
        let bus = Bus::new(self.policy.clone(), self.cfg.bus_capacity_clamped());
        let (tx, rx) = mpsc::channel(self.cfg.inbox_capacity.max(1));

        let listener = (!self.subscribers.is_empty()).then(|| {
            let stop = CancellationToken::new();
            let set = SubscriberSet::new(self.subscribers, bus.clone());
            (spawn_listener(&bus, set, stop.clone()), stop)
        });

        let manager = LifecycleManager::new(
            self.policy.clone(),
            self.cfg,
            bus.clone(),
            self.publisher,
            self.forwarder,
        );
        tokio::spawn(manager.run(rx, listener));

        ManagerHandle::new(self.policy, tx, bus)
    }
}
