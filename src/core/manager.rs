//! # LifecycleManager: reconciles subject workers against policy snapshots.
//!
//! One manager runs per policy. It owns the [`WorkerRegistry`] and is the only
//! task that touches it; every request reaches it as a message.
//!
//! ## Architecture
//! ```text
//! ManagerHandle ──► inbox (bounded mpsc) ──┐
//!                                          ├──► LifecycleManager::run() ── one message at a time
//! worker wrappers ──► exits (unbounded) ───┘          │
//!                                                     ├─► Snapshot   → relevant set → diff
//!                                                     │                 ├─ added   → spawn worker
//!                                                     │                 ├─ removed → deletion notice
//!                                                     │                 └─ changed → replace worker
//!                                                     ├─► Terminated → reclaim registry entry
//!                                                     ├─► Registry   → RegistryView
//!                                                     └─► Shutdown   → cascade deletion, wait grace
//! ```
//!
//! ## Supervision
//! Each worker runs inside an inner task; a wrapper task awaits its join handle
//! (turning panics and aborts into an exit reason), publishes `WorkerTerminated`
//! and signals the manager. A worker is therefore always reclaimed, however it ends.
//!
//! ## Rules
//! - Replaying the same snapshot leaves the registry unchanged
//! - Removing a subject without a registered worker is logged, never fatal
//! - Unknown termination handles are logged and ignored
//! - Dropping every handle tears the manager down like [`ManagerHandle::shutdown`]

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::announce::{AnnouncementPublisher, CommandForwarder};
use crate::config::SchedulerConfig;
use crate::core::builder::ManagerBuilder;
use crate::core::registry::{RegistryView, WorkerId, WorkerRegistry, WorkerSlot};
use crate::core::worker::{SubjectWorker, WorkerExit, WorkerNotice, WorkerParams};
use crate::error::{RuntimeError, SubmitError};
use crate::events::{Bus, Event, EventKind};
use crate::subjects::{PolicyId, PolicySnapshot, Subject, SubjectId, diff, relevant_subjects};
use crate::subscribers::SubscriberSet;

/// Messages accepted by the manager inbox.
pub(crate) enum Message {
    Snapshot(PolicySnapshot),
    WorkerTerminated(WorkerId),
    Registry(oneshot::Sender<RegistryView>),
    Shutdown(oneshot::Sender<Result<(), RuntimeError>>),
}

/// Per-policy supervisor of subject workers.
///
/// Created through [`LifecycleManager::builder`]; once spawned it is driven
/// exclusively through its [`ManagerHandle`].
pub struct LifecycleManager {
    policy: PolicyId,
    cfg: SchedulerConfig,
    registry: WorkerRegistry,
    bus: Bus,
    publisher: Arc<dyn AnnouncementPublisher>,
    forwarder: Arc<dyn CommandForwarder>,
    exits_tx: mpsc::UnboundedSender<WorkerId>,
    exits_rx: mpsc::UnboundedReceiver<WorkerId>,
}

impl LifecycleManager {
    /// Starts building a manager for `policy`.
    pub fn builder(policy: PolicyId, cfg: SchedulerConfig) -> ManagerBuilder {
        ManagerBuilder::new(policy, cfg)
    }

    pub(crate) fn new(
        policy: PolicyId,
        cfg: SchedulerConfig,
        bus: Bus,
        publisher: Arc<dyn AnnouncementPublisher>,
        forwarder: Arc<dyn CommandForwarder>,
    ) -> Self {
        let (exits_tx, exits_rx) = mpsc::unbounded_channel();
        Self {
            policy,
            cfg,
            registry: WorkerRegistry::new(),
            bus,
            publisher,
            forwarder,
            exits_tx,
            exits_rx,
        }
    }

    /// Main loop; returns once shut down.
    ///
    /// `listener` is the subscriber fan-out task (if any); it is stopped and
    /// drained before a shutdown request is answered.
    pub(crate) async fn run(
        mut self,
        mut inbox: mpsc::Receiver<Message>,
        listener: Option<(JoinHandle<()>, CancellationToken)>,
    ) {
        let reply = loop {
            tokio::select! {
                biased;
                Some(id) = self.exits_rx.recv() => self.on_worker_terminated(id),
                msg = inbox.recv() => match msg {
                    Some(Message::Snapshot(snapshot)) => self.on_policy_snapshot(snapshot),
                    Some(Message::WorkerTerminated(id)) => self.on_worker_terminated(id),
                    Some(Message::Registry(tx)) => {
                        let _ = tx.send(self.registry.view());
                    }
                    Some(Message::Shutdown(tx)) => break Some(tx),
                    None => break None,
                },
            }
        };

        inbox.close();
        let res = self.shutdown().await;
        if let Some((join, stop)) = listener {
            stop.cancel();
            let _ = join.await;
        }

        match reply {
            Some(tx) => {
                let _ = tx.send(res);
            }
            None => {
                if let Err(e) = res {
                    warn!(policy = %self.policy, "manager dropped: {}", e.as_message());
                }
            }
        }
    }

    /// Reconciles the worker population against a snapshot.
    fn on_policy_snapshot(&mut self, snapshot: PolicySnapshot) {
        if snapshot.policy_id != self.policy {
            warn!(
                policy = %self.policy,
                foreign = %snapshot.policy_id,
                "ignoring snapshot of another policy"
            );
            self.bus
                .publish(Event::new(EventKind::SnapshotIgnored).with_reason(snapshot.policy_id.as_str()));
            return;
        }

        let current = relevant_subjects(&snapshot);
        let previous = self.registry.active_subjects();
        let changes = diff(&previous, &current);

        let changed: Vec<Subject> = current
            .iter()
            .filter(|s| {
                self.registry.active(&s.id).is_some_and(|slot| {
                    slot.subject.expiry != s.expiry || slot.subject.announcement != s.announcement
                })
            })
            .cloned()
            .collect();

        debug!(
            policy = %self.policy,
            added = changes.added.len(),
            removed = changes.removed.len(),
            changed = changed.len(),
            "policy snapshot reconciled"
        );

        for subject in &changes.removed {
            self.notify_deleted(&subject.id);
        }
        for subject in changed.iter() {
            self.replace_worker(subject.clone());
        }
        for subject in changes.added.iter() {
            self.spawn_worker(subject.clone());
        }

        self.bus.publish(
            Event::new(EventKind::SnapshotApplied)
                .with_reason(format!(
                    "added={} removed={} changed={}",
                    changes.added.len(),
                    changes.removed.len(),
                    changed.len()
                )),
        );
    }

    /// Delivers a deletion notice to the subject's worker, if one is registered.
    fn notify_deleted(&mut self, subject: &SubjectId) {
        let Some(slot) = self.registry.retire(subject) else {
            error!(
                policy = %self.policy,
                subject = %subject,
                "attempting to notify nonexistent worker for deleted subject"
            );
            self.bus.publish(
                Event::new(EventKind::RegistryInconsistency)
                    .with_subject(subject)
                    .with_reason("no_worker_for_removed_subject"),
            );
            return;
        };
        slot.notice.delete();
        let ev = Event::new(EventKind::DeletionNoticeSent)
            .with_subject(subject)
            .with_worker(slot.id);
        self.bus.publish(ev);
    }

    /// Retires the worker of a changed subject silently and starts a fresh one.
    fn replace_worker(&mut self, subject: Subject) {
        if let Some(slot) = self.registry.retire(&subject.id) {
            slot.notice.replace();
            self.bus.publish(
                Event::new(EventKind::WorkerReplaced)
                    .with_subject(&subject.id)
                    .with_worker(slot.id),
            );
        }
        self.spawn_worker(subject);
    }

    /// Spawns a worker for the subject and registers it under supervision.
    fn spawn_worker(&mut self, subject: Subject) {
        let id = WorkerId::next();
        let notice = WorkerNotice::default();
        let worker = SubjectWorker::new(
            id,
            self.policy.clone(),
            subject.clone(),
            self.worker_params(),
            Arc::clone(&self.publisher),
            Arc::clone(&self.forwarder),
            self.bus.clone(),
        );

        let inner = tokio::spawn(worker.run(notice.clone()));
        let abort = inner.abort_handle();

        let bus = self.bus.clone();
        let exits = self.exits_tx.clone();
        let policy = self.policy.clone();
        let subject_id = subject.id.clone();
        tokio::spawn(async move {
            let exit = match inner.await {
                Ok(exit) => exit,
                Err(e) if e.is_panic() => {
                    error!(policy = %policy, subject = %subject_id, "subject worker panicked");
                    WorkerExit::Panicked
                }
                Err(_) => WorkerExit::Aborted,
            };
            bus.publish(
                Event::new(EventKind::WorkerTerminated)
                    .with_subject(&subject_id)
                    .with_worker(id)
                    .with_reason(exit.as_label()),
            );
            let _ = exits.send(id);
        });

        if let Some(displaced) = self.registry.insert(WorkerSlot {
            id,
            subject: subject.clone(),
            notice,
            abort,
        }) {
            // the caller retires active workers first; a leftover is stopped here
            warn!(policy = %self.policy, subject = %subject.id, "displacing active worker");
            if let Some(old) = self.registry.slot(displaced) {
                old.notice.replace();
            }
        }

        self.bus.publish(
            Event::new(EventKind::WorkerSpawned)
                .with_subject(&subject.id)
                .with_worker(id),
        );
    }

    /// Removes a terminated worker from the registry.
    fn on_worker_terminated(&mut self, id: WorkerId) {
        match self.registry.remove(id) {
            Some(slot) => {
                // no-op if the task already finished
                slot.abort.abort();
                debug!(policy = %self.policy, worker = %id, "removed terminated worker");
                self.bus.publish(
                    Event::new(EventKind::WorkerReclaimed)
                        .with_subject(&slot.subject.id)
                        .with_worker(id),
                );
            }
            None => {
                debug!(policy = %self.policy, worker = %id, "terminated worker not found");
            }
        }
    }

    /// Cascades deletion to every live worker and waits up to `shutdown_grace`.
    async fn shutdown(&mut self) -> Result<(), RuntimeError> {
        self.bus.publish(Event::new(EventKind::ShutdownRequested));

        for id in self.registry.retire_all() {
            if let Some(slot) = self.registry.slot(id) {
                slot.notice.delete();
                self.bus.publish(
                    Event::new(EventKind::DeletionNoticeSent)
                        .with_subject(&slot.subject.id)
                        .with_worker(id),
                );
            }
        }

        let grace = self.cfg.shutdown_grace;
        let deadline = Instant::now() + grace;
        while !self.registry.is_empty() {
            tokio::select! {
                Some(id) = self.exits_rx.recv() => self.on_worker_terminated(id),
                _ = time::sleep_until(deadline) => break,
            }
        }

        if self.registry.is_empty() {
            self.bus.publish(Event::new(EventKind::AllStoppedWithin));
            return Ok(());
        }

        let mut stuck: Vec<String> = self
            .registry
            .drain()
            .into_iter()
            .map(|slot| {
                slot.abort.abort();
                slot.subject.id.to_string()
            })
            .collect();
        stuck.sort_unstable();

        self.bus
            .publish(Event::new(EventKind::GraceExceeded).with_reason(stuck.join(",")));
        Err(RuntimeError::GraceExceeded { grace, stuck })
    }

    fn worker_params(&self) -> WorkerParams {
        WorkerParams {
            grace_period: self.cfg.grace_period,
            max_timeout: self.cfg.max_timeout,
            backoff: self.cfg.backoff,
            expire_grants: self.cfg.expire_grants,
        }
    }
}

/// Spawns the task forwarding bus events to the subscriber set.
///
/// Events still buffered when `stop` fires are delivered before the set drains.
pub(crate) fn spawn_listener(
    bus: &Bus,
    mut set: SubscriberSet,
    stop: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                msg = rx.recv() => match msg {
                    Ok(ev) => set.emit(ev),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "subscriber listener lagged behind the event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = stop.cancelled() => break,
            }
        }
        while let Ok(ev) = rx.try_recv() {
            set.emit(ev);
        }
        set.shutdown().await;
    })
}

/// Cloneable handle to a running [`LifecycleManager`].
#[derive(Clone)]
pub struct ManagerHandle {
    policy: PolicyId,
    inbox: mpsc::Sender<Message>,
    bus: Bus,
}

impl ManagerHandle {
    pub(crate) fn new(policy: PolicyId, inbox: mpsc::Sender<Message>, bus: Bus) -> Self {
        Self { policy, inbox, bus }
    }

    /// Policy this manager supervises.
    pub fn policy_id(&self) -> &PolicyId {
        &self.policy
    }

    /// Submits a policy snapshot, waiting for inbox capacity.
    pub async fn apply_snapshot(&self, snapshot: PolicySnapshot) -> Result<(), SubmitError> {
        self.inbox
            .send(Message::Snapshot(snapshot))
            .await
            .map_err(|_| SubmitError::Closed)
    }

    /// Submits a policy snapshot without waiting.
    pub fn try_apply_snapshot(&self, snapshot: PolicySnapshot) -> Result<(), SubmitError> {
        self.inbox
            .try_send(Message::Snapshot(snapshot))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SubmitError::Full,
                mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
            })
    }

    /// Signals that a worker terminated; its registry entry is reclaimed.
    ///
    /// Workers spawned by the manager report themselves; repeating the signal is a no-op.
    pub async fn worker_terminated(&self, id: WorkerId) -> Result<(), SubmitError> {
        self.inbox
            .send(Message::WorkerTerminated(id))
            .await
            .map_err(|_| SubmitError::Closed)
    }

    /// Returns the current registry contents.
    pub async fn registry(&self) -> Result<RegistryView, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.inbox
            .send(Message::Registry(tx))
            .await
            .map_err(|_| RuntimeError::ManagerGone)?;
        rx.await.map_err(|_| RuntimeError::ManagerGone)
    }

    /// Subscribes to the lifecycle events of this manager and its workers.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Tears the manager down: every live worker gets a deletion notice, then the
    /// manager waits up to `shutdown_grace` and aborts whatever is left.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.inbox
            .send(Message::Shutdown(tx))
            .await
            .map_err(|_| RuntimeError::ManagerGone)?;
        rx.await.map_err(|_| RuntimeError::ManagerGone)?
    }

    /// Returns `true` once the manager stopped accepting messages.
    pub fn is_closed(&self) -> bool {
        self.inbox.is_closed()
    }
}
