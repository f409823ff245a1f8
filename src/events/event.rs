//! # Runtime events emitted by the lifecycle manager and its subject workers.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Reconciliation events**: snapshot handling and registry bookkeeping
//! - **Worker events**: announcement attempts, retries, revocation, termination
//! - **Shutdown events**: teardown of a manager
//! - **Subscriber events**: fan-out problems
//!
//! The [`Event`] struct carries additional metadata such as timestamps, subject,
//! announcement kind, attempt numbers and backoff delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use expiryvisor::{AnnouncementKind, Event, EventKind};
//!
//! let ev = Event::new(EventKind::BackoffScheduled)
//!     .with_announcement(AnnouncementKind::BeforeExpiry)
//!     .with_attempt(2)
//!     .with_delay(Duration::from_secs(4));
//!
//! assert_eq!(ev.kind, EventKind::BackoffScheduled);
//! assert_eq!(ev.delay(), Some(Duration::from_secs(4)));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};

use crate::announce::AnnouncementKind;
use crate::core::WorkerId;
use crate::subjects::{PolicyId, SubjectId};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Reconciliation events ===
    /// A snapshot was reconciled against the registry.
    ///
    /// Sets: `policy`, `reason` (`added=<n> removed=<m>`)
    SnapshotApplied,

    /// A snapshot addressed to another policy was dropped.
    ///
    /// Sets: `policy`, `reason` (foreign policy id)
    SnapshotIgnored,

    /// A worker was spawned and registered for a subject.
    ///
    /// Sets: `policy`, `subject`, `worker`
    WorkerSpawned,

    /// A deletion notice was delivered to a subject's worker.
    ///
    /// Sets: `policy`, `subject`, `worker`
    DeletionNoticeSent,

    /// A subject changed its expiry or announcement; its worker was retired
    /// silently and a fresh worker takes over.
    ///
    /// Sets: `policy`, `subject`, `worker` (the retired worker)
    WorkerReplaced,

    /// Registry and policy disagree (missing worker, unknown handle). Non-fatal.
    ///
    /// Sets: `policy`, `reason`, optionally `subject` / `worker`
    RegistryInconsistency,

    /// A terminated worker's registry entry was removed.
    ///
    /// Sets: `policy`, `subject`, `worker`
    WorkerReclaimed,

    // === Worker events ===
    /// A worker armed its timer for the next step.
    ///
    /// Sets: `policy`, `subject`, `worker`, `due`, `announcement` (if the step announces)
    WorkerArmed,

    /// An announcement was published.
    ///
    /// Sets: `policy`, `subject`, `worker`, `announcement`, `attempt`
    AnnouncementPublished,

    /// An announcement attempt failed.
    ///
    /// Sets: `policy`, `subject`, `worker`, `announcement`, `attempt`, `reason`
    AnnouncementFailed,

    /// Next publish attempt scheduled after a failure.
    ///
    /// Sets: `policy`, `subject`, `worker`, `announcement`, `attempt` (failed attempt),
    /// `delay_ms`, `reason`
    BackoffScheduled,

    /// Retrying would exceed the maximum timeout; the announcement was dropped.
    ///
    /// Sets: `policy`, `subject`, `worker`, `announcement`, `attempt`, `reason`
    AnnouncementAbandoned,

    /// The grant removal command was accepted by the forwarder.
    ///
    /// Sets: `policy`, `subject`, `worker`
    RevocationForwarded,

    /// The grant removal command was not accepted (not retried).
    ///
    /// Sets: `policy`, `subject`, `worker`, `reason`
    RevocationFailed,

    /// A worker reached its terminal state.
    ///
    /// Sets: `policy`, `subject`, `worker`, `reason` (exit reason label)
    WorkerTerminated,

    // === Shutdown events ===
    /// Manager teardown requested.
    ShutdownRequested,

    /// All workers terminated within the shutdown grace.
    AllStoppedWithin,

    /// Shutdown grace exceeded; remaining workers were aborted.
    GraceExceeded,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `policy`, `reason` (subscriber name, event kind being handled, panic info)
    SubscriberPanicked,

    /// Subscriber queue started dropping events (queue full or worker closed).
    /// Published once per congestion episode, not per dropped event.
    ///
    /// Sets: `policy`, `reason` (subscriber name, cause, first dropped kind)
    SubscriberOverflow,
}

impl EventKind {
    /// Stable snake_case label.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::SnapshotApplied => "snapshot_applied",
            EventKind::SnapshotIgnored => "snapshot_ignored",
            EventKind::WorkerSpawned => "worker_spawned",
            EventKind::DeletionNoticeSent => "deletion_notice_sent",
            EventKind::WorkerReplaced => "worker_replaced",
            EventKind::RegistryInconsistency => "registry_inconsistency",
            EventKind::WorkerReclaimed => "worker_reclaimed",
            EventKind::WorkerArmed => "worker_armed",
            EventKind::AnnouncementPublished => "announcement_published",
            EventKind::AnnouncementFailed => "announcement_failed",
            EventKind::BackoffScheduled => "backoff_scheduled",
            EventKind::AnnouncementAbandoned => "announcement_abandoned",
            EventKind::RevocationForwarded => "revocation_forwarded",
            EventKind::RevocationFailed => "revocation_failed",
            EventKind::WorkerTerminated => "worker_terminated",
            EventKind::ShutdownRequested => "shutdown_requested",
            EventKind::AllStoppedWithin => "all_stopped_within",
            EventKind::GraceExceeded => "grace_exceeded",
            EventKind::SubscriberPanicked => "subscriber_panicked",
            EventKind::SubscriberOverflow => "subscriber_overflow",
        }
    }

    /// Events about the subscriber fan-out itself.
    pub fn is_subscriber_fault(&self) -> bool {
        matches!(
            self,
            EventKind::SubscriberPanicked | EventKind::SubscriberOverflow
        )
    }
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Policy the event belongs to.
    pub policy: Option<PolicyId>,
    /// Subject the event is about.
    pub subject: Option<SubjectId>,
    /// Worker that emitted or is targeted by the event.
    pub worker: Option<WorkerId>,
    /// Announcement involved.
    pub announcement: Option<AnnouncementKind>,
    /// Attempt count (starting from 1).
    pub attempt: Option<u32>,
    /// Backoff delay before next attempt in milliseconds.
    pub delay_ms: Option<u64>,
    /// Instant a timer was armed for.
    pub due: Option<DateTime<Utc>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            policy: None,
            subject: None,
            worker: None,
            announcement: None,
            attempt: None,
            delay_ms: None,
            due: None,
            reason: None,
        }
    }

    #[inline]
    pub fn with_policy(mut self, policy: &PolicyId) -> Self {
        self.policy = Some(policy.clone());
        self
    }

    #[inline]
    pub fn with_subject(mut self, subject: &SubjectId) -> Self {
        self.subject = Some(subject.clone());
        self
    }

    #[inline]
    pub fn with_worker(mut self, worker: WorkerId) -> Self {
        self.worker = Some(worker);
        self
    }

    #[inline]
    pub fn with_announcement(mut self, kind: AnnouncementKind) -> Self {
        self.announcement = Some(kind);
        self
    }

    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a backoff delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(d.as_millis().min(u128::from(u64::MAX)) as u64);
        self
    }

    #[inline]
    pub fn with_due(mut self, due: DateTime<Utc>) -> Self {
        self.due = Some(due);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Backoff delay, if any.
    #[inline]
    pub fn delay(&self) -> Option<Duration> {
        self.delay_ms.map(Duration::from_millis)
    }

    /// A subscriber queue started dropping events; `dropped` is the first one lost.
    pub fn subscriber_overflow(subscriber: &str, cause: &'static str, dropped: EventKind) -> Self {
        Event::new(EventKind::SubscriberOverflow).with_reason(format!(
            "subscriber={subscriber} cause={cause} dropped={}",
            dropped.as_label()
        ))
    }

    /// A subscriber panicked while handling an event of kind `during`.
    pub fn subscriber_panicked(subscriber: &str, during: EventKind, info: &str) -> Self {
        Event::new(EventKind::SubscriberPanicked).with_reason(format!(
            "subscriber={subscriber} during={} info={info}",
            during.as_label()
        ))
    }
}
