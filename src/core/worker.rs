//! # SubjectWorker: timer and retry loop of a single subject.
//!
//! One worker runs per relevant subject. It walks the subject's [`FirePlan`],
//! publishes announcements with bounded retry, forwards the grant revocation,
//! and then waits for the manager. A notice from the manager pre-empts whatever
//! the worker is doing at that moment.
//!
//! ## States
//! ```text
//!            ┌──────────── success, steps left ────────────┐
//!            ▼                                             │
//! start ─► Armed ── timer ──► Firing ── publish ok ────────┘
//!            │                  │  └─ ok, no steps left ───────► Parked
//!            │                  └─ failure ──► RetryWait ──┐
//!            │                                   │  ▲      │
//!            │                                   │  └──────┘ delay elapsed
//!            │                                   └─ past max_timeout: abandon
//!            │                                      (continue with next step)
//!            └─ deletion notice (any state, Parked included)
//!                   ─► [Deleted announcement] ─► Terminated
//! ```
//!
//! ## Rules
//! - Attempts of one step run **sequentially**; the counter resets per step
//! - Retry delay for failed attempt `n` is `backoff.next(n - 1)`
//! - A step is abandoned when `time since its scheduled instant + delay > max_timeout`
//!   or the publisher rejected the announcement
//! - Revocation is forwarded once, never retried
//! - A worker whose plan is done (or empty) stays parked until a notice arrives,
//!   so it terminates only once its subject leaves the policy
//! - The `Deleted` announcement is best-effort: one attempt, not pre-emptible

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::announce::{
    Announcement, AnnouncementKind, AnnouncementPublisher, CommandForwarder, SubjectCommand,
};
use crate::core::plan::{FirePlan, Step, StepKind};
use crate::core::registry::WorkerId;
use crate::events::{Bus, Event, EventKind};
use crate::policies::BackoffPolicy;
use crate::subjects::{PolicyId, Subject};

/// Upper bound used when a deadline does not fit into the monotonic clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Notice delivered by the manager to a worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Notice {
    /// The subject was removed from the policy (or the manager shuts down).
    Deleted,
    /// The subject changed; a fresh worker takes over, this one leaves silently.
    Replaced,
}

/// Manager-side handle used to deliver a [`Notice`].
#[derive(Clone, Debug, Default)]
pub(crate) struct WorkerNotice {
    deleted: CancellationToken,
    replaced: CancellationToken,
}

impl WorkerNotice {
    pub(crate) fn delete(&self) {
        self.deleted.cancel();
    }

    pub(crate) fn replace(&self) {
        self.replaced.cancel();
    }

    /// Resolves once a notice was delivered; deletion wins over replacement.
    pub(crate) async fn wait(&self) -> Notice {
        tokio::select! {
            biased;
            _ = self.deleted.cancelled() => Notice::Deleted,
            _ = self.replaced.cancelled() => Notice::Replaced,
        }
    }
}

/// Why a worker reached its terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WorkerExit {
    /// A deletion notice arrived.
    Deleted,
    /// The subject changed and a new worker took over.
    Replaced,
    /// The worker task panicked.
    Panicked,
    /// The worker task was aborted.
    Aborted,
}

impl WorkerExit {
    pub(crate) fn as_label(&self) -> &'static str {
        match self {
            WorkerExit::Deleted => "deleted",
            WorkerExit::Replaced => "replaced",
            WorkerExit::Panicked => "worker_panic",
            WorkerExit::Aborted => "worker_aborted",
        }
    }
}

/// Parameters every worker of one manager shares.
#[derive(Clone, Copy, Debug)]
pub(crate) struct WorkerParams {
    pub(crate) grace_period: Duration,
    pub(crate) max_timeout: Duration,
    pub(crate) backoff: BackoffPolicy,
    pub(crate) expire_grants: bool,
}

/// Wall clock anchored to the runtime's monotonic clock.
///
/// Deadlines are derived from the monotonic clock so that timers follow
/// tokio's time source, including paused time in tests.
#[derive(Clone, Copy, Debug)]
struct Clock {
    wall: DateTime<Utc>,
    mono: Instant,
}

impl Clock {
    fn start() -> Self {
        Self {
            wall: Utc::now(),
            mono: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        TimeDelta::from_std(self.mono.elapsed())
            .ok()
            .and_then(|d| self.wall.checked_add_signed(d))
            .unwrap_or(self.wall)
    }

    fn deadline(&self, at: DateTime<Utc>) -> Instant {
        match (at - self.wall).to_std() {
            Ok(ahead) => self
                .mono
                .checked_add(ahead)
                .unwrap_or_else(|| self.mono + FAR_FUTURE),
            // already due
            Err(_) => self.mono,
        }
    }
}

/// Timer/retry state machine of one subject.
pub(crate) struct SubjectWorker {
    id: WorkerId,
    policy: PolicyId,
    subject: Subject,
    params: WorkerParams,
    publisher: Arc<dyn AnnouncementPublisher>,
    forwarder: Arc<dyn CommandForwarder>,
    bus: Bus,
}

impl SubjectWorker {
    pub(crate) fn new(
        id: WorkerId,
        policy: PolicyId,
        subject: Subject,
        params: WorkerParams,
        publisher: Arc<dyn AnnouncementPublisher>,
        forwarder: Arc<dyn CommandForwarder>,
        bus: Bus,
    ) -> Self {
        Self {
            id,
            policy,
            subject,
            params,
            publisher,
            forwarder,
            bus,
        }
    }

    /// Runs the plan, then parks until a notice arrives.
    pub(crate) async fn run(self, notice: WorkerNotice) -> WorkerExit {
        let clock = Clock::start();
        let mut plan = FirePlan::compute(
            &self.subject,
            clock.now(),
            self.params.grace_period,
            self.params.expire_grants,
        );

        while let Some(step) = plan.pop() {
            if let Err(n) = self.run_step(&clock, step, &notice).await {
                return self.on_notice(&clock, n).await;
            }
        }

        debug!(
            policy = %self.policy,
            subject = %self.subject.id,
            worker = %self.id,
            "fire plan done, parked until notice"
        );
        let n = notice.wait().await;
        self.on_notice(&clock, n).await
    }

    /// Armed → Firing for a single step.
    async fn run_step(
        &self,
        clock: &Clock,
        step: Step,
        notice: &WorkerNotice,
    ) -> Result<(), Notice> {
        let mut armed = self.event(EventKind::WorkerArmed).with_due(step.at);
        if let Some(kind) = step.kind.announcement() {
            armed = armed.with_announcement(kind);
        }
        self.bus.publish(armed);

        tokio::select! {
            biased;
            n = notice.wait() => return Err(n),
            _ = time::sleep_until(clock.deadline(step.at)) => {}
        }

        match step.kind {
            StepKind::Announce(kind) => self.announce(clock, kind, step.at, notice).await,
            StepKind::Revoke => self.revoke(notice).await,
        }
    }

    /// Firing ⇄ RetryWait until published, abandoned, or pre-empted.
    async fn announce(
        &self,
        clock: &Clock,
        kind: AnnouncementKind,
        trigger: DateTime<Utc>,
        notice: &WorkerNotice,
    ) -> Result<(), Notice> {
        let announcement = self.announcement(kind, trigger);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let res = tokio::select! {
                biased;
                n = notice.wait() => return Err(n),
                res = self.publisher.publish(&announcement) => res,
            };

            let err = match res {
                Ok(()) => {
                    self.bus.publish(
                        self.event(EventKind::AnnouncementPublished)
                            .with_announcement(kind)
                            .with_attempt(attempt),
                    );
                    return Ok(());
                }
                Err(e) => e,
            };

            self.bus.publish(
                self.event(EventKind::AnnouncementFailed)
                    .with_announcement(kind)
                    .with_attempt(attempt)
                    .with_reason(err.to_string()),
            );

            let delay = self.params.backoff.next(attempt - 1);
            let overdue = (clock.now() - trigger).to_std().unwrap_or_default();
            let exhausted = overdue.saturating_add(delay) > self.params.max_timeout;
            if !err.is_retryable() || exhausted {
                let reason = if exhausted {
                    format!("max timeout {:?} exceeded: {err}", self.params.max_timeout)
                } else {
                    err.to_string()
                };
                warn!(
                    policy = %self.policy,
                    subject = %self.subject.id,
                    announcement = kind.as_label(),
                    attempt,
                    publisher = self.publisher.name(),
                    "giving up on announcement: {reason}"
                );
                self.bus.publish(
                    self.event(EventKind::AnnouncementAbandoned)
                        .with_announcement(kind)
                        .with_attempt(attempt)
                        .with_reason(reason),
                );
                return Ok(());
            }

            self.bus.publish(
                self.event(EventKind::BackoffScheduled)
                    .with_announcement(kind)
                    .with_attempt(attempt)
                    .with_delay(delay)
                    .with_reason(err.as_label()),
            );

            tokio::select! {
                biased;
                n = notice.wait() => return Err(n),
                _ = time::sleep(delay) => {}
            }
        }
    }

    /// Forwards the grant removal once.
    async fn revoke(&self, notice: &WorkerNotice) -> Result<(), Notice> {
        let command = SubjectCommand::DeleteExpiredSubject {
            policy_id: self.policy.clone(),
            subject_id: self.subject.id.clone(),
        };
        let res = tokio::select! {
            biased;
            n = notice.wait() => return Err(n),
            res = self.forwarder.forward(command) => res,
        };

        match res {
            Ok(()) => {
                debug!(policy = %self.policy, subject = %self.subject.id, "expired subject revoked");
                self.bus.publish(self.event(EventKind::RevocationForwarded));
            }
            Err(e) => {
                warn!(
                    policy = %self.policy,
                    subject = %self.subject.id,
                    forwarder = self.forwarder.name(),
                    "failed to forward revocation: {e}"
                );
                self.bus
                    .publish(self.event(EventKind::RevocationFailed).with_reason(e.to_string()));
            }
        }
        Ok(())
    }

    async fn on_notice(&self, clock: &Clock, notice: Notice) -> WorkerExit {
        match notice {
            Notice::Replaced => WorkerExit::Replaced,
            Notice::Deleted => {
                if self.subject.announcement_or_default().when_deleted {
                    self.announce_deleted(clock.now()).await;
                }
                WorkerExit::Deleted
            }
        }
    }

    /// Single best-effort attempt, no retry.
    async fn announce_deleted(&self, trigger: DateTime<Utc>) {
        let kind = AnnouncementKind::Deleted;
        match self
            .publisher
            .publish(&self.announcement(kind, trigger))
            .await
        {
            Ok(()) => self.bus.publish(
                self.event(EventKind::AnnouncementPublished)
                    .with_announcement(kind)
                    .with_attempt(1),
            ),
            Err(e) => {
                warn!(
                    policy = %self.policy,
                    subject = %self.subject.id,
                    publisher = self.publisher.name(),
                    "failed to announce subject deletion: {e}"
                );
                self.bus.publish(
                    self.event(EventKind::AnnouncementFailed)
                        .with_announcement(kind)
                        .with_attempt(1)
                        .with_reason(e.to_string()),
                );
            }
        }
    }

    fn announcement(&self, kind: AnnouncementKind, trigger: DateTime<Utc>) -> Announcement {
        Announcement {
            policy_id: self.policy.clone(),
            subject_id: self.subject.id.clone(),
            kind,
            trigger,
        }
    }

    fn event(&self, kind: EventKind) -> Event {
        Event::new(kind)
            .with_subject(&self.subject.id)
            .with_worker(self.id)
    }
}
