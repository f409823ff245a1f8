//! # LogWriter: events to `tracing`
//!
//! A subscriber that renders every [`Event`] as a structured `tracing` record
//! under the `expiryvisor::events` target. Anomalies and failures are logged at
//! `warn`, lifecycle progress at `debug`, everything else at `info`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO  expiryvisor::events: worker spawned policy=ns:p subject=iss:alice worker=7
//! WARN  expiryvisor::events: announcement failed policy=ns:p subject=iss:alice announcement=before_expiry attempt=1 reason="broker down"
//! INFO  expiryvisor::events: backoff scheduled ... delay_ms=1000
//! ```

use async_trait::async_trait;
use tracing::{Level, debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn level(kind: EventKind) -> Level {
        match kind {
            EventKind::RegistryInconsistency
            | EventKind::AnnouncementFailed
            | EventKind::AnnouncementAbandoned
            | EventKind::RevocationFailed
            | EventKind::GraceExceeded
            | EventKind::SubscriberOverflow
            | EventKind::SubscriberPanicked
            | EventKind::SnapshotIgnored => Level::WARN,
            EventKind::WorkerArmed | EventKind::SnapshotApplied | EventKind::WorkerReclaimed => {
                Level::DEBUG
            }
            _ => Level::INFO,
        }
    }

    fn message(kind: EventKind) -> &'static str {
        match kind {
            EventKind::SnapshotApplied => "snapshot applied",
            EventKind::SnapshotIgnored => "snapshot ignored",
            EventKind::WorkerSpawned => "worker spawned",
            EventKind::DeletionNoticeSent => "deletion notice sent",
            EventKind::WorkerReplaced => "worker replaced",
            EventKind::RegistryInconsistency => "registry inconsistency",
            EventKind::WorkerReclaimed => "worker reclaimed",
            EventKind::WorkerArmed => "worker armed",
            EventKind::AnnouncementPublished => "announcement published",
            EventKind::AnnouncementFailed => "announcement failed",
            EventKind::BackoffScheduled => "backoff scheduled",
            EventKind::AnnouncementAbandoned => "announcement abandoned",
            EventKind::RevocationForwarded => "revocation forwarded",
            EventKind::RevocationFailed => "revocation failed",
            EventKind::WorkerTerminated => "worker terminated",
            EventKind::ShutdownRequested => "shutdown requested",
            EventKind::AllStoppedWithin => "all workers stopped within grace",
            EventKind::GraceExceeded => "shutdown grace exceeded",
            EventKind::SubscriberPanicked => "subscriber panicked",
            EventKind::SubscriberOverflow => "subscriber overflow",
        }
    }
}

macro_rules! emit {
    ($mac:ident, $e:expr, $msg:expr) => {
        $mac!(
            target: "expiryvisor::events",
            seq = $e.seq,
            policy = $e.policy.as_ref().map(|p| p.as_str()),
            subject = $e.subject.as_ref().map(|s| s.to_string()),
            worker = $e.worker.map(|w| w.get()),
            announcement = $e.announcement.map(|k| k.as_label()),
            attempt = $e.attempt,
            delay_ms = $e.delay_ms,
            due = $e.due.map(|d| d.to_rfc3339()),
            reason = $e.reason.as_deref(),
            "{}",
            $msg
        )
    };
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let msg = Self::message(e.kind);
        match Self::level(e.kind) {
            Level::WARN => emit!(warn, e, msg),
            Level::DEBUG => emit!(debug, e, msg),
            _ => emit!(info, e, msg),
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
