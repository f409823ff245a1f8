//! # expiryvisor
//!
//! **Expiryvisor** supervises the lifecycle of time-bounded access grants.
//!
//! For one policy, a [`LifecycleManager`] keeps exactly one live worker per subject
//! that carries an expiry or an announcement configuration. It reconciles that
//! worker population against incoming policy snapshots. Each worker announces the
//! upcoming expiry, the expiry itself, and the subject's deletion with bounded
//! retry, then revokes the grant once the grace period is over.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │PolicySnapshot│   │PolicySnapshot│   │PolicySnapshot│
//!     │  (rev. 1)    │   │  (rev. 2)    │   │  (rev. 3)    │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  LifecycleManager (one per policy, single task)                   │
//! │  - relevant_subjects(snapshot) ─► diff(previous, current)         │
//! │  - WorkerRegistry (SubjectId ⇄ WorkerId)                          │
//! │  - Bus (broadcast events) + SubscriberSet (fans out to subs)      │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼ spawn            ▼ spawn            ▼ notice        │
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   │
//!     │SubjectWorker │   │SubjectWorker │   │SubjectWorker │   │
//!     │ (timer/retry)│   │ (timer/retry)│   │  (deleted)   │   │
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘   │
//!      │ publish()        │ forward()        │ publish()       │
//!      ▼                  ▼                  ▼                 │
//!  AnnouncementPublisher  CommandForwarder   (Deleted)         │
//!      │                  │                  │                 │
//!      └──────────── WorkerTerminated ───────┴─────────────────┘
//!                        (registry entry reclaimed)
//! ```
//!
//! ### Worker lifecycle
//! ```text
//! plan = [BeforeExpiry @ expiry - before]? [Expired @ expiry]? [Revoke @ expiry + grace]?
//!
//! for step in plan {
//!   ├─► Armed: sleep until step instant (pre-empted by a notice)
//!   ├─► Firing:
//!   │     ├─ Announce ─► publish(announcement)
//!   │     │     ├─ Ok  ─► next step
//!   │     │     └─ Err ─► delay = backoff.next(attempt)
//!   │     │               ├─ elapsed + delay > max_timeout ─► AnnouncementAbandoned, next step
//!   │     │               └─ BackoffScheduled ─► RetryWait ─► Firing
//!   │     └─ Revoke ─► forward(DeleteExpiredSubject) once
//! }
//! plan done, or no expiry ─► parked until notice
//! deletion notice ─► publish(Deleted) once (if configured) ─► Terminated
//! ```
//!
//! ## Features
//! | Area               | Description                                                  | Key types / traits                                  |
//! |--------------------|--------------------------------------------------------------|-----------------------------------------------------|
//! | **Supervision**    | Reconcile workers against policy snapshots.                  | [`LifecycleManager`], [`ManagerHandle`]             |
//! | **Normalization**  | Round expiries up to a granularity.                          | [`normalize`], [`adjust_expiry`], [`Granularity`]   |
//! | **Reconciliation** | Relevant-subject sets and their difference.                  | [`relevant_subjects`], [`diff`]                     |
//! | **Collaborators**  | Where announcements and revocations go.                      | [`AnnouncementPublisher`], [`CommandForwarder`]     |
//! | **Policies**       | Retry delays for failed announcements.                       | [`BackoffPolicy`], [`JitterPolicy`]                 |
//! | **Subscriber API** | Hook into lifecycle events (logging, metrics, tests).        | [`Subscribe`], [`LogWriter`]                        |
//! | **Configuration**  | Defaults, TOML file, `EXPIRYVISOR_*` environment.            | [`SchedulerConfig`]                                 |
//! | **Errors**         | Typed errors with stable labels.                             | [`DeliveryError`], [`RuntimeError`], [`ConfigError`]|
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use chrono::Utc;
//! use expiryvisor::{
//!     Announcement, DeliveryError, LifecycleManager, LogWriter, PolicyId, PolicySnapshot,
//!     PublisherFn, SchedulerConfig, Subject, SubjectAnnouncement, SubjectId, Subscribe,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = SchedulerConfig::default();
//!     let policy = PolicyId::new("org.example:fleet");
//!
//!     let publisher = PublisherFn::arc("stdout", |a: Announcement| async move {
//!         println!("{} {} at {}", a.kind, a.subject_id, a.trigger);
//!         Ok::<_, DeliveryError>(())
//!     });
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!
//!     let manager = LifecycleManager::builder(policy.clone(), cfg.clone())
//!         .with_publisher(publisher)
//!         .with_subscribers(subs)
//!         .spawn();
//!
//!     let subject = Subject::new(SubjectId::new("integration", "device-42"))
//!         .with_expiry(Utc::now() + chrono::TimeDelta::hours(1))
//!         .with_adjusted_expiry(cfg.granularity, Utc::now())?
//!         .with_announcement(SubjectAnnouncement {
//!             before_expiry: Some(Duration::from_secs(300)),
//!             when_expired: true,
//!             when_deleted: true,
//!         });
//!
//!     manager
//!         .apply_snapshot(PolicySnapshot::new(policy).with_entry("DEVICES", vec![subject]))
//!         .await?;
//!     assert_eq!(manager.registry().await?.len(), 1);
//!
//!     manager.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod announce;
mod config;
mod core;
mod duration;
mod error;
mod events;
mod expiry;
mod policies;
mod subjects;
mod subscribers;

// ---- Public re-exports ----

pub use announce::{
    Announcement, AnnouncementKind, AnnouncementPublisher, CommandForwarder, ForwarderFn,
    NoopForwarder, NoopPublisher, PublisherFn, SubjectCommand,
};
pub use config::{ENV_PREFIX, SchedulerConfig};
pub use crate::core::{LifecycleManager, ManagerBuilder, ManagerHandle, RegistryView, WorkerId};
pub use duration::{ParseDurationError, format_duration, parse_duration};
pub use error::{ConfigError, DeliveryError, ExpiryError, RuntimeError, SubmitError};
pub use events::{Bus, Event, EventKind};
pub use expiry::{Granularity, GranularityError, adjust_expiry, normalize};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use subjects::{
    PolicyEntry, PolicyId, PolicyLifecycle, PolicySnapshot, Subject, SubjectAnnouncement,
    SubjectDiff, SubjectId, diff, relevant_subjects,
};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
