#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use tokio::sync::broadcast::{self, error::RecvError};

use expiryvisor::{
    Announcement, AnnouncementKind, AnnouncementPublisher, BackoffPolicy, CommandForwarder,
    DeliveryError, Event, EventKind, JitterPolicy, LifecycleManager, ManagerHandle, PolicyId,
    PolicySnapshot, SchedulerConfig, Subject, SubjectAnnouncement, SubjectCommand, SubjectId,
};

pub const POLICY: &str = "org.example:fleet";

/// How a [`RecordingPublisher`] answers.
#[derive(Clone, Copy, Debug)]
pub enum Mode {
    /// Fail the first `n` publishes, then succeed.
    FailFirst(u32),
    /// Never succeed.
    AlwaysFail,
    /// Succeed, except `Deleted` announcements which never complete.
    HangOnDeleted,
    /// Panic on the first publish.
    Panic,
}

pub struct RecordingPublisher {
    mode: Mode,
    calls: Mutex<u32>,
    log: Mutex<Vec<Announcement>>,
}

impl RecordingPublisher {
    pub fn new(mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            calls: Mutex::new(0),
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn ok() -> Arc<Self> {
        Self::new(Mode::FailFirst(0))
    }

    pub fn announcements(&self) -> Vec<Announcement> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, kind: AnnouncementKind) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.kind == kind)
            .count()
    }
}

#[async_trait]
impl AnnouncementPublisher for RecordingPublisher {
    async fn publish(&self, announcement: &Announcement) -> Result<(), DeliveryError> {
        self.log.lock().unwrap().push(announcement.clone());
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        match self.mode {
            Mode::FailFirst(n) if call <= n => Err(DeliveryError::failed("broker unavailable")),
            Mode::FailFirst(_) => Ok(()),
            Mode::AlwaysFail => Err(DeliveryError::failed("broker unavailable")),
            Mode::HangOnDeleted if announcement.kind == AnnouncementKind::Deleted => {
                std::future::pending().await
            }
            Mode::HangOnDeleted => Ok(()),
            Mode::Panic => panic!("publisher exploded"),
        }
    }

    fn name(&self) -> &str {
        "recording"
    }
}

#[derive(Default)]
pub struct RecordingForwarder {
    log: Mutex<Vec<SubjectCommand>>,
}

impl RecordingForwarder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn commands(&self) -> Vec<SubjectCommand> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandForwarder for RecordingForwarder {
    async fn forward(&self, command: SubjectCommand) -> Result<(), DeliveryError> {
        self.log.lock().unwrap().push(command);
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Deterministic config: no jitter, 1s/×2/10s backoff, 1h retry ceiling.
pub fn config() -> SchedulerConfig {
    SchedulerConfig {
        grace_period: Duration::from_secs(60),
        max_timeout: Duration::from_secs(3_600),
        backoff: BackoffPolicy {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: JitterPolicy::None,
        },
        shutdown_grace: Duration::from_secs(5),
        ..SchedulerConfig::default()
    }
}

pub fn policy() -> PolicyId {
    PolicyId::new(POLICY)
}

pub fn id(name: &str) -> SubjectId {
    SubjectId::new("integration", name)
}

/// Subject expiring `secs` from now with the given announcement flags.
pub fn expiring(name: &str, secs: i64, ann: SubjectAnnouncement) -> Subject {
    Subject::new(id(name))
        .with_expiry(Utc::now() + TimeDelta::seconds(secs))
        .with_announcement(ann)
}

pub fn announce(before_expiry: Option<u64>, when_expired: bool, when_deleted: bool) -> SubjectAnnouncement {
    SubjectAnnouncement {
        before_expiry: before_expiry.map(Duration::from_secs),
        when_expired,
        when_deleted,
    }
}

pub fn snapshot(subjects: Vec<Subject>) -> PolicySnapshot {
    PolicySnapshot::new(policy()).with_entry("DEFAULT", subjects)
}

pub fn spawn(
    cfg: SchedulerConfig,
    publisher: Arc<RecordingPublisher>,
    forwarder: Arc<RecordingForwarder>,
) -> ManagerHandle {
    LifecycleManager::builder(policy(), cfg)
        .with_publisher(publisher)
        .with_forwarder(forwarder)
        .spawn()
}

/// Receives events until one of `kind` arrives.
pub async fn next_of(rx: &mut broadcast::Receiver<Event>, kind: EventKind) -> Event {
    loop {
        match tokio::time::timeout(Duration::from_secs(7 * 86_400), rx.recv()).await {
            Ok(Ok(ev)) if ev.kind == kind => return ev,
            Ok(Ok(_)) | Ok(Err(RecvError::Lagged(_))) => continue,
            Ok(Err(RecvError::Closed)) => panic!("event bus closed while waiting for {kind:?}"),
            Err(_) => panic!("timed out waiting for {kind:?}"),
        }
    }
}

/// Drains every event currently buffered.
pub fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}
