mod common;

use std::time::Duration;

use common::*;
use expiryvisor::{AnnouncementKind, EventKind, SchedulerConfig, SubjectCommand};

#[tokio::test(start_paused = true)]
async fn failed_publishes_back_off_exponentially() {
    let publisher = RecordingPublisher::new(Mode::FailFirst(3));
    let manager = spawn(config(), publisher.clone(), RecordingForwarder::new());
    let mut events = manager.subscribe();

    manager
        .apply_snapshot(snapshot(vec![expiring("a", 2, announce(None, true, false))]))
        .await
        .unwrap();

    let mut delays = Vec::new();
    loop {
        let ev = next_of(&mut events, EventKind::BackoffScheduled).await;
        delays.push(ev.delay().unwrap());
        if delays.len() == 3 {
            break;
        }
    }
    assert_eq!(
        delays,
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4)
        ]
    );

    let published = next_of(&mut events, EventKind::AnnouncementPublished).await;
    assert_eq!(published.attempt, Some(4));
    assert_eq!(published.announcement, Some(AnnouncementKind::Expired));
    assert_eq!(publisher.count(AnnouncementKind::Expired), 4);
}

#[tokio::test(start_paused = true)]
async fn gives_up_past_max_timeout_and_still_revokes() {
    let cfg = SchedulerConfig {
        max_timeout: Duration::from_secs(20),
        ..config()
    };
    let publisher = RecordingPublisher::new(Mode::AlwaysFail);
    let forwarder = RecordingForwarder::new();
    let manager = spawn(cfg, publisher.clone(), forwarder.clone());
    let mut events = manager.subscribe();

    manager
        .apply_snapshot(snapshot(vec![expiring("a", 2, announce(None, true, false))]))
        .await
        .unwrap();

    // attempts at +0, +1, +3, +7, +15; the next delay (10s) would end at +25
    let abandoned = next_of(&mut events, EventKind::AnnouncementAbandoned).await;
    assert_eq!(abandoned.attempt, Some(5));
    assert_eq!(publisher.count(AnnouncementKind::Expired), 5);

    next_of(&mut events, EventKind::RevocationForwarded).await;
    assert_eq!(forwarder.commands().len(), 1);

    // the worker stays registered until the revoked subject leaves the policy
    assert_eq!(manager.registry().await.unwrap().subjects, vec![id("a")]);
    manager.apply_snapshot(snapshot(vec![])).await.unwrap();
    let terminated = next_of(&mut events, EventKind::WorkerTerminated).await;
    assert_eq!(terminated.reason.as_deref(), Some("deleted"));
    next_of(&mut events, EventKind::WorkerReclaimed).await;
    assert!(manager.registry().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn overdue_expiry_is_not_retried_past_the_ceiling() {
    let publisher = RecordingPublisher::new(Mode::AlwaysFail);
    let manager = spawn(config(), publisher.clone(), RecordingForwarder::new());
    let mut events = manager.subscribe();

    // expired two hours ago; the 1h ceiling already elapsed
    manager
        .apply_snapshot(snapshot(vec![expiring("a", -7_200, announce(None, true, false))]))
        .await
        .unwrap();

    let abandoned = next_of(&mut events, EventKind::AnnouncementAbandoned).await;
    assert_eq!(abandoned.attempt, Some(1));
    assert_eq!(publisher.count(AnnouncementKind::Expired), 1);
}

#[tokio::test(start_paused = true)]
async fn deletion_during_retry_wait_announces_once() {
    let publisher = RecordingPublisher::new(Mode::AlwaysFail);
    let manager = spawn(config(), publisher.clone(), RecordingForwarder::new());
    let mut events = manager.subscribe();

    manager
        .apply_snapshot(snapshot(vec![expiring("a", 1, announce(None, true, true))]))
        .await
        .unwrap();
    next_of(&mut events, EventKind::BackoffScheduled).await;

    manager.apply_snapshot(snapshot(vec![])).await.unwrap();
    let terminated = next_of(&mut events, EventKind::WorkerTerminated).await;
    assert_eq!(terminated.reason.as_deref(), Some("deleted"));

    // one failed expiry attempt, one best-effort deletion, no retries after the notice
    assert_eq!(publisher.count(AnnouncementKind::Expired), 1);
    assert_eq!(publisher.count(AnnouncementKind::Deleted), 1);
}

#[tokio::test(start_paused = true)]
async fn expired_grant_is_revoked_after_grace_period() {
    let publisher = RecordingPublisher::ok();
    let forwarder = RecordingForwarder::new();
    let manager = spawn(config(), publisher.clone(), forwarder.clone());
    let mut events = manager.subscribe();

    let subject = expiring("a", 120, announce(Some(60), true, false));
    let expiry = subject.expiry.unwrap();
    manager.apply_snapshot(snapshot(vec![subject])).await.unwrap();

    next_of(&mut events, EventKind::RevocationForwarded).await;

    let kinds: Vec<_> = publisher.announcements().iter().map(|a| a.kind).collect();
    assert_eq!(
        kinds,
        vec![AnnouncementKind::BeforeExpiry, AnnouncementKind::Expired]
    );
    let triggers: Vec<_> = publisher
        .announcements()
        .iter()
        .map(|a| a.trigger)
        .collect();
    assert_eq!(triggers, vec![expiry - chrono::TimeDelta::seconds(60), expiry]);

    assert_eq!(
        forwarder.commands(),
        vec![SubjectCommand::DeleteExpiredSubject {
            policy_id: policy(),
            subject_id: id("a"),
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn grants_survive_when_revocation_is_disabled() {
    let cfg = SchedulerConfig {
        expire_grants: false,
        ..config()
    };
    let forwarder = RecordingForwarder::new();
    let manager = spawn(cfg, RecordingPublisher::ok(), forwarder.clone());
    let mut events = manager.subscribe();

    manager
        .apply_snapshot(snapshot(vec![expiring("a", 5, announce(None, true, false))]))
        .await
        .unwrap();
    next_of(&mut events, EventKind::AnnouncementPublished).await;

    tokio::time::sleep(Duration::from_secs(86_400)).await;
    assert!(forwarder.commands().is_empty());
    assert_eq!(manager.registry().await.unwrap().subjects, vec![id("a")]);
    assert!(
        !drain(&mut events)
            .iter()
            .any(|e| e.kind == EventKind::WorkerTerminated)
    );
}

#[tokio::test(start_paused = true)]
async fn panicking_worker_is_reclaimed() {
    let manager = spawn(
        config(),
        RecordingPublisher::new(Mode::Panic),
        RecordingForwarder::new(),
    );
    let mut events = manager.subscribe();

    manager
        .apply_snapshot(snapshot(vec![expiring("a", 1, announce(None, true, false))]))
        .await
        .unwrap();

    let terminated = next_of(&mut events, EventKind::WorkerTerminated).await;
    assert_eq!(terminated.reason.as_deref(), Some("worker_panic"));
    next_of(&mut events, EventKind::WorkerReclaimed).await;
    assert!(manager.registry().await.unwrap().is_empty());
}
