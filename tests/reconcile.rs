mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};

use common::*;
use expiryvisor::{
    AnnouncementKind, Event, EventKind, LifecycleManager, PolicyId, PolicyLifecycle,
    PolicySnapshot, RuntimeError, SchedulerConfig, Subject, SubmitError, Subscribe,
};

#[tokio::test(start_paused = true)]
async fn only_relevant_subjects_get_workers() {
    let publisher = RecordingPublisher::ok();
    let manager = spawn(config(), publisher.clone(), RecordingForwarder::new());
    let mut events = manager.subscribe();

    let a = expiring("a", 3_600, announce(None, false, true));
    let b = Subject::new(id("b"));
    manager.apply_snapshot(snapshot(vec![a, b.clone()])).await.unwrap();

    let view = manager.registry().await.unwrap();
    assert_eq!(view.subjects, vec![id("a")]);

    // A removed, B still irrelevant
    manager.apply_snapshot(snapshot(vec![b])).await.unwrap();
    let notice = next_of(&mut events, EventKind::DeletionNoticeSent).await;
    assert_eq!(notice.subject, Some(id("a")));

    let reclaimed = next_of(&mut events, EventKind::WorkerReclaimed).await;
    assert_eq!(reclaimed.subject, Some(id("a")));
    assert!(manager.registry().await.unwrap().is_empty());
    assert_eq!(publisher.count(AnnouncementKind::Deleted), 1);
}

#[tokio::test(start_paused = true)]
async fn replaying_a_snapshot_is_a_noop() {
    let manager = spawn(config(), RecordingPublisher::ok(), RecordingForwarder::new());
    let mut events = manager.subscribe();

    let snap = snapshot(vec![
        expiring("a", 3_600, announce(Some(60), true, true)),
        expiring("b", 7_200, announce(None, true, false)),
    ]);
    manager.apply_snapshot(snap.clone()).await.unwrap();
    let first = manager.registry().await.unwrap();
    let spawned = drain(&mut events)
        .iter()
        .filter(|e| e.kind == EventKind::WorkerSpawned)
        .count();
    assert_eq!(spawned, 2);

    manager.apply_snapshot(snap).await.unwrap();
    assert_eq!(manager.registry().await.unwrap(), first);

    let replay = drain(&mut events);
    assert!(!replay.iter().any(|e| matches!(
        e.kind,
        EventKind::WorkerSpawned | EventKind::DeletionNoticeSent | EventKind::WorkerReplaced
    )));
    let applied = replay
        .iter()
        .find(|e| e.kind == EventKind::SnapshotApplied)
        .unwrap();
    assert_eq!(applied.reason.as_deref(), Some("added=0 removed=0 changed=0"));
}

#[tokio::test(start_paused = true)]
async fn replay_after_expiry_keeps_the_parked_worker() {
    let cfg = SchedulerConfig {
        expire_grants: false,
        ..config()
    };
    let publisher = RecordingPublisher::ok();
    let manager = spawn(cfg, publisher.clone(), RecordingForwarder::new());
    let mut events = manager.subscribe();

    let snap = snapshot(vec![expiring("a", 2, announce(None, true, true))]);
    manager.apply_snapshot(snap.clone()).await.unwrap();
    next_of(&mut events, EventKind::AnnouncementPublished).await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    let before = manager.registry().await.unwrap();
    assert_eq!(before.subjects, vec![id("a")]);
    drain(&mut events);

    manager.apply_snapshot(snap).await.unwrap();
    assert_eq!(manager.registry().await.unwrap(), before);
    assert!(
        !drain(&mut events)
            .iter()
            .any(|e| e.kind == EventKind::WorkerSpawned)
    );
    assert_eq!(publisher.count(AnnouncementKind::Expired), 1);
}

#[tokio::test(start_paused = true)]
async fn subject_removed_after_its_plan_ran_is_announced_deleted() {
    let publisher = RecordingPublisher::ok();
    let manager = spawn(config(), publisher.clone(), RecordingForwarder::new());
    let mut events = manager.subscribe();

    manager
        .apply_snapshot(snapshot(vec![expiring("a", 2, announce(None, true, true))]))
        .await
        .unwrap();
    next_of(&mut events, EventKind::RevocationForwarded).await;
    assert_eq!(publisher.count(AnnouncementKind::Deleted), 0);

    manager.apply_snapshot(snapshot(vec![])).await.unwrap();
    let terminated = next_of(&mut events, EventKind::WorkerTerminated).await;
    assert_eq!(terminated.reason.as_deref(), Some("deleted"));
    next_of(&mut events, EventKind::WorkerReclaimed).await;

    assert!(manager.registry().await.unwrap().is_empty());
    assert_eq!(publisher.count(AnnouncementKind::Expired), 1);
    assert_eq!(publisher.count(AnnouncementKind::Deleted), 1);
}

#[tokio::test(start_paused = true)]
async fn deletion_only_subject_is_not_respawned() {
    let cfg = SchedulerConfig {
        expire_grants: false,
        ..config()
    };
    let publisher = RecordingPublisher::ok();
    let manager = spawn(cfg, publisher.clone(), RecordingForwarder::new());
    let mut events = manager.subscribe();

    let snap = snapshot(vec![expiring("a", 3_600, announce(None, false, true))]);
    manager.apply_snapshot(snap.clone()).await.unwrap();
    manager.apply_snapshot(snap.clone()).await.unwrap();
    manager.apply_snapshot(snap).await.unwrap();
    tokio::time::sleep(Duration::from_secs(7_200)).await;

    let spawned = drain(&mut events)
        .iter()
        .filter(|e| e.kind == EventKind::WorkerSpawned)
        .count();
    assert_eq!(spawned, 1);
    assert_eq!(manager.registry().await.unwrap().subjects, vec![id("a")]);

    manager.apply_snapshot(snapshot(vec![])).await.unwrap();
    next_of(&mut events, EventKind::WorkerReclaimed).await;
    assert_eq!(publisher.count(AnnouncementKind::Deleted), 1);
}

#[tokio::test(start_paused = true)]
async fn inactive_policy_tears_every_worker_down() {
    let publisher = RecordingPublisher::ok();
    let manager = spawn(config(), publisher.clone(), RecordingForwarder::new());
    let mut events = manager.subscribe();

    let subjects = vec![
        expiring("a", 3_600, announce(None, false, true)),
        expiring("b", 3_600, announce(None, false, true)),
        expiring("c", 3_600, announce(None, false, false)),
    ];
    manager.apply_snapshot(snapshot(subjects.clone())).await.unwrap();
    assert_eq!(manager.registry().await.unwrap().len(), 3);

    let deleted = snapshot(subjects).with_lifecycle(PolicyLifecycle::Deleted);
    manager.apply_snapshot(deleted).await.unwrap();
    for _ in 0..3 {
        next_of(&mut events, EventKind::WorkerReclaimed).await;
    }

    assert!(manager.registry().await.unwrap().is_empty());
    assert_eq!(publisher.count(AnnouncementKind::Deleted), 2);
}

#[tokio::test(start_paused = true)]
async fn repeated_termination_signal_is_ignored() {
    let manager = spawn(config(), RecordingPublisher::ok(), RecordingForwarder::new());
    let mut events = manager.subscribe();

    manager
        .apply_snapshot(snapshot(vec![
            expiring("a", 3_600, announce(None, true, false)),
            expiring("b", 3_600, announce(None, true, false)),
        ]))
        .await
        .unwrap();
    manager
        .apply_snapshot(snapshot(vec![expiring("b", 3_600, announce(None, true, false))]))
        .await
        .unwrap();

    let reclaimed = next_of(&mut events, EventKind::WorkerReclaimed).await;
    let gone = reclaimed.worker.unwrap();

    manager.worker_terminated(gone).await.unwrap();
    manager.worker_terminated(gone).await.unwrap();

    let view = manager.registry().await.unwrap();
    assert_eq!(view.subjects, vec![id("b")]);
    assert_eq!(view.retiring, 0);
}

#[tokio::test(start_paused = true)]
async fn changed_expiry_replaces_the_worker_silently() {
    let publisher = RecordingPublisher::ok();
    let manager = spawn(config(), publisher.clone(), RecordingForwarder::new());
    let mut events = manager.subscribe();

    let ann = announce(None, true, true);
    manager
        .apply_snapshot(snapshot(vec![expiring("a", 3_600, ann)]))
        .await
        .unwrap();
    let first = next_of(&mut events, EventKind::WorkerSpawned).await.worker;

    let extended = Subject::new(id("a"))
        .with_expiry(Utc::now() + TimeDelta::hours(2))
        .with_announcement(ann);
    manager.apply_snapshot(snapshot(vec![extended])).await.unwrap();

    let replaced = next_of(&mut events, EventKind::WorkerReplaced).await;
    assert_eq!(replaced.worker, first);
    let second = next_of(&mut events, EventKind::WorkerSpawned).await.worker;
    assert_ne!(second, first);

    let reclaimed = next_of(&mut events, EventKind::WorkerReclaimed).await;
    assert_eq!(reclaimed.worker, first);
    assert_eq!(manager.registry().await.unwrap().subjects, vec![id("a")]);
    assert_eq!(publisher.count(AnnouncementKind::Deleted), 0);
}

#[tokio::test(start_paused = true)]
async fn snapshot_of_another_policy_is_ignored() {
    let manager = spawn(config(), RecordingPublisher::ok(), RecordingForwarder::new());
    let mut events = manager.subscribe();

    let foreign = PolicySnapshot::new(PolicyId::new("org.example:other"))
        .with_entry("DEFAULT", vec![expiring("a", 60, announce(None, true, false))]);
    manager.apply_snapshot(foreign).await.unwrap();

    let ignored = next_of(&mut events, EventKind::SnapshotIgnored).await;
    assert_eq!(ignored.reason.as_deref(), Some("org.example:other"));
    assert!(manager.registry().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_reclaims_every_worker() {
    let publisher = RecordingPublisher::ok();
    let manager = spawn(config(), publisher.clone(), RecordingForwarder::new());
    let mut events = manager.subscribe();

    let subjects = (0..10)
        .map(|i| expiring(&format!("s{i}"), 3_600, announce(None, false, true)))
        .collect();
    manager.apply_snapshot(snapshot(subjects)).await.unwrap();

    manager.shutdown().await.unwrap();
    next_of(&mut events, EventKind::AllStoppedWithin).await;
    assert_eq!(publisher.count(AnnouncementKind::Deleted), 10);

    assert!(matches!(
        manager.registry().await,
        Err(RuntimeError::ManagerGone)
    ));
    assert_eq!(
        manager.apply_snapshot(snapshot(vec![])).await,
        Err(SubmitError::Closed)
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_aborts_workers_past_the_grace() {
    let manager = spawn(
        config(),
        RecordingPublisher::new(Mode::HangOnDeleted),
        RecordingForwarder::new(),
    );
    manager
        .apply_snapshot(snapshot(vec![
            expiring("stuck", 3_600, announce(None, false, true)),
            expiring("quiet", 3_600, announce(None, false, false)),
        ]))
        .await
        .unwrap();

    match manager.shutdown().await {
        Err(RuntimeError::GraceExceeded { stuck, grace }) => {
            assert_eq!(stuck, vec![id("stuck").to_string()]);
            assert_eq!(grace, config().shutdown_grace);
        }
        other => panic!("expected grace exceeded, got {other:?}"),
    }
}

#[tokio::test]
async fn full_inbox_rejects_without_waiting() {
    let cfg = SchedulerConfig {
        inbox_capacity: 1,
        ..config()
    };
    let manager = spawn(cfg, RecordingPublisher::ok(), RecordingForwarder::new());

    // the manager task has not been polled yet on this single-threaded runtime
    assert_eq!(manager.try_apply_snapshot(snapshot(vec![])), Ok(()));
    assert_eq!(
        manager.try_apply_snapshot(snapshot(vec![])),
        Err(SubmitError::Full)
    );
    manager.shutdown().await.unwrap();
}

struct Counting(Arc<AtomicUsize>);

#[async_trait]
impl Subscribe for Counting {
    async fn on_event(&self, event: &Event) {
        if event.kind == EventKind::WorkerSpawned {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

#[tokio::test(start_paused = true)]
async fn subscribers_see_events_before_shutdown_returns() {
    let spawned = Arc::new(AtomicUsize::new(0));
    let manager = LifecycleManager::builder(policy(), config())
        .with_publisher(RecordingPublisher::ok())
        .with_subscribers(vec![Arc::new(Counting(spawned.clone()))])
        .spawn();

    manager
        .apply_snapshot(snapshot(vec![
            expiring("a", 3_600, announce(None, true, false)),
            expiring("b", 3_600, announce(None, true, false)),
        ]))
        .await
        .unwrap();
    manager.shutdown().await.unwrap();

    assert_eq!(spawned.load(Ordering::SeqCst), 2);
}
