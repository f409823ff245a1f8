//! # Example: Expiry demo
//!
//! Runs one lifecycle manager against a flaky in-memory broker:
//! - `alice` expires in a few seconds: before-expiry and expired announcements, then revocation
//! - `bob` has no expiry: only announced when removed from the policy
//! - the broker drops the first publishes, so the retry/backoff path is visible
//!
//! ```text
//! RUST_LOG=expiryvisor=debug cargo run --example expiry_demo
//! EXPIRYVISOR_GRACE_PERIOD=1s cargo run --example expiry_demo -- demo.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::{TimeDelta, Utc};

use expiryvisor::{
    Announcement, DeliveryError, ForwarderFn, LifecycleManager, LogWriter, PolicyId,
    PolicySnapshot, PublisherFn, SchedulerConfig, Subject, SubjectAnnouncement, SubjectCommand,
    SubjectId, Subscribe,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let path = std::env::args().nth(1).map(PathBuf::from);
    let mut cfg = SchedulerConfig::load(path.as_deref())?;
    if path.is_none() {
        cfg.grace_period = Duration::from_secs(2);
        cfg.granularity = "1s".parse()?;
        cfg.backoff.initial = Duration::from_millis(200);
        cfg.shutdown_grace = Duration::from_secs(2);
    }

    // the broker is down for the first three publishes
    let failures = Arc::new(AtomicU32::new(3));
    let publisher = PublisherFn::arc("flaky-broker", move |a: Announcement| {
        let failures = Arc::clone(&failures);
        async move {
            if failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(DeliveryError::failed("broker unavailable"));
            }
            println!("[broker] {} {} (trigger {})", a.kind, a.subject_id, a.trigger);
            Ok(())
        }
    });
    let forwarder = ForwarderFn::arc("policy-commands", |cmd: SubjectCommand| async move {
        println!("[policy] revoke {}", cmd.subject_id());
        Ok::<(), DeliveryError>(())
    });
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];

    let policy = PolicyId::new("org.example:fleet");
    let manager = LifecycleManager::builder(policy.clone(), cfg.clone())
        .with_publisher(publisher)
        .with_forwarder(forwarder)
        .with_subscribers(subs)
        .spawn();

    let now = Utc::now();
    let alice = Subject::new(SubjectId::new("integration", "alice"))
        .with_expiry(now + TimeDelta::seconds(4))
        .with_adjusted_expiry(cfg.granularity, now)?
        .with_announcement(SubjectAnnouncement {
            before_expiry: Some(Duration::from_secs(2)),
            when_expired: true,
            when_deleted: false,
        });
    let bob = Subject::new(SubjectId::new("integration", "bob")).with_announcement(
        SubjectAnnouncement {
            when_deleted: true,
            ..Default::default()
        },
    );

    manager
        .apply_snapshot(
            PolicySnapshot::new(policy.clone()).with_entry("DEVICES", vec![alice, bob]),
        )
        .await?;
    println!("[demo] registry: {:?}", manager.registry().await?.subjects);

    tokio::time::sleep(Duration::from_secs(10)).await;

    // bob leaves the policy
    manager
        .apply_snapshot(PolicySnapshot::new(policy).with_entry("DEVICES", vec![]))
        .await?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    println!("[demo] registry: {:?}", manager.registry().await?);

    manager.shutdown().await?;
    Ok(())
}
