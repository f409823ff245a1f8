//! # Per-policy fan-out of bus events to subscribers.
//!
//! The subscriber listener of a manager owns one [`SubscriberSet`] and feeds it
//! every event seen on the policy's bus. Each subscriber gets a lane: a bounded
//! queue drained by its own task.
//!
//! ```text
//! emit(event) ──► accepts(kind)? ──► [lane 1 queue] ──► task ──► on_event()
//!             │                                            └──► panic ─► SubscriberPanicked
//!             └─► accepts(kind)? ──► [lane N queue] ──► task ──► on_event()
//!                        full ─► drop, SubscriberOverflow once per episode
//! ```
//!
//! A lane that starts dropping publishes one `SubscriberOverflow` naming the
//! first lost event kind. It stays quiet until an event gets through again, and
//! its drop count is logged when the set shuts down. Overflow reports of other
//! lanes are dropped silently so a congested set cannot feed itself.

use std::any::Any;
use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, warn};

use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

/// Queue plus drop accounting of one subscriber.
struct Lane {
    sub: Arc<dyn Subscribe>,
    sender: mpsc::Sender<Arc<Event>>,
    dropped: u64,
    congested: bool,
}

impl Lane {
    /// Returns the overflow cause when this drop opens a new congestion episode.
    fn record_drop(&mut self, cause: &'static str) -> Option<&'static str> {
        self.dropped += 1;
        if self.congested {
            return None;
        }
        self.congested = true;
        Some(cause)
    }
}

/// Fan-out of one policy's events to its subscribers.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    tasks: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Creates one lane and drain task per subscriber.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut lanes = Vec::with_capacity(subs.len());
        let mut tasks = Vec::with_capacity(subs.len());

        for sub in subs {
            let (tx, rx) = mpsc::channel::<Arc<Event>>(sub.queue_capacity().max(1));
            tasks.push(tokio::spawn(drain_lane(Arc::clone(&sub), rx, bus.clone())));
            lanes.push(Lane {
                sub,
                sender: tx,
                dropped: 0,
                congested: false,
            });
        }
        Self { lanes, tasks, bus }
    }

    /// Number of attached subscribers.
    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Events dropped so far for the subscriber called `name`.
    pub fn dropped(&self, name: &str) -> u64 {
        self.lanes
            .iter()
            .filter(|l| l.sub.name() == name)
            .map(|l| l.dropped)
            .sum()
    }

    /// Queues `event` for every subscriber that accepts its kind; never blocks.
    pub fn emit(&mut self, event: Event) {
        let kind = event.kind;
        let event = Arc::new(event);

        for lane in &mut self.lanes {
            if !lane.sub.accepts(kind) {
                continue;
            }
            let cause = match lane.sender.try_send(Arc::clone(&event)) {
                Ok(()) => {
                    if lane.congested {
                        lane.congested = false;
                        debug!(
                            policy = %self.bus.policy(),
                            subscriber = lane.sub.name(),
                            dropped = lane.dropped,
                            "subscriber caught up"
                        );
                    }
                    continue;
                }
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if kind == EventKind::SubscriberOverflow {
                lane.dropped += 1;
                continue;
            }
            if let Some(cause) = lane.record_drop(cause) {
                self.bus
                    .publish(Event::subscriber_overflow(lane.sub.name(), cause, kind));
            }
        }
    }

    /// Closes every lane and waits until the queued events are handled.
    pub async fn shutdown(self) {
        let policy = self.bus.policy().clone();
        for lane in self.lanes {
            if lane.dropped > 0 {
                warn!(
                    policy = %policy,
                    subscriber = lane.sub.name(),
                    dropped = lane.dropped,
                    "subscriber missed events"
                );
            }
        }
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

/// Feeds one subscriber; a panic is reported and the lane keeps going.
async fn drain_lane(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        let handled = std::panic::AssertUnwindSafe(sub.on_event(ev.as_ref()))
            .catch_unwind()
            .await;
        if let Err(payload) = handled {
            let info = panic_message(payload.as_ref());
            warn!(
                policy = %bus.policy(),
                subscriber = sub.name(),
                event = ev.kind.as_label(),
                "subscriber panicked: {info}"
            );
            if !ev.kind.is_subscriber_fault() {
                bus.publish(Event::subscriber_panicked(sub.name(), ev.kind, &info));
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&'static str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
