//! # Worker registry - bookkeeping of live subject workers.
//!
//! The registry is owned exclusively by the [`LifecycleManager`](crate::LifecycleManager)
//! task; it is never shared and therefore needs no locks.
//!
//! ## Architecture
//! ```text
//! by_subject: SubjectId ──► WorkerId          (active workers only)
//! by_worker:  WorkerId  ──► WorkerSlot        (active + retiring)
//!
//! insert(slot)      → both maps
//! retire(subject)   → drop from by_subject, slot stays in by_worker (retiring)
//! remove(worker)    → drop from by_worker, and from by_subject if it still points here
//! ```
//!
//! ## Rules
//! - `by_subject` and the active part of `by_worker` form a bijection
//! - A retiring worker has received a notice and is waiting to terminate
//! - A subject re-added while its old worker retires gets a fresh worker
//! - `remove` is idempotent: an unknown id is reported as `None`

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::task::AbortHandle;

use crate::core::worker::WorkerNotice;
use crate::subjects::{Subject, SubjectId};

/// Process-wide counter for worker handles.
static WORKER_SEQ: AtomicU64 = AtomicU64::new(1);

/// Opaque, process-unique handle of a subject worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    pub(crate) fn next() -> Self {
        WorkerId(WORKER_SEQ.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value (for logs).
    #[inline]
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Registry entry of one worker.
pub(crate) struct WorkerSlot {
    pub(crate) id: WorkerId,
    /// Subject value the worker was seeded with.
    pub(crate) subject: Subject,
    pub(crate) notice: WorkerNotice,
    /// Abort handle of the worker task (used for stragglers on shutdown).
    pub(crate) abort: AbortHandle,
}

/// Point-in-time view of a manager's registry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistryView {
    /// Subjects with an active worker, sorted.
    pub subjects: Vec<SubjectId>,
    /// Workers that received a notice and have not terminated yet.
    pub retiring: usize,
}

impl RegistryView {
    /// Returns `true` if the subject has an active worker.
    pub fn contains(&self, subject: &SubjectId) -> bool {
        self.subjects.binary_search(subject).is_ok()
    }

    /// Number of active workers.
    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    /// Returns `true` when no worker is active or retiring.
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty() && self.retiring == 0
    }
}

/// Bijective map between subjects and their workers.
#[derive(Default)]
pub(crate) struct WorkerRegistry {
    by_subject: HashMap<SubjectId, WorkerId>,
    by_worker: HashMap<WorkerId, WorkerSlot>,
}

impl WorkerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly spawned worker as the active worker of its subject.
    ///
    /// Returns the id of a previously active worker for the same subject, which
    /// is moved to the retiring set.
    pub(crate) fn insert(&mut self, slot: WorkerSlot) -> Option<WorkerId> {
        let displaced = self.by_subject.insert(slot.subject.id.clone(), slot.id);
        self.by_worker.insert(slot.id, slot);
        displaced
    }

    /// Active worker of the subject, if any.
    pub(crate) fn active(&self, subject: &SubjectId) -> Option<&WorkerSlot> {
        self.by_subject
            .get(subject)
            .and_then(|id| self.by_worker.get(id))
    }

    /// Subjects with an active worker (the "previous" set for reconciliation).
    pub(crate) fn active_subjects(&self) -> HashSet<Subject> {
        self.by_subject
            .values()
            .filter_map(|id| self.by_worker.get(id))
            .map(|slot| slot.subject.clone())
            .collect()
    }

    /// Detaches the active worker of a subject and keeps it as retiring.
    pub(crate) fn retire(&mut self, subject: &SubjectId) -> Option<&WorkerSlot> {
        let id = self.by_subject.remove(subject)?;
        self.by_worker.get(&id)
    }

    /// Detaches every active worker; returns their ids.
    pub(crate) fn retire_all(&mut self) -> Vec<WorkerId> {
        self.by_subject.drain().map(|(_, id)| id).collect()
    }

    pub(crate) fn slot(&self, id: WorkerId) -> Option<&WorkerSlot> {
        self.by_worker.get(&id)
    }

    /// Removes a terminated worker from both mappings.
    pub(crate) fn remove(&mut self, id: WorkerId) -> Option<WorkerSlot> {
        let slot = self.by_worker.remove(&id)?;
        if self.by_subject.get(&slot.subject.id) == Some(&id) {
            self.by_subject.remove(&slot.subject.id);
        }
        Some(slot)
    }

    /// Removes every remaining slot (active and retiring).
    pub(crate) fn drain(&mut self) -> Vec<WorkerSlot> {
        self.by_subject.clear();
        self.by_worker.drain().map(|(_, slot)| slot).collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_worker.is_empty()
    }

    pub(crate) fn view(&self) -> RegistryView {
        let mut subjects: Vec<SubjectId> = self.by_subject.keys().cloned().collect();
        subjects.sort_unstable();
        RegistryView {
            retiring: self.by_worker.len() - self.by_subject.len(),
            subjects,
        }
    }
}
