//! # Subject set reconciliation.
//!
//! The manager never applies deltas: every snapshot yields the full desired set
//! of relevant subjects, and [`diff`] compares it with the subjects that
//! currently have a worker. Replaying a snapshot therefore yields an empty diff.

use std::collections::HashSet;
use std::hash::Hash;

/// Outcome of comparing two subject sets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubjectDiff<T> {
    /// Present now, absent before (`current − previous`).
    pub added: Vec<T>,
    /// Present before, absent now (`previous − current`).
    pub removed: Vec<T>,
}

impl<T> SubjectDiff<T> {
    /// True if both sides are equal.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl<T> Default for SubjectDiff<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
        }
    }
}

/// Computes `(current − previous, previous − current)` in O(|previous| + |current|).
///
/// Output order follows set iteration order and carries no meaning.
pub fn diff<T>(previous: &HashSet<T>, current: &HashSet<T>) -> SubjectDiff<T>
where
    T: Eq + Hash + Clone,
{
    SubjectDiff {
        added: current.difference(previous).cloned().collect(),
        removed: previous.difference(current).cloned().collect(),
    }
}
