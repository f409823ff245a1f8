//! # Policy and subject values consumed by the scheduler.
//!
//! These mirror the parts of the policy model the scheduler reads. They are
//! immutable snapshots: the scheduler never mutates a subject, it only reacts
//! to the next [`PolicySnapshot`].

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::duration::serde_opt_duration;
use crate::error::ExpiryError;
use crate::expiry::{Granularity, adjust_expiry};

/// Identifier of the policy a manager is responsible for.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyId(Arc<str>);

impl PolicyId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Grantee identity: issuer plus issuer-local subject, rendered as `issuer:subject`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectId {
    pub issuer: Arc<str>,
    pub subject: Arc<str>,
}

impl SubjectId {
    pub fn new(issuer: impl Into<Arc<str>>, subject: impl Into<Arc<str>>) -> Self {
        Self {
            issuer: issuer.into(),
            subject: subject.into(),
        }
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.issuer, self.subject)
    }
}

/// Which announcements to emit for a subject, and when.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectAnnouncement {
    /// Announce this long before the expiry.
    #[serde(with = "serde_opt_duration", skip_serializing_if = "Option::is_none")]
    pub before_expiry: Option<Duration>,
    /// Announce once the expiry is reached.
    pub when_expired: bool,
    /// Announce when the subject is removed from the policy.
    pub when_deleted: bool,
}

/// A grantee entry on a policy, optionally time-bounded.
///
/// Equality and hashing only consider [`Subject::id`]: two snapshots of the same
/// grantee are the same subject even if their settings differ.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub announcement: Option<SubjectAnnouncement>,
}

impl Subject {
    /// A subject without expiry or announcement settings.
    pub fn new(id: SubjectId) -> Self {
        Self {
            id,
            expiry: None,
            announcement: None,
        }
    }

    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn with_announcement(mut self, announcement: SubjectAnnouncement) -> Self {
        self.announcement = Some(announcement);
        self
    }

    /// Rounds the expiry up to `granularity` and rejects it if it is not after `now`.
    ///
    /// Subjects without expiry pass through unchanged.
    pub fn with_adjusted_expiry(
        mut self,
        granularity: Granularity,
        now: DateTime<Utc>,
    ) -> Result<Self, ExpiryError> {
        if let Some(raw) = self.expiry {
            self.expiry = Some(adjust_expiry(raw, granularity, now)?);
        }
        Ok(self)
    }

    /// True if the scheduler has to track this subject.
    #[inline]
    pub fn is_relevant(&self) -> bool {
        self.expiry.is_some() || self.announcement.is_some()
    }

    /// Announcement settings, or the all-off default.
    #[inline]
    pub fn announcement_or_default(&self) -> SubjectAnnouncement {
        self.announcement.unwrap_or_default()
    }
}

impl PartialEq for Subject {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Subject {}

impl Hash for Subject {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Lifecycle of the policy as a whole.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyLifecycle {
    #[default]
    Active,
    Deleted,
}

/// Labelled group of subjects inside a policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub label: String,
    #[serde(default)]
    pub subjects: Vec<Subject>,
}

/// Full state of a policy as delivered to its manager after every modification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub policy_id: PolicyId,
    #[serde(default)]
    pub lifecycle: PolicyLifecycle,
    #[serde(default)]
    pub entries: Vec<PolicyEntry>,
}

impl PolicySnapshot {
    pub fn new(policy_id: PolicyId) -> Self {
        Self {
            policy_id,
            lifecycle: PolicyLifecycle::Active,
            entries: Vec::new(),
        }
    }

    pub fn with_lifecycle(mut self, lifecycle: PolicyLifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn with_entry(mut self, label: impl Into<String>, subjects: Vec<Subject>) -> Self {
        self.entries.push(PolicyEntry {
            label: label.into(),
            subjects,
        });
        self
    }

    /// All subjects across entries, in entry order (duplicates included).
    pub fn subjects(&self) -> impl Iterator<Item = &Subject> {
        self.entries.iter().flat_map(|e| e.subjects.iter())
    }
}

/// Subjects of an active policy that carry an expiry or announcement settings.
///
/// A subject listed in several entries is kept once (first occurrence wins).
/// Policies that are not active have no relevant subjects.
pub fn relevant_subjects(snapshot: &PolicySnapshot) -> HashSet<Subject> {
    if snapshot.lifecycle != PolicyLifecycle::Active {
        return HashSet::new();
    }
    let mut out = HashSet::new();
    for subject in snapshot.subjects().filter(|s| s.is_relevant()) {
        if !out.contains(subject) {
            out.insert(subject.clone());
        }
    }
    out
}
