use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::subjects::{PolicyId, SubjectId};

/// What an announcement is about.
///
/// The set is open: new kinds may be added without breaking matchers.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnnouncementKind {
    /// The grant will expire soon.
    BeforeExpiry,
    /// The grant has reached its expiry.
    Expired,
    /// The subject was removed from the policy.
    Deleted,
}

impl AnnouncementKind {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            AnnouncementKind::BeforeExpiry => "before_expiry",
            AnnouncementKind::Expired => "expired",
            AnnouncementKind::Deleted => "deleted",
        }
    }
}

impl fmt::Display for AnnouncementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Best-effort notification about a subject of a policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub policy_id: PolicyId,
    pub subject_id: SubjectId,
    pub kind: AnnouncementKind,
    /// Instant the announcement was scheduled for.
    pub trigger: DateTime<Utc>,
}

/// Policy-modifying command issued by a worker.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubjectCommand {
    /// Remove a subject whose expiry has passed.
    DeleteExpiredSubject {
        policy_id: PolicyId,
        subject_id: SubjectId,
    },
}

impl SubjectCommand {
    pub fn subject_id(&self) -> &SubjectId {
        match self {
            SubjectCommand::DeleteExpiredSubject { subject_id, .. } => subject_id,
        }
    }
}
