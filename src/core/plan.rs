//! # Fire plan of a subject worker.
//!
//! A plan is the ordered list of steps a worker will execute for its subject,
//! computed once at worker creation from the (already normalized) expiry and
//! the subject's announcement configuration.
//!
//! ```text
//!        before_expiry            grace_period
//!   ───────┬────────────────┬────────────────────┬──────► time
//!     BeforeExpiry       Expired               Revoke
//!   (expiry - before)    (expiry)        (expiry + grace)
//! ```
//!
//! - `BeforeExpiry` only when `before_expiry` is set and the expiry is still ahead
//! - `Expired` only when `when_expired` is set
//! - `Revoke` only when grant expiry is enabled
//! - Subjects without an expiry get an empty plan

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::announce::AnnouncementKind;
use crate::subjects::Subject;

/// What a step does when its instant is reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StepKind {
    Announce(AnnouncementKind),
    Revoke,
}

impl StepKind {
    pub(crate) fn announcement(&self) -> Option<AnnouncementKind> {
        match self {
            StepKind::Announce(kind) => Some(*kind),
            StepKind::Revoke => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Step {
    /// Scheduled instant (also the announcement trigger).
    pub(crate) at: DateTime<Utc>,
    pub(crate) kind: StepKind,
}

#[derive(Debug, Default)]
pub(crate) struct FirePlan {
    steps: VecDeque<Step>,
}

impl FirePlan {
    pub(crate) fn compute(
        subject: &Subject,
        now: DateTime<Utc>,
        grace_period: Duration,
        expire_grants: bool,
    ) -> Self {
        let Some(expiry) = subject.expiry else {
            return Self::default();
        };
        let announcement = subject.announcement_or_default();
        let mut steps = Vec::with_capacity(3);

        if let Some(before) = announcement.before_expiry {
            if expiry > now {
                let at = TimeDelta::from_std(before)
                    .ok()
                    .and_then(|d| expiry.checked_sub_signed(d))
                    .unwrap_or(DateTime::<Utc>::MIN_UTC);
                steps.push(Step {
                    at,
                    kind: StepKind::Announce(AnnouncementKind::BeforeExpiry),
                });
            }
        }
        if announcement.when_expired {
            steps.push(Step {
                at: expiry,
                kind: StepKind::Announce(AnnouncementKind::Expired),
            });
        }
        if expire_grants {
            let at = TimeDelta::from_std(grace_period)
                .ok()
                .and_then(|d| expiry.checked_add_signed(d))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            steps.push(Step {
                at,
                kind: StepKind::Revoke,
            });
        }

        // stable: steps sharing an instant keep the order above
        steps.sort_by_key(|s| s.at);
        Self {
            steps: steps.into(),
        }
    }

    pub(crate) fn pop(&mut self) -> Option<Step> {
        self.steps.pop_front()
    }
}
