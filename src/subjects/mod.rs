//! Policy subjects and their reconciliation.
//!
//! ## Contents
//! - [`Subject`], [`SubjectId`], [`SubjectAnnouncement`] grantee values read from snapshots
//! - [`PolicySnapshot`], [`PolicyEntry`], [`PolicyLifecycle`] the inbound policy state
//! - [`relevant_subjects`] the subset the scheduler tracks
//! - [`diff`] added/removed computation between two subject sets

mod diff;
mod model;

pub use diff::{SubjectDiff, diff};
pub use model::{
    PolicyEntry, PolicyId, PolicyLifecycle, PolicySnapshot, Subject, SubjectAnnouncement,
    SubjectId, relevant_subjects,
};
