//! Announcements, subject commands and the collaborators that carry them.
//!
//! ## Contents
//! - [`Announcement`], [`AnnouncementKind`] the logical content of a notification
//! - [`SubjectCommand`] policy-modifying requests issued by workers
//! - [`AnnouncementPublisher`], [`CommandForwarder`] outbound capabilities
//! - [`PublisherFn`], [`ForwarderFn`] closure adapters; [`NoopPublisher`], [`NoopForwarder`]

mod announcement;
mod sink;

pub use announcement::{Announcement, AnnouncementKind, SubjectCommand};
pub use sink::{
    AnnouncementPublisher, CommandForwarder, ForwarderFn, NoopForwarder, NoopPublisher,
    PublisherFn,
};
