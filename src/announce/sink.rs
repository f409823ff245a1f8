//! # Outbound collaborators.
//!
//! Workers only depend on two capabilities:
//! - [`AnnouncementPublisher`] fans a finished [`Announcement`] out to interested parties;
//! - [`CommandForwarder`] hands a [`SubjectCommand`] to whoever owns the policy.
//!
//! Neither gives retry guarantees; the worker owns the retry policy for
//! announcements and treats forwarding as fire-and-forget.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use expiryvisor::{Announcement, AnnouncementPublisher, DeliveryError, PublisherFn};
//!
//! let publisher: Arc<dyn AnnouncementPublisher> =
//!     PublisherFn::arc("stdout", |a: Announcement| async move {
//!         println!("{} {} {}", a.policy_id, a.subject_id, a.kind);
//!         Ok::<_, DeliveryError>(())
//!     });
//! assert_eq!(publisher.name(), "stdout");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::announce::announcement::{Announcement, SubjectCommand};
use crate::error::DeliveryError;

/// Publishes announcements. Must be safe for concurrent use by many workers.
#[async_trait]
pub trait AnnouncementPublisher: Send + Sync + 'static {
    /// Delivers one announcement.
    async fn publish(&self, announcement: &Announcement) -> Result<(), DeliveryError>;

    /// Human-readable name (for logs).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Forwards policy commands. Must be safe for concurrent use by many workers.
#[async_trait]
pub trait CommandForwarder: Send + Sync + 'static {
    /// Hands the command over; `Err` means it was not accepted.
    async fn forward(&self, command: SubjectCommand) -> Result<(), DeliveryError>;

    /// Human-readable name (for logs).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Function-backed publisher.
///
/// Wraps a closure that creates a new future per announcement.
pub struct PublisherFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> PublisherFn<F> {
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the publisher and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> AnnouncementPublisher for PublisherFn<F>
where
    F: Fn(Announcement) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), DeliveryError>> + Send + 'static,
{
    async fn publish(&self, announcement: &Announcement) -> Result<(), DeliveryError> {
        (self.f)(announcement.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Function-backed forwarder.
pub struct ForwarderFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> ForwarderFn<F> {
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the forwarder and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> CommandForwarder for ForwarderFn<F>
where
    F: Fn(SubjectCommand) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), DeliveryError>> + Send + 'static,
{
    async fn forward(&self, command: SubjectCommand) -> Result<(), DeliveryError> {
        (self.f)(command).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Publisher that accepts and drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

#[async_trait]
impl AnnouncementPublisher for NoopPublisher {
    async fn publish(&self, _announcement: &Announcement) -> Result<(), DeliveryError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// Forwarder that refuses every command; used when none is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopForwarder;

#[async_trait]
impl CommandForwarder for NoopForwarder {
    async fn forward(&self, _command: SubjectCommand) -> Result<(), DeliveryError> {
        Err(DeliveryError::rejected("no command forwarder configured"))
    }

    fn name(&self) -> &str {
        "noop"
    }
}
