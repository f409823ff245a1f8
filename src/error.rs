//! Error types used by the scheduler runtime, its collaborators and its callers.
//!
//! - [`ExpiryError`]: a subject expiry that cannot be accepted (raised before the scheduler).
//! - [`DeliveryError`]: a publish/forward call that did not go through.
//! - [`ConfigError`]: configuration could not be loaded or is inconsistent.
//! - [`SubmitError`]: the manager inbox refused a message.
//! - [`RuntimeError`]: errors raised by the manager runtime itself.
//!
//! Every enum provides `as_label` (stable snake_case label for logs/metrics).

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// # Errors produced while validating a subject expiry.
///
/// Raised at the point a subject's expiry is set, so a stale expiry never
/// reaches a [`LifecycleManager`](crate::LifecycleManager).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpiryError {
    /// The expiry, after rounding up to the configured granularity, is not in the future.
    #[error("the expiry of a subject may not be in the past, but it was: <{adjusted}>")]
    InThePast {
        /// The normalized expiry that was rejected.
        adjusted: DateTime<Utc>,
    },
}

impl ExpiryError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ExpiryError::InThePast { .. } => "expiry_in_the_past",
        }
    }
}

/// # Errors reported by an announcement publisher or a command forwarder.
///
/// The scheduler never propagates these: workers retry announcements according
/// to their backoff policy and log forwarding failures.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Delivery failed but may succeed if retried.
    #[error("delivery failed: {reason}")]
    Failed {
        /// The underlying error message.
        reason: String,
    },

    /// The receiving side refused the message.
    #[error("rejected: {reason}")]
    Rejected {
        /// The refusal reason.
        reason: String,
    },

    /// Delivery did not complete in time.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout that was exceeded.
        timeout: Duration,
    },
}

impl DeliveryError {
    /// Shorthand for [`DeliveryError::Failed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        DeliveryError::Failed {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`DeliveryError::Rejected`].
    pub fn rejected(reason: impl Into<String>) -> Self {
        DeliveryError::Rejected {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DeliveryError::Failed { .. } => "delivery_failed",
            DeliveryError::Rejected { .. } => "delivery_rejected",
            DeliveryError::Timeout { .. } => "delivery_timeout",
        }
    }

    /// Indicates whether another attempt could succeed.
    ///
    /// A rejection is final; failures and timeouts are transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeliveryError::Failed { .. } | DeliveryError::Timeout { .. }
        )
    }
}

/// # Errors produced while loading or validating configuration.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration sources could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(String),

    /// A value was read but is not acceptable.
    #[error("invalid configuration: {field}: {reason}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was refused.
        reason: String,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Load(_) => "config_load",
            ConfigError::Invalid { .. } => "config_invalid",
        }
    }
}

/// Error returned when a message cannot be handed to a manager.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// Inbox is full (try again later or use the async variant).
    #[error("manager inbox full")]
    Full,

    /// Manager has stopped.
    #[error("manager inbox closed")]
    Closed,
}

/// # Errors produced by the manager runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some workers did not terminate and were aborted.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forcing termination")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Subjects whose workers did not stop in time.
        stuck: Vec<String>,
    },

    /// The manager task is gone (already shut down or panicked).
    #[error("manager is not running")]
    ManagerGone,
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use expiryvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::ManagerGone => "runtime_manager_gone",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::GraceExceeded { grace, stuck } => {
                format!("grace exceeded after {grace:?}; stuck workers={stuck:?}")
            }
            RuntimeError::ManagerGone => "manager is not running".to_string(),
        }
    }
}
