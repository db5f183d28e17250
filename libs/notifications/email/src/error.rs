//! Error types for the notification path.
//!
//! None of these errors are allowed to fail the operation that triggered the
//! notification. Callers collect them through [`crate::hooks::HookReport`].

use crate::models::DeliveryStatus;
use crate::provider::{DeliveryFailure, FailureKind};
use thiserror::Error;

/// Result type for notification operations.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors that can occur while building or delivering a notification.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// The owner has no usable contact address.
    #[error("Missing recipient: {0}")]
    MissingRecipient(String),

    /// A required template field is absent or a template is invalid.
    #[error("Render error: {0}")]
    Render(String),

    /// Provider-side failure classified as retryable.
    #[error("Transient delivery failure: {0}")]
    TransientDelivery(String),

    /// Invalid recipient or policy rejection. Never retried.
    #[error("Permanent delivery failure: {0}")]
    PermanentDelivery(String),

    /// Work queue operation failed.
    #[error("Queue error: {0}")]
    Queue(String),

    /// Backend or settings misconfiguration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A job status change that the delivery state machine does not allow.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: DeliveryStatus,
        to: DeliveryStatus,
    },
}

impl NotificationError {
    /// True for errors the deferred worker may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientDelivery(_) | Self::Queue(_))
    }
}

impl From<DeliveryFailure> for NotificationError {
    fn from(failure: DeliveryFailure) -> Self {
        match failure.kind {
            FailureKind::Transient | FailureKind::Throttled => {
                Self::TransientDelivery(failure.to_string())
            }
            FailureKind::InvalidRecipient | FailureKind::Rejected => {
                Self::PermanentDelivery(failure.to_string())
            }
        }
    }
}

impl From<serde_json::Error> for NotificationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<redis::RedisError> for NotificationError {
    fn from(err: redis::RedisError) -> Self {
        Self::Queue(err.to_string())
    }
}

impl From<core_config::ConfigError> for NotificationError {
    fn from(err: core_config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
