//! Transmission provider implementations

pub mod mock;
pub mod smtp;

pub use mock::MockProvider;
pub use smtp::{SmtpConfig, SmtpProvider};

use crate::models::NotificationJob;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{AsRefStr, Display};

/// Result of a successful transmission
#[derive(Debug, Clone)]
pub struct SendResult {
    /// Provider-specific message ID
    pub message_id: String,
}

/// How a failed transmission should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// Address rejected by the provider. Never retried.
    InvalidRecipient,
    /// Policy rejection (content, suppression list). Never retried.
    Rejected,
    /// Provider is rate limiting us. Retried with a longer backoff.
    Throttled,
    /// Network or provider hiccup. Retried.
    Transient,
}

impl FailureKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureKind::Throttled | FailureKind::Transient)
    }
}

/// Classified transmission failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl DeliveryFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transient, message)
    }

    pub fn throttled(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Throttled, message)
    }

    pub fn invalid_recipient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidRecipient, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Rejected, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for DeliveryFailure {}

/// Something that can put a rendered notification in front of a recipient
#[async_trait]
pub trait TransmissionProvider: Send + Sync {
    /// Transmit a job. `job.id` is the idempotency key.
    async fn transmit(&self, job: &NotificationJob) -> Result<SendResult, DeliveryFailure>;

    /// Check if the provider is reachable
    async fn health_check(&self) -> eyre::Result<()>;

    /// Get provider name
    fn name(&self) -> &'static str;
}
