use crate::error::{NotificationError, NotificationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumString};
use uuid::Uuid;

/// Delivery strategy, chosen once at process start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DeliveryStrategy {
    /// Transmit inside the caller's execution context
    Immediate,
    /// Enqueue for a background worker
    Deferred,
    /// Store for inspection, never transmit (non-production only)
    Captured,
}

/// Delivery status of a single job.
///
/// ```text
/// pending ──► delivering ──► delivered
///    │            │
///    │            └──► failed(retryable) ──► delivering   (deferred only)
///    └──► captured
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[default]
    Pending,
    Delivering,
    Delivered,
    Captured,
    Failed { retryable: bool },
}

impl DeliveryStatus {
    pub fn can_transition_to(self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        matches!(
            (self, next),
            (Pending, Delivering)
                | (Pending, Captured)
                | (Delivering, Delivered)
                | (Delivering, Failed { .. })
                | (Failed { retryable: true }, Delivering)
        )
    }

    /// Delivered, captured, and non-retryable failures are final.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeliveryStatus::Delivered
                | DeliveryStatus::Captured
                | DeliveryStatus::Failed { retryable: false }
        )
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Delivering => write!(f, "delivering"),
            Self::Delivered => write!(f, "delivered"),
            Self::Captured => write!(f, "captured"),
            Self::Failed { retryable: true } => write!(f, "failed(retryable)"),
            Self::Failed { retryable: false } => write!(f, "failed"),
        }
    }
}

/// Rendered notification payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Recipient contact address
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// The unit of work: notify one recipient about one source event.
///
/// The payload is a snapshot taken at render time. Nothing in a job refers
/// back to the entity or owner it was built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationJob {
    /// Unique job ID, also used as the idempotency key for transmission
    pub id: Uuid,

    /// What produced this job, e.g. `task:<uuid>`
    pub source: String,

    pub notification: Notification,

    #[serde(default)]
    pub status: DeliveryStatus,

    /// Number of delivery attempts that failed and were retried
    #[serde(default)]
    pub retry_count: u32,
}

impl NotificationJob {
    pub fn new(source: impl Into<String>, notification: Notification) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            notification,
            status: DeliveryStatus::Pending,
            retry_count: 0,
        }
    }

    pub fn recipient(&self) -> &str {
        &self.notification.recipient
    }

    pub fn subject(&self) -> &str {
        &self.notification.subject
    }

    pub fn body(&self) -> &str {
        &self.notification.body
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.notification.created_at
    }

    pub fn idempotency_key(&self) -> String {
        self.id.to_string()
    }

    /// Move the job to `next`, rejecting transitions the state machine does not allow.
    pub fn transition(&mut self, next: DeliveryStatus) -> NotificationResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(NotificationError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Strategy-specific reference returned with a receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryReference {
    /// Position in the capture store
    Captured { sequence: u64 },
    /// Message ID assigned by the work queue
    Queued { message_id: String },
    /// Message ID returned by the transmission provider
    Sent { message_id: String },
}

/// What the delivery backend reports back to the trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub job_id: Uuid,
    pub recipient: String,
    pub strategy: DeliveryStrategy,
    pub status: DeliveryStatus,
    pub reference: DeliveryReference,
}
