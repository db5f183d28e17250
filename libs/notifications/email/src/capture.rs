//! Capture store for non-production delivery
//!
//! Captured jobs are kept in insertion order and never removed by reads.

use crate::models::NotificationJob;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Inspectable copy of a captured notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// 1-based capture order
    pub sequence: u64,
    pub job_id: Uuid,
    pub source: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Default)]
struct CaptureLog {
    records: Vec<DeliveryRecord>,
    next_sequence: u64,
}

/// Shared handle to the capture log. Clones see the same records.
#[derive(Clone, Default)]
pub struct CaptureStore {
    inner: Arc<RwLock<CaptureLog>>,
}

impl CaptureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job and return the stored record
    pub async fn append(&self, job: &NotificationJob) -> DeliveryRecord {
        let mut log = self.inner.write().await;
        log.next_sequence += 1;

        let record = DeliveryRecord {
            sequence: log.next_sequence,
            job_id: job.id,
            source: job.source.clone(),
            recipient: job.recipient().to_string(),
            subject: job.subject().to_string(),
            body: job.body().to_string(),
            created_at: job.created_at(),
            captured_at: Utc::now(),
        };
        log.records.push(record.clone());
        record
    }

    /// All records in capture order
    pub async fn list(&self) -> Vec<DeliveryRecord> {
        self.inner.read().await.records.clone()
    }

    pub async fn get(&self, job_id: Uuid) -> Option<DeliveryRecord> {
        self.inner
            .read()
            .await
            .records
            .iter()
            .find(|r| r.job_id == job_id)
            .cloned()
    }

    pub async fn by_sequence(&self, sequence: u64) -> Option<DeliveryRecord> {
        self.inner
            .read()
            .await
            .records
            .iter()
            .find(|r| r.sequence == sequence)
            .cloned()
    }

    /// Records for one recipient, in capture order (case-insensitive match)
    pub async fn by_recipient(&self, recipient: &str) -> Vec<DeliveryRecord> {
        self.inner
            .read()
            .await
            .records
            .iter()
            .filter(|r| r.recipient.eq_ignore_ascii_case(recipient))
            .cloned()
            .collect()
    }

    pub async fn latest(&self) -> Option<DeliveryRecord> {
        self.inner.read().await.records.last().cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.records.is_empty()
    }

    /// Drop all records. Sequence numbers keep increasing afterwards.
    pub async fn clear(&self) {
        self.inner.write().await.records.clear();
    }
}
