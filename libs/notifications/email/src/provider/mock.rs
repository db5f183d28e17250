//! In-memory transmission provider for tests

use super::{DeliveryFailure, FailureKind, SendResult, TransmissionProvider};
use crate::models::NotificationJob;
use async_trait::async_trait;
use eyre::Result;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Mock provider that records transmitted jobs.
///
/// Can be told to fail permanently, to fail transiently a fixed number of
/// times before succeeding, and to sleep before every attempt. Clones share
/// the same recorded state.
#[derive(Clone, Default)]
pub struct MockProvider {
    sent: Arc<Mutex<Vec<NotificationJob>>>,
    attempts: Arc<AtomicU32>,
    transient_failures: Arc<AtomicU32>,
    failure: Option<DeliveryFailure>,
    delay: Option<Duration>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider whose every attempt fails with `kind`
    pub fn failing(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            failure: Some(DeliveryFailure::new(kind, message)),
            ..Self::default()
        }
    }

    /// A provider that fails transiently `count` times, then succeeds
    pub fn flaky(count: u32) -> Self {
        Self {
            transient_failures: Arc::new(AtomicU32::new(count)),
            ..Self::default()
        }
    }

    /// Sleep for `delay` before every attempt
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn sent(&self) -> Vec<NotificationJob> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Number of `transmit` calls, successful or not
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn was_sent_to(&self, recipient: &str) -> bool {
        self.sent
            .lock()
            .await
            .iter()
            .any(|job| job.recipient() == recipient)
    }

    pub async fn clear(&self) {
        self.sent.lock().await.clear();
    }
}

#[async_trait]
impl TransmissionProvider for MockProvider {
    async fn transmit(&self, job: &NotificationJob) -> Result<SendResult, DeliveryFailure> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }

        let remaining = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if remaining.is_ok() {
            return Err(DeliveryFailure::transient("mock transient failure"));
        }

        self.sent.lock().await.push(job.clone());

        Ok(SendResult {
            message_id: format!("mock-{}", job.id),
        })
    }

    async fn health_check(&self) -> Result<()> {
        if self.failure.is_some() {
            return Err(eyre::eyre!("Mock health check failed"));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
