//! Delivery backend
//!
//! One backend is built at process start from a [`DeliveryConfig`] and shared
//! by every trigger. Callers never pick a strategy per call.

use crate::capture::CaptureStore;
use crate::error::{NotificationError, NotificationResult};
use crate::metrics::DispatchMetrics;
use crate::models::{
    DeliveryReceipt, DeliveryReference, DeliveryStatus, DeliveryStrategy, NotificationJob,
};
use crate::provider::TransmissionProvider;
use crate::queue::WorkQueue;
use core_config::Environment;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Handles needed to build a [`DeliveryBackend`]
#[derive(Clone)]
pub struct DeliveryConfig {
    pub environment: Environment,
    pub strategy: DeliveryStrategy,
    /// Required for `Deferred`
    pub worker_queue: Option<Arc<dyn WorkQueue>>,
    /// Required for `Captured`
    pub inspection_store: Option<CaptureStore>,
    /// Required for `Immediate`
    pub provider: Option<Arc<dyn TransmissionProvider>>,
}

impl DeliveryConfig {
    pub fn new(environment: Environment, strategy: DeliveryStrategy) -> Self {
        Self {
            environment,
            strategy,
            worker_queue: None,
            inspection_store: None,
            provider: None,
        }
    }

    pub fn with_queue(mut self, queue: Arc<dyn WorkQueue>) -> Self {
        self.worker_queue = Some(queue);
        self
    }

    pub fn with_capture_store(mut self, store: CaptureStore) -> Self {
        self.inspection_store = Some(store);
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn TransmissionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }
}

/// Transmit inline. The caller sees the provider's answer. No retries.
pub struct ImmediateDelivery {
    provider: Arc<dyn TransmissionProvider>,
    metrics: DispatchMetrics,
}

/// Enqueue and return. A worker delivers later.
pub struct DeferredDelivery {
    queue: Arc<dyn WorkQueue>,
    metrics: DispatchMetrics,
}

/// Store for inspection. Nothing is transmitted.
pub struct CapturedDelivery {
    store: CaptureStore,
    metrics: DispatchMetrics,
}

pub enum DeliveryBackend {
    Immediate(ImmediateDelivery),
    Deferred(DeferredDelivery),
    Captured(CapturedDelivery),
}

impl DeliveryBackend {
    /// Build the backend, checking that the chosen strategy has its handle.
    pub fn new(config: DeliveryConfig) -> NotificationResult<Self> {
        let metrics = DispatchMetrics::new(config.strategy);

        let backend = match config.strategy {
            DeliveryStrategy::Immediate => {
                let provider = config.provider.ok_or_else(|| {
                    NotificationError::Config(
                        "immediate delivery requires a transmission provider".to_string(),
                    )
                })?;
                Self::Immediate(ImmediateDelivery { provider, metrics })
            }
            DeliveryStrategy::Deferred => {
                let queue = config.worker_queue.ok_or_else(|| {
                    NotificationError::Config("deferred delivery requires a work queue".to_string())
                })?;
                Self::Deferred(DeferredDelivery { queue, metrics })
            }
            DeliveryStrategy::Captured => {
                if config.environment.is_production() {
                    return Err(NotificationError::Config(
                        "captured delivery is not allowed in production".to_string(),
                    ));
                }
                let store = config.inspection_store.ok_or_else(|| {
                    NotificationError::Config(
                        "captured delivery requires an inspection store".to_string(),
                    )
                })?;
                Self::Captured(CapturedDelivery { store, metrics })
            }
        };

        info!(
            strategy = %backend.strategy(),
            environment = config.environment.as_str(),
            "Delivery backend ready"
        );

        Ok(backend)
    }

    pub fn strategy(&self) -> DeliveryStrategy {
        match self {
            Self::Immediate(_) => DeliveryStrategy::Immediate,
            Self::Deferred(_) => DeliveryStrategy::Deferred,
            Self::Captured(_) => DeliveryStrategy::Captured,
        }
    }

    /// The capture store when running in capture mode
    pub fn capture_store(&self) -> Option<&CaptureStore> {
        match self {
            Self::Captured(captured) => Some(&captured.store),
            _ => None,
        }
    }

    /// Hand a job to the configured strategy.
    pub async fn deliver(&self, job: NotificationJob) -> NotificationResult<DeliveryReceipt> {
        match self {
            Self::Immediate(immediate) => immediate.deliver(job).await,
            Self::Deferred(deferred) => deferred.deliver(job).await,
            Self::Captured(captured) => captured.deliver(job).await,
        }
    }
}

fn receipt(
    job: &NotificationJob,
    strategy: DeliveryStrategy,
    reference: DeliveryReference,
) -> DeliveryReceipt {
    DeliveryReceipt {
        job_id: job.id,
        recipient: job.recipient().to_string(),
        strategy,
        status: job.status,
        reference,
    }
}

impl ImmediateDelivery {
    async fn deliver(&self, mut job: NotificationJob) -> NotificationResult<DeliveryReceipt> {
        job.transition(DeliveryStatus::Delivering)?;

        let started = Instant::now();
        let result = self.provider.transmit(&job).await;
        self.metrics.delivery_duration(started.elapsed());

        match result {
            Ok(sent) => {
                job.transition(DeliveryStatus::Delivered)?;
                self.metrics.dispatched();
                info!(
                    job_id = %job.id,
                    provider = self.provider.name(),
                    message_id = %sent.message_id,
                    "Notification delivered"
                );
                Ok(receipt(
                    &job,
                    DeliveryStrategy::Immediate,
                    DeliveryReference::Sent {
                        message_id: sent.message_id,
                    },
                ))
            }
            Err(failure) => {
                job.transition(DeliveryStatus::Failed {
                    retryable: failure.is_retryable(),
                })?;
                self.metrics.failed(failure.kind);
                warn!(
                    job_id = %job.id,
                    provider = self.provider.name(),
                    kind = %failure.kind,
                    error = %failure.message,
                    "Immediate delivery failed"
                );
                Err(failure.into())
            }
        }
    }
}

impl DeferredDelivery {
    async fn deliver(&self, job: NotificationJob) -> NotificationResult<DeliveryReceipt> {
        let message_id = self.queue.enqueue(&job).await?;
        self.metrics.dispatched();

        debug!(
            job_id = %job.id,
            queue = self.queue.name(),
            message_id = %message_id,
            "Notification queued"
        );

        Ok(receipt(
            &job,
            DeliveryStrategy::Deferred,
            DeliveryReference::Queued { message_id },
        ))
    }
}

impl CapturedDelivery {
    async fn deliver(&self, mut job: NotificationJob) -> NotificationResult<DeliveryReceipt> {
        job.transition(DeliveryStatus::Captured)?;
        let record = self.store.append(&job).await;
        self.metrics.dispatched();

        info!(
            job_id = %job.id,
            to = %job.recipient(),
            sequence = record.sequence,
            "Notification captured"
        );

        Ok(receipt(
            &job,
            DeliveryStrategy::Captured,
            DeliveryReference::Captured {
                sequence: record.sequence,
            },
        ))
    }
}
