//! Deferred delivery worker
//!
//! Consumes queued jobs and transmits them at-least-once:
//! - Transient and throttled failures are retried with capped exponential
//!   backoff (throttled uses a longer base)
//! - Permanent failures and exhausted retries land in the [`FailureLog`]
//! - A job ID handled recently in this process is skipped; the window of
//!   remembered IDs is bounded
//! - Stream entries left unacknowledged are redelivered on start and claimed
//!   from idle consumers

use crate::error::NotificationResult;
use crate::metrics::DispatchMetrics;
use crate::models::{DeliveryStatus, DeliveryStrategy, NotificationJob};
use crate::provider::{DeliveryFailure, FailureKind, TransmissionProvider};
use crate::queue::{JobReceiver, QueuedJob, RedisStreamConsumer};
use chrono::{DateTime, Utc};
use core_config::{env_parse, ConfigError, FromEnv};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Throttled failures wait this many times longer than transient ones
const THROTTLE_FACTOR: u32 = 5;

/// Retry bound for the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl FromEnv for RetryPolicy {
    fn from_env() -> Result<Self, ConfigError> {
        let policy = Self {
            max_retries: env_parse("NOTIFY_MAX_RETRIES", 3u32)?,
            base_delay: Duration::from_millis(env_parse("NOTIFY_RETRY_BASE_MS", 1_000u64)?),
            max_delay: Duration::from_millis(env_parse("NOTIFY_RETRY_MAX_MS", 30_000u64)?),
        };

        if policy.base_delay > policy.max_delay {
            return Err(ConfigError::Invalid(
                "NOTIFY_RETRY_BASE_MS must not exceed NOTIFY_RETRY_MAX_MS".to_string(),
            ));
        }

        Ok(policy)
    }
}

impl RetryPolicy {
    pub fn should_retry(&self, kind: FailureKind, retry_count: u32) -> bool {
        kind.is_retryable() && retry_count < self.max_retries
    }

    /// Delay before retry number `retry_count + 1`
    pub fn backoff(&self, kind: FailureKind, retry_count: u32) -> Duration {
        let base = match kind {
            FailureKind::Throttled => self.base_delay.saturating_mul(THROTTLE_FACTOR),
            _ => self.base_delay,
        };
        let cap = match kind {
            FailureKind::Throttled => self.max_delay.saturating_mul(THROTTLE_FACTOR),
            _ => self.max_delay,
        };

        base.saturating_mul(2u32.saturating_pow(retry_count)).min(cap)
    }
}

/// A job the worker gave up on
#[derive(Debug, Clone, Serialize)]
pub struct FailedDelivery {
    pub job_id: Uuid,
    pub source: String,
    pub recipient: String,
    pub kind: FailureKind,
    pub error: String,
    /// Total transmission attempts
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

/// Operator-visible record of undeliverable jobs
#[derive(Clone, Default)]
pub struct FailureLog {
    entries: Arc<RwLock<Vec<FailedDelivery>>>,
}

impl FailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    async fn record(&self, job: &NotificationJob, failure: &DeliveryFailure) {
        let entry = FailedDelivery {
            job_id: job.id,
            source: job.source.clone(),
            recipient: job.recipient().to_string(),
            kind: failure.kind,
            error: failure.message.clone(),
            attempts: job.retry_count + 1,
            failed_at: Utc::now(),
        };

        error!(
            job_id = %entry.job_id,
            to = %entry.recipient,
            kind = %entry.kind,
            attempts = entry.attempts,
            error = %entry.error,
            "Notification undeliverable"
        );

        self.entries.write().await.push(entry);
    }

    pub async fn list(&self) -> Vec<FailedDelivery> {
        self.entries.read().await.clone()
    }

    pub async fn get(&self, job_id: Uuid) -> Option<FailedDelivery> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.job_id == job_id)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Outcome of processing one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobDisposition {
    Delivered { message_id: String },
    /// Already handled in this process
    Duplicate,
    Failed { kind: FailureKind },
    /// Shutdown arrived during a retry backoff. The job is not settled and
    /// must not be acknowledged.
    Interrupted,
}

/// Default number of recently handled job IDs remembered for de-duplication
pub const DEFAULT_DEDUP_CAPACITY: usize = 10_000;

/// Entries read or claimed per stream round trip
const STREAM_BATCH_SIZE: usize = 10;
/// XREADGROUP BLOCK timeout
const STREAM_BLOCK_MS: u64 = 5_000;

/// Bounded window of recently handled job IDs, oldest evicted first
struct RecentIds {
    capacity: usize,
    order: VecDeque<Uuid>,
    ids: HashSet<Uuid>,
}

impl RecentIds {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            ids: HashSet::new(),
        }
    }

    /// False when the ID is already in the window
    fn insert(&mut self, id: Uuid) -> bool {
        if !self.ids.insert(id) {
            return false;
        }

        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }

    fn remove(&mut self, id: Uuid) {
        if self.ids.remove(&id) {
            self.order.retain(|seen| *seen != id);
        }
    }
}

/// Resolves once `shutdown` is true. Never resolves if the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Queue consumer that owns the transmission provider on the deferred path
pub struct DeliveryWorker {
    provider: Arc<dyn TransmissionProvider>,
    policy: RetryPolicy,
    failures: FailureLog,
    seen: Mutex<RecentIds>,
    metrics: DispatchMetrics,
}

impl DeliveryWorker {
    pub fn new(provider: Arc<dyn TransmissionProvider>, policy: RetryPolicy) -> Self {
        Self {
            provider,
            policy,
            failures: FailureLog::new(),
            seen: Mutex::new(RecentIds::new(DEFAULT_DEDUP_CAPACITY)),
            metrics: DispatchMetrics::new(DeliveryStrategy::Deferred),
        }
    }

    /// Share an existing failure log, e.g. one exposed by the HTTP service
    pub fn with_failure_log(mut self, failures: FailureLog) -> Self {
        self.failures = failures;
        self
    }

    /// Remember at most `capacity` handled job IDs
    pub fn with_dedup_capacity(mut self, capacity: usize) -> Self {
        self.seen = Mutex::new(RecentIds::new(capacity));
        self
    }

    pub fn failure_log(&self) -> &FailureLog {
        &self.failures
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Deliver one job, retrying in place until it succeeds or is given up on.
    pub async fn process(&self, job: NotificationJob) -> NotificationResult<JobDisposition> {
        let (_never, mut shutdown) = watch::channel(false);
        self.process_until(job, &mut shutdown).await
    }

    /// Like [`process`](Self::process), but a retry backoff ends early with
    /// [`JobDisposition::Interrupted`] when `shutdown` turns true.
    pub async fn process_until(
        &self,
        mut job: NotificationJob,
        shutdown: &mut watch::Receiver<bool>,
    ) -> NotificationResult<JobDisposition> {
        if job.status.is_terminal() || !self.seen.lock().await.insert(job.id) {
            debug!(job_id = %job.id, "Skipping already handled job");
            return Ok(JobDisposition::Duplicate);
        }

        loop {
            job.transition(DeliveryStatus::Delivering)?;

            let started = Instant::now();
            let result = self.provider.transmit(&job).await;
            self.metrics.delivery_duration(started.elapsed());

            let failure = match result {
                Ok(sent) => {
                    job.transition(DeliveryStatus::Delivered)?;
                    info!(
                        job_id = %job.id,
                        to = %job.recipient(),
                        retries = job.retry_count,
                        message_id = %sent.message_id,
                        "Notification delivered"
                    );
                    return Ok(JobDisposition::Delivered {
                        message_id: sent.message_id,
                    });
                }
                Err(failure) => failure,
            };

            let retry = self.policy.should_retry(failure.kind, job.retry_count);
            job.transition(DeliveryStatus::Failed { retryable: retry })?;
            self.metrics.failed(failure.kind);

            if !retry {
                self.failures.record(&job, &failure).await;
                return Ok(JobDisposition::Failed { kind: failure.kind });
            }

            let delay = self.policy.backoff(failure.kind, job.retry_count);
            job.retry_count += 1;
            self.metrics.retried();

            warn!(
                job_id = %job.id,
                kind = %failure.kind,
                error = %failure.message,
                retry = job.retry_count,
                max_retries = self.policy.max_retries,
                delay_ms = delay.as_millis() as u64,
                "Delivery failed, retrying"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_requested(shutdown) => {
                    self.seen.lock().await.remove(job.id);
                    warn!(job_id = %job.id, retry = job.retry_count, "Shutdown during retry backoff, job left unsettled");
                    return Ok(JobDisposition::Interrupted);
                }
            }
        }
    }

    /// Process one queued job. False when the job was interrupted and must
    /// stay unacknowledged.
    async fn handle(&self, queued: QueuedJob, shutdown: &mut watch::Receiver<bool>) -> bool {
        let job_id = queued.job.id;
        match self.process_until(queued.job, shutdown).await {
            Ok(JobDisposition::Interrupted) => false,
            Ok(_) => true,
            Err(e) => {
                error!(job_id = %job_id, message_id = %queued.message_id, error = %e, "Failed to process job");
                true
            }
        }
    }

    /// Consume an in-memory queue until shutdown or until every producer is gone.
    pub async fn run(&self, mut receiver: JobReceiver, mut shutdown: watch::Receiver<bool>) {
        info!(provider = self.provider.name(), "Starting delivery worker");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let next = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                next = receiver.recv() => next,
            };

            let Some(queued) = next else {
                break;
            };

            if !self.handle(queued, &mut shutdown).await {
                break;
            }
        }

        info!("Delivery worker stopped");
    }

    /// Process and acknowledge a batch in order. False when shutdown stopped
    /// the batch; the remaining entries stay pending for the next run.
    async fn settle_batch(
        &self,
        consumer: &RedisStreamConsumer,
        jobs: Vec<QueuedJob>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        for queued in jobs {
            if *shutdown.borrow() {
                return false;
            }

            let message_id = queued.message_id.clone();
            if !self.handle(queued, shutdown).await {
                return false;
            }
            if let Err(e) = consumer.ack(&message_id).await {
                warn!(message_id = %message_id, error = %e, "Failed to acknowledge job");
            }
        }
        true
    }

    /// Re-run everything this consumer read but never acknowledged
    async fn recover_pending(
        &self,
        consumer: &RedisStreamConsumer,
        shutdown: &mut watch::Receiver<bool>,
    ) -> NotificationResult<bool> {
        let mut cursor = "0".to_string();

        loop {
            let (jobs, last_id) = consumer.read_pending(&cursor, STREAM_BATCH_SIZE).await?;
            let Some(last_id) = last_id else {
                return Ok(true);
            };
            cursor = last_id;

            if !jobs.is_empty() {
                info!(count = jobs.len(), consumer = consumer.consumer_id(), "Redelivering unacknowledged jobs");
            }
            if !self.settle_batch(consumer, jobs, shutdown).await {
                return Ok(false);
            }
        }
    }

    /// Consume a Redis stream through a consumer group until shutdown.
    ///
    /// On start, entries this consumer read but never acknowledged are
    /// processed first. Entries any consumer left idle for longer than the
    /// consumer's claim idle time are claimed and processed on every claim
    /// interval. Jobs are acknowledged after processing, whatever the outcome,
    /// so delivery is at-least-once.
    pub async fn run_stream(
        &self,
        consumer: RedisStreamConsumer,
        mut shutdown: watch::Receiver<bool>,
    ) -> NotificationResult<()> {
        consumer.init_group().await?;
        info!(
            provider = self.provider.name(),
            consumer = consumer.consumer_id(),
            claim_idle_ms = consumer.claim_idle().as_millis() as u64,
            "Starting stream delivery worker"
        );

        match self.recover_pending(&consumer, &mut shutdown).await {
            Ok(true) => {}
            Ok(false) => {
                info!("Stream delivery worker stopped");
                return Ok(());
            }
            Err(e) => warn!(error = %e, "Failed to read pending jobs on startup"),
        }

        let mut consecutive_errors: u32 = 0;
        let mut last_claim: Option<Instant> = None;

        loop {
            if *shutdown.borrow() {
                break;
            }

            if last_claim.is_none_or(|at| at.elapsed() >= consumer.claim_idle()) {
                last_claim = Some(Instant::now());
                match consumer.claim_abandoned(STREAM_BATCH_SIZE).await {
                    Ok(jobs) => {
                        if !self.settle_batch(&consumer, jobs, &mut shutdown).await {
                            break;
                        }
                    }
                    Err(e) => debug!(error = %e, "Error claiming abandoned jobs"),
                }
            }

            let batch = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                batch = consumer.read_new(STREAM_BATCH_SIZE, STREAM_BLOCK_MS) => batch,
            };

            match batch {
                Ok(jobs) => {
                    consecutive_errors = 0;
                    if !self.settle_batch(&consumer, jobs, &mut shutdown).await {
                        break;
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    let backoff_secs = 2u64.pow(consecutive_errors.min(5)).min(30);
                    warn!(
                        error = %e,
                        consecutive_errors,
                        backoff_secs,
                        "Stream read failed, backing off"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(backoff_secs)) => {}
                        _ = shutdown_requested(&mut shutdown) => break,
                    }
                }
            }
        }

        info!("Stream delivery worker stopped");
        Ok(())
    }
}
