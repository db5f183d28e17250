//! Work queues for deferred delivery
//!
//! - `InMemoryQueue`: tokio channel, consumed in-process by `DeliveryWorker`
//! - `RedisStreamQueue`: Redis stream, read back through `RedisStreamConsumer`
//!
//! Producers only enqueue. Enqueueing never waits on delivery.

use crate::error::{NotificationError, NotificationResult};
use crate::models::NotificationJob;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Producer side of a durable work queue
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueue a job and return the queue's message ID
    async fn enqueue(&self, job: &NotificationJob) -> NotificationResult<String>;

    fn name(&self) -> &'static str;
}

/// Job as handed to a consumer
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub message_id: String,
    pub job: NotificationJob,
}

/// In-process queue backed by an unbounded tokio channel
#[derive(Clone)]
pub struct InMemoryQueue {
    sender: mpsc::UnboundedSender<QueuedJob>,
    next_id: Arc<AtomicU64>,
}

/// Consumer side of an `InMemoryQueue`
pub struct JobReceiver {
    receiver: mpsc::UnboundedReceiver<QueuedJob>,
}

impl InMemoryQueue {
    pub fn channel() -> (Self, JobReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender,
                next_id: Arc::new(AtomicU64::new(0)),
            },
            JobReceiver { receiver },
        )
    }
}

impl JobReceiver {
    /// Wait for the next job. `None` once every producer handle is dropped.
    pub async fn recv(&mut self) -> Option<QueuedJob> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<QueuedJob> {
        self.receiver.try_recv().ok()
    }
}

#[async_trait]
impl WorkQueue for InMemoryQueue {
    async fn enqueue(&self, job: &NotificationJob) -> NotificationResult<String> {
        let message_id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);

        self.sender
            .send(QueuedJob {
                message_id: message_id.clone(),
                job: job.clone(),
            })
            .map_err(|_| NotificationError::Queue("in-memory queue receiver dropped".to_string()))?;

        debug!(job_id = %job.id, message_id = %message_id, "Enqueued job in memory");
        Ok(message_id)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Redis stream settings for notification jobs
pub struct NotificationStream;

impl NotificationStream {
    pub const STREAM_NAME: &'static str = "notifications:jobs";
    pub const MAX_LENGTH: i64 = 100_000;
    /// Field holding the JSON-encoded `NotificationJob`
    pub const JOB_FIELD: &'static str = "job";
}

/// Producer for a Redis stream (XADD with approximate MAXLEN trimming)
#[derive(Clone)]
pub struct RedisStreamQueue {
    redis: ConnectionManager,
    stream_name: String,
    max_length: i64,
}

impl RedisStreamQueue {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis,
            stream_name: NotificationStream::STREAM_NAME.to_string(),
            max_length: NotificationStream::MAX_LENGTH,
        }
    }

    pub async fn connect(url: &str) -> NotificationResult<Self> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self::new(manager))
    }

    pub fn with_stream(mut self, stream_name: impl Into<String>) -> Self {
        self.stream_name = stream_name.into();
        self
    }

    pub fn with_max_length(mut self, max_length: i64) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    pub async fn stream_length(&self) -> NotificationResult<i64> {
        let mut conn = self.redis.clone();
        let len: i64 = redis::cmd("XLEN")
            .arg(&self.stream_name)
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }
}

#[async_trait]
impl WorkQueue for RedisStreamQueue {
    async fn enqueue(&self, job: &NotificationJob) -> NotificationResult<String> {
        let mut conn = self.redis.clone();
        let job_json = serde_json::to_string(job)?;

        let message_id: String = redis::cmd("XADD")
            .arg(&self.stream_name)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_length)
            .arg("*")
            .arg(NotificationStream::JOB_FIELD)
            .arg(&job_json)
            .arg("source")
            .arg(&job.source)
            .query_async(&mut conn)
            .await?;

        debug!(
            stream = %self.stream_name,
            message_id = %message_id,
            job_id = %job.id,
            "Enqueued job"
        );

        Ok(message_id)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Stream entry as returned by XREADGROUP / XCLAIM. Fields are nil when the
/// entry was trimmed from the stream while still pending.
type StreamEntry = (String, Option<Vec<(String, String)>>);
type StreamReply = Vec<(String, Vec<StreamEntry>)>;

/// XPENDING extended form: message ID, owning consumer, idle ms, delivery count
pub type PendingEntry = (String, String, u64, u64);

/// Idle time after which an unacknowledged entry may be claimed by any consumer
pub const DEFAULT_CLAIM_IDLE: Duration = Duration::from_secs(300);

/// Consumer-group reader for a notification stream
#[derive(Clone)]
pub struct RedisStreamConsumer {
    redis: ConnectionManager,
    stream_name: String,
    group: String,
    consumer_id: String,
    claim_idle: Duration,
}

impl RedisStreamConsumer {
    pub fn new(
        redis: ConnectionManager,
        group: impl Into<String>,
        consumer_id: impl Into<String>,
    ) -> Self {
        Self {
            redis,
            stream_name: NotificationStream::STREAM_NAME.to_string(),
            group: group.into(),
            consumer_id: consumer_id.into(),
            claim_idle: DEFAULT_CLAIM_IDLE,
        }
    }

    pub fn with_stream(mut self, stream_name: impl Into<String>) -> Self {
        self.stream_name = stream_name.into();
        self
    }

    /// How long an entry must sit unacknowledged before `claim_abandoned` takes it
    pub fn with_claim_idle(mut self, claim_idle: Duration) -> Self {
        self.claim_idle = claim_idle;
        self
    }

    pub fn consumer_id(&self) -> &str {
        &self.consumer_id
    }

    pub fn claim_idle(&self) -> Duration {
        self.claim_idle
    }

    /// Create the consumer group if it does not exist yet
    pub async fn init_group(&self) -> NotificationResult<()> {
        let mut conn = self.redis.clone();

        let result: redis::RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream_name)
            .arg(&self.group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => {
                debug!(stream = %self.stream_name, group = %self.group, "Created consumer group");
                Ok(())
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Read up to `count` new jobs, blocking for at most `block_ms`
    pub async fn read_new(&self, count: usize, block_ms: u64) -> NotificationResult<Vec<QueuedJob>> {
        let mut conn = self.redis.clone();

        let reply: Option<StreamReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer_id)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("COUNT")
            .arg(count)
            .arg("STREAMS")
            .arg(&self.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let entries = reply.unwrap_or_default().into_iter().flat_map(|(_, e)| e);
        Ok(self.collect(entries).await.0)
    }

    /// Read jobs delivered to this consumer but never acknowledged, after the
    /// stream ID `after` (`"0"` for the start of the pending list).
    ///
    /// Returns the jobs and the ID of the last entry in the reply, which is the
    /// cursor for the next page. `None` means the pending list is exhausted.
    pub async fn read_pending(
        &self,
        after: &str,
        count: usize,
    ) -> NotificationResult<(Vec<QueuedJob>, Option<String>)> {
        let mut conn = self.redis.clone();

        let reply: Option<StreamReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer_id)
            .arg("COUNT")
            .arg(count)
            .arg("STREAMS")
            .arg(&self.stream_name)
            .arg(after)
            .query_async(&mut conn)
            .await?;

        let entries = reply.unwrap_or_default().into_iter().flat_map(|(_, e)| e);
        Ok(self.collect(entries).await)
    }

    /// Pending entries of the whole group, oldest first
    pub async fn pending(&self, count: usize) -> NotificationResult<Vec<PendingEntry>> {
        let mut conn = self.redis.clone();

        let result: redis::RedisResult<Vec<PendingEntry>> = redis::cmd("XPENDING")
            .arg(&self.stream_name)
            .arg(&self.group)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await;

        match result {
            Ok(entries) => Ok(entries),
            Err(e) if e.to_string().contains("NOGROUP") => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Take over entries that any consumer left unacknowledged for longer
    /// than the claim idle time.
    pub async fn claim_abandoned(&self, count: usize) -> NotificationResult<Vec<QueuedJob>> {
        let min_idle_ms = u64::try_from(self.claim_idle.as_millis()).unwrap_or(u64::MAX);

        let claim_ids: Vec<String> = self
            .pending(count)
            .await?
            .into_iter()
            .filter(|(_, _, idle_ms, _)| *idle_ms >= min_idle_ms)
            .map(|(id, _, _, _)| id)
            .collect();

        if claim_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.redis.clone();
        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(&self.stream_name)
            .arg(&self.group)
            .arg(&self.consumer_id)
            .arg(min_idle_ms);
        for id in &claim_ids {
            cmd.arg(id);
        }

        let entries: Vec<Option<StreamEntry>> = cmd.query_async(&mut conn).await?;
        let (jobs, _) = self.collect(entries.into_iter().flatten()).await;

        if !jobs.is_empty() {
            warn!(count = jobs.len(), consumer = %self.consumer_id, "Claimed abandoned jobs");
        }

        Ok(jobs)
    }

    pub async fn ack(&self, message_id: &str) -> NotificationResult<()> {
        let mut conn = self.redis.clone();

        let _: i64 = redis::cmd("XACK")
            .arg(&self.stream_name)
            .arg(&self.group)
            .arg(message_id)
            .query_async(&mut conn)
            .await?;

        debug!(message_id = %message_id, "Acknowledged job");
        Ok(())
    }

    /// Decode entries into jobs. Entries that can never be processed are
    /// acknowledged here so they leave the pending list.
    async fn collect(
        &self,
        entries: impl IntoIterator<Item = StreamEntry>,
    ) -> (Vec<QueuedJob>, Option<String>) {
        let mut jobs = Vec::new();
        let mut last_id = None;

        for (message_id, fields) in entries {
            last_id = Some(message_id.clone());

            let json = fields.as_ref().and_then(|fields| {
                fields
                    .iter()
                    .find(|(k, _)| k == NotificationStream::JOB_FIELD)
                    .map(|(_, v)| v.as_str())
            });

            let parsed = match json {
                Some(json) => serde_json::from_str::<NotificationJob>(json).map_err(|e| e.to_string()),
                None if fields.is_none() => Err("entry was trimmed from the stream".to_string()),
                None => Err("missing 'job' field".to_string()),
            };

            match parsed {
                Ok(job) => jobs.push(QueuedJob { message_id, job }),
                Err(reason) => {
                    warn!(message_id = %message_id, reason = %reason, "Dropping unreadable stream entry");
                    if let Err(e) = self.ack(&message_id).await {
                        warn!(message_id = %message_id, error = %e, "Failed to acknowledge unreadable entry");
                    }
                }
            }
        }

        (jobs, last_id)
    }
}
