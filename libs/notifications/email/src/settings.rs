use crate::models::DeliveryStrategy;
use crate::queue::{NotificationStream, DEFAULT_CLAIM_IDLE};
use crate::worker::{RetryPolicy, DEFAULT_DEDUP_CAPACITY};
use core_config::{env_or_default, env_parse, env_required, ConfigError, Environment, FromEnv};
use std::time::Duration;

/// Delivery settings read once at process start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverySettings {
    pub environment: Environment,
    pub strategy: DeliveryStrategy,
    pub retry: RetryPolicy,
    /// Deferred jobs go to this Redis instance when set, otherwise to an in-process queue
    pub redis_url: Option<String>,
    pub stream_name: String,
    /// Stream entries unacknowledged for this long are claimed from their consumer
    pub claim_idle: Duration,
    /// Recently handled job IDs the worker remembers
    pub dedup_capacity: usize,
}

impl DeliverySettings {
    /// Deferred in production, captured everywhere else
    pub fn default_strategy(environment: Environment) -> DeliveryStrategy {
        if environment.is_production() {
            DeliveryStrategy::Deferred
        } else {
            DeliveryStrategy::Captured
        }
    }

    pub fn load(environment: Environment) -> Result<Self, ConfigError> {
        let strategy = env_parse(
            "NOTIFY_DELIVERY_STRATEGY",
            Self::default_strategy(environment),
        )?;

        if strategy == DeliveryStrategy::Captured && environment.is_production() {
            return Err(ConfigError::Invalid(
                "NOTIFY_DELIVERY_STRATEGY=captured is not allowed in production".to_string(),
            ));
        }

        Ok(Self {
            environment,
            strategy,
            retry: RetryPolicy::from_env()?,
            redis_url: env_required("REDIS_URL").ok(),
            stream_name: env_or_default("NOTIFY_STREAM", NotificationStream::STREAM_NAME),
            claim_idle: Duration::from_millis(env_parse(
                "NOTIFY_CLAIM_IDLE_MS",
                DEFAULT_CLAIM_IDLE.as_millis() as u64,
            )?),
            dedup_capacity: env_parse("NOTIFY_DEDUP_CAPACITY", DEFAULT_DEDUP_CAPACITY)?,
        })
    }
}

impl FromEnv for DeliverySettings {
    fn from_env() -> Result<Self, ConfigError> {
        Self::load(Environment::from_env())
    }
}
