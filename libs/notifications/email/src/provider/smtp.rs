//! SMTP transmission provider using lettre

use super::{DeliveryFailure, SendResult, TransmissionProvider};
use crate::models::NotificationJob;
use async_trait::async_trait;
use core_config::{env_flag, env_or_default, env_parse, env_required, ConfigError, FromEnv};
use eyre::{Result, WrapErr};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;

/// SMTP provider configuration
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
    pub use_tls: bool,
}

impl SmtpConfig {
    /// Local catcher such as Mailpit on localhost:1025, no auth, no TLS
    pub fn local() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1025,
            username: String::new(),
            password: String::new(),
            from_email: "noreply@localhost".to_string(),
            from_name: "Development".to_string(),
            use_tls: false,
        }
    }

    fn domain(&self) -> &str {
        self.from_email
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .unwrap_or("localhost")
    }
}

impl FromEnv for SmtpConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_required("SMTP_HOST")?,
            port: env_parse("SMTP_PORT", 587u16)?,
            username: env_or_default("SMTP_USERNAME", ""),
            password: env_or_default("SMTP_PASSWORD", ""),
            from_email: env_required("EMAIL_FROM_ADDRESS")?,
            from_name: env_or_default("EMAIL_FROM_NAME", "Notifications"),
            use_tls: env_flag("SMTP_USE_TLS", true),
        })
    }
}

/// SMTP transmission provider
pub struct SmtpProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    config: Arc<SmtpConfig>,
}

impl SmtpProvider {
    pub fn new(config: SmtpConfig) -> Result<Self> {
        let transport = if config.use_tls {
            let creds = Credentials::new(config.username.clone(), config.password.clone());
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .wrap_err("Failed to create SMTP relay")?
                .credentials(creds)
                .port(config.port)
                .build()
        } else if !config.username.is_empty() {
            let creds = Credentials::new(config.username.clone(), config.password.clone());
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .credentials(creds)
                .port(config.port)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .port(config.port)
                .build()
        };

        Ok(Self {
            transport,
            config: Arc::new(config),
        })
    }

    pub fn from_env() -> Result<Self> {
        let config = SmtpConfig::from_env().wrap_err("Invalid SMTP configuration")?;
        Self::new(config)
    }

    /// Message-ID derived from the job ID, so a redelivered job carries the
    /// same header and receivers can drop the duplicate.
    fn message_id(&self, job: &NotificationJob) -> String {
        format!("<{}@{}>", job.id, self.config.domain())
    }

    fn build_message(&self, job: &NotificationJob) -> Result<Message, DeliveryFailure> {
        let from: Mailbox = format!("{} <{}>", self.config.from_name, self.config.from_email)
            .parse()
            .map_err(|e| DeliveryFailure::rejected(format!("invalid from address: {}", e)))?;

        let to: Mailbox = job
            .recipient()
            .parse()
            .map_err(|e| DeliveryFailure::invalid_recipient(format!("{}: {}", job.recipient(), e)))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(job.subject())
            .message_id(Some(self.message_id(job)))
            .header(ContentType::TEXT_PLAIN)
            .body(job.body().to_string())
            .map_err(|e| DeliveryFailure::rejected(format!("failed to build message: {}", e)))
    }
}

/// Map an SMTP error onto the retry classification.
///
/// 5xx mailbox codes (550, 551, 553) mean the address is bad; other 5xx codes
/// are policy rejections. 421 and 452 mean the server wants us to slow down.
/// Everything else, including connection and TLS errors, is transient.
fn classify(err: &lettre::transport::smtp::Error) -> DeliveryFailure {
    let code = err.status().map(|c| c.to_string()).unwrap_or_default();
    let message = err.to_string();

    if err.is_permanent() {
        match code.as_str() {
            "550" | "551" | "553" => DeliveryFailure::invalid_recipient(message),
            _ => DeliveryFailure::rejected(message),
        }
    } else if matches!(code.as_str(), "421" | "452") {
        DeliveryFailure::throttled(message)
    } else {
        DeliveryFailure::transient(message)
    }
}

#[async_trait]
impl TransmissionProvider for SmtpProvider {
    async fn transmit(&self, job: &NotificationJob) -> Result<SendResult, DeliveryFailure> {
        let message = self.build_message(job)?;

        let response = self.transport.send(message).await.map_err(|e| classify(&e))?;

        let message_id = response
            .message()
            .next()
            .map(|s| s.to_string())
            .unwrap_or_else(|| self.message_id(job));

        tracing::info!(
            job_id = %job.id,
            to = %job.recipient(),
            subject = %job.subject(),
            "Notification sent via SMTP"
        );

        Ok(SendResult { message_id })
    }

    async fn health_check(&self) -> Result<()> {
        self.transport
            .test_connection()
            .await
            .wrap_err("SMTP health check failed")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}
