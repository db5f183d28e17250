//! Notification trigger
//!
//! Turns one domain event into exactly one job and hands it to the backend.

use crate::backend::DeliveryBackend;
use crate::error::{NotificationError, NotificationResult};
use crate::models::{DeliveryReceipt, Notification, NotificationJob};
use crate::templates::{NotificationSource, TemplateEngine};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, instrument};
use validator::ValidateEmail;

#[derive(Clone)]
pub struct NotificationTrigger {
    engine: Arc<TemplateEngine>,
    backend: Arc<DeliveryBackend>,
}

impl NotificationTrigger {
    pub fn new(engine: Arc<TemplateEngine>, backend: Arc<DeliveryBackend>) -> Self {
        Self { engine, backend }
    }

    pub fn backend(&self) -> &DeliveryBackend {
        &self.backend
    }

    /// Check the recipient, render, build one job, and deliver it.
    ///
    /// Nothing reaches the backend unless the recipient is valid and the
    /// template renders.
    #[instrument(skip_all, fields(source = %source.source_id(), template = source.template()))]
    pub async fn dispatch(&self, source: &dyn NotificationSource) -> NotificationResult<DeliveryReceipt> {
        let recipient = checked_recipient(source)?;
        let rendered = self.engine.render_source(source)?;

        let job = NotificationJob::new(
            source.source_id(),
            Notification {
                recipient,
                subject: rendered.subject,
                body: rendered.body,
                created_at: Utc::now(),
            },
        );

        debug!(job_id = %job.id, strategy = %self.backend.strategy(), "Dispatching notification");
        self.backend.deliver(job).await
    }
}

fn checked_recipient(source: &dyn NotificationSource) -> NotificationResult<String> {
    let recipient = source.recipient().map(str::trim).unwrap_or_default();

    if recipient.is_empty() {
        return Err(NotificationError::MissingRecipient(format!(
            "{} has no contact address",
            source.source_id()
        )));
    }

    if !recipient.validate_email() {
        return Err(NotificationError::MissingRecipient(format!(
            "{} has an invalid contact address: {}",
            source.source_id(),
            recipient
        )));
    }

    Ok(recipient.to_string())
}
