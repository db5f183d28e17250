//! Transactional notification library
//!
//! Sends one notification to the owner of a newly created entity, without
//! letting notification trouble fail the creation.
//!
//! ## Components
//!
//! - **Trigger**: `HookRegistry` / `CreationHook` run after an entity is
//!   stored; `NotificationTrigger` turns an event into exactly one job
//! - **Renderer**: Handlebars-based `TemplateEngine` with the built-in
//!   `task_created` template
//! - **Delivery**: `DeliveryBackend` with immediate, deferred and captured
//!   strategies, chosen once from `DeliverySettings`
//! - **Deferred path**: `WorkQueue` (in-memory or Redis stream) and the
//!   retrying `DeliveryWorker`
//! - **Capture mode**: `CaptureStore` plus an axum `viewer` for inspecting
//!   what would have been sent
//!
//! ## Usage
//!
//! ```ignore
//! use email::{DeliveryBackend, DeliveryConfig, NotificationTrigger, TemplateEngine};
//!
//! let backend = DeliveryBackend::new(
//!     DeliveryConfig::new(environment, settings.strategy).with_capture_store(store),
//! )?;
//! let trigger = NotificationTrigger::new(Arc::new(TemplateEngine::new()?), Arc::new(backend));
//! let receipt = trigger.dispatch(&notice).await?;
//! ```

pub mod backend;
pub mod capture;
pub mod error;
pub mod hooks;
pub mod metrics;
pub mod models;
pub mod provider;
pub mod queue;
pub mod settings;
pub mod templates;
pub mod trigger;
pub mod viewer;
pub mod worker;

pub use backend::{DeliveryBackend, DeliveryConfig};
pub use capture::{CaptureStore, DeliveryRecord};
pub use error::{NotificationError, NotificationResult};
pub use hooks::{CreationHook, HookFailure, HookRegistry, HookReport};
pub use models::{
    DeliveryReceipt, DeliveryReference, DeliveryStatus, DeliveryStrategy, Notification,
    NotificationJob,
};
pub use provider::{
    DeliveryFailure, FailureKind, MockProvider, SendResult, SmtpConfig, SmtpProvider,
    TransmissionProvider,
};
pub use queue::{
    InMemoryQueue, JobReceiver, RedisStreamConsumer, RedisStreamQueue, WorkQueue, DEFAULT_CLAIM_IDLE,
};
pub use settings::DeliverySettings;
pub use templates::{NotificationSource, NotificationTemplate, RenderedTemplate, TemplateEngine};
pub use trigger::NotificationTrigger;
pub use worker::{DeliveryWorker, FailureLog, JobDisposition, RetryPolicy, DEFAULT_DEDUP_CAPACITY};
