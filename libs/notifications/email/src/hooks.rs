//! Creation hooks
//!
//! Domain services own a `HookRegistry<E>` and call `emit_created` after an
//! entity has been stored. A failing hook never fails the creation; its error
//! is logged and returned in the [`HookReport`].

use crate::error::{NotificationError, NotificationResult};
use crate::models::DeliveryReceipt;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Reaction to the creation of an entity of type `E`
#[async_trait]
pub trait CreationHook<E>: Send + Sync {
    /// Name used in logs and reports
    fn name(&self) -> &'static str;

    async fn on_created(&self, entity: &E) -> NotificationResult<DeliveryReceipt>;
}

/// A hook that returned an error
#[derive(Debug)]
pub struct HookFailure {
    pub hook: &'static str,
    pub error: NotificationError,
}

/// What the hooks did for one creation event
#[derive(Debug, Default)]
pub struct HookReport {
    pub receipts: Vec<DeliveryReceipt>,
    pub failures: Vec<HookFailure>,
}

impl HookReport {
    /// True when every hook succeeded
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failure(&self, hook: &str) -> Option<&NotificationError> {
        self.failures
            .iter()
            .find(|f| f.hook == hook)
            .map(|f| &f.error)
    }
}

/// Ordered set of creation hooks
pub struct HookRegistry<E> {
    hooks: Vec<Arc<dyn CreationHook<E>>>,
}

impl<E> Default for HookRegistry<E> {
    fn default() -> Self {
        Self { hooks: Vec::new() }
    }
}

impl<E: Send + Sync> HookRegistry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Arc<dyn CreationHook<E>>) {
        debug!(hook = hook.name(), "Registered creation hook");
        self.hooks.push(hook);
    }

    pub fn with_hook(mut self, hook: Arc<dyn CreationHook<E>>) -> Self {
        self.register(hook);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every hook once, in registration order.
    pub async fn emit_created(&self, entity: &E) -> HookReport {
        let mut report = HookReport::default();

        for hook in &self.hooks {
            match hook.on_created(entity).await {
                Ok(receipt) => report.receipts.push(receipt),
                Err(error) => {
                    warn!(hook = hook.name(), error = %error, "Creation hook failed");
                    report.failures.push(HookFailure {
                        hook: hook.name(),
                        error,
                    });
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeliveryReference, DeliveryStatus, DeliveryStrategy};
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    struct Widget {
        owner: Option<String>,
    }

    #[derive(Default)]
    struct CountingHook {
        calls: AtomicU32,
    }

    #[async_trait]
    impl CreationHook<Widget> for CountingHook {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn on_created(&self, widget: &Widget) -> NotificationResult<DeliveryReceipt> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let recipient = widget
                .owner
                .clone()
                .ok_or_else(|| NotificationError::MissingRecipient("widget owner".to_string()))?;

            Ok(DeliveryReceipt {
                job_id: Uuid::new_v4(),
                recipient,
                strategy: DeliveryStrategy::Captured,
                status: DeliveryStatus::Captured,
                reference: DeliveryReference::Captured { sequence: 1 },
            })
        }
    }

    #[tokio::test]
    async fn test_each_hook_runs_once() {
        let hook = Arc::new(CountingHook::default());
        let registry = HookRegistry::new().with_hook(hook.clone());

        let report = registry
            .emit_created(&Widget {
                owner: Some("a@example.com".to_string()),
            })
            .await;

        assert!(report.is_clean());
        assert_eq!(report.receipts.len(), 1);
        assert_eq!(hook.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_are_collected_not_raised() {
        let registry = HookRegistry::new().with_hook(Arc::new(CountingHook::default()));

        let report = registry.emit_created(&Widget { owner: None }).await;

        assert!(!report.is_clean());
        assert!(report.receipts.is_empty());
        assert!(matches!(
            report.failure("counting"),
            Some(NotificationError::MissingRecipient(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let registry: HookRegistry<Widget> = HookRegistry::new();
        assert!(registry.is_empty());

        let report = registry.emit_created(&Widget { owner: None }).await;
        assert!(report.is_clean());
        assert!(report.receipts.is_empty());
    }
}
