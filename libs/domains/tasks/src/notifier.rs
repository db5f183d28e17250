//! Task-created notification hook

use async_trait::async_trait;
use email::templates::TASK_CREATED;
use email::{
    CreationHook, DeliveryReceipt, NotificationError, NotificationResult, NotificationSource,
    NotificationTrigger,
};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Owner, Task};
use crate::owners::OwnerDirectory;

/// Copy of a new task and its owner, taken when the hook runs.
///
/// Later changes to the owner do not reach a notice that was already built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCreatedNotice {
    pub task_id: Uuid,
    pub task_content: String,
    pub owner_id: Uuid,
    pub owner_email: String,
    pub owner_name: Option<String>,
}

impl TaskCreatedNotice {
    pub fn snapshot(task: &Task, owner: &Owner) -> Self {
        Self {
            task_id: task.id,
            task_content: task.content.clone(),
            owner_id: owner.id,
            owner_email: owner.email.clone(),
            owner_name: owner.name.clone(),
        }
    }
}

impl NotificationSource for TaskCreatedNotice {
    fn template(&self) -> &str {
        TASK_CREATED
    }

    fn source_id(&self) -> String {
        format!("task:{}", self.task_id)
    }

    fn recipient(&self) -> Option<&str> {
        Some(self.owner_email.as_str()).filter(|email| !email.is_empty())
    }

    fn context(&self) -> Value {
        json!({
            "task_id": self.task_id.to_string(),
            "task_content": self.task_content,
            "owner_email": self.owner_email,
            "owner_name": self.owner_name,
        })
    }
}

/// Emails the owner of every newly created task
pub struct TaskNotifier {
    owners: Arc<dyn OwnerDirectory>,
    trigger: NotificationTrigger,
}

impl TaskNotifier {
    pub const NAME: &'static str = "task_created_notifier";

    pub fn new(owners: Arc<dyn OwnerDirectory>, trigger: NotificationTrigger) -> Self {
        Self { owners, trigger }
    }
}

#[async_trait]
impl CreationHook<Task> for TaskNotifier {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn on_created(&self, task: &Task) -> NotificationResult<DeliveryReceipt> {
        let owner = self.owners.find(task.owner_id).ok_or_else(|| {
            NotificationError::MissingRecipient(format!("owner {} not found", task.owner_id))
        })?;

        let notice = TaskCreatedNotice::snapshot(task, &owner);
        self.trigger.dispatch(&notice).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::owners::MockOwnerDirectory;
    use chrono::Utc;
    use core_config::Environment;
    use email::{CaptureStore, DeliveryBackend, DeliveryConfig, DeliveryStrategy, TemplateEngine};

    fn task(owner_id: Uuid) -> Task {
        Task {
            id: Uuid::new_v4(),
            content: "Buy milk".to_string(),
            owner_id,
            created_at: Utc::now(),
        }
    }

    fn owner(email: &str) -> Owner {
        Owner {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn captured_trigger(store: &CaptureStore) -> NotificationTrigger {
        let backend = DeliveryBackend::new(
            DeliveryConfig::new(Environment::Test, DeliveryStrategy::Captured)
                .with_capture_store(store.clone()),
        )
        .unwrap();
        NotificationTrigger::new(Arc::new(TemplateEngine::new().unwrap()), Arc::new(backend))
    }

    #[test]
    fn test_notice_context() {
        let owner = owner("a@example.com");
        let task = task(owner.id);
        let notice = TaskCreatedNotice::snapshot(&task, &owner);

        assert_eq!(notice.source_id(), format!("task:{}", task.id));
        assert_eq!(notice.recipient(), Some("a@example.com"));
        assert_eq!(notice.context()["task_content"], "Buy milk");
    }

    #[test]
    fn test_empty_email_means_no_recipient() {
        let owner = owner("");
        let notice = TaskCreatedNotice::snapshot(&task(owner.id), &owner);
        assert_eq!(notice.recipient(), None);
    }

    #[tokio::test]
    async fn test_owner_is_resolved_through_directory() {
        let owner = owner("a@example.com");
        let task = task(owner.id);
        let owner_id = owner.id;

        let mut directory = MockOwnerDirectory::new();
        directory
            .expect_find()
            .withf(move |id| *id == owner_id)
            .times(1)
            .returning(move |_| Some(owner.clone()));

        let store = CaptureStore::new();
        let notifier = TaskNotifier::new(Arc::new(directory), captured_trigger(&store));

        let receipt = notifier.on_created(&task).await.unwrap();
        assert_eq!(receipt.recipient, "a@example.com");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_owner_is_missing_recipient() {
        let mut directory = MockOwnerDirectory::new();
        directory.expect_find().returning(|_| None);

        let store = CaptureStore::new();
        let notifier = TaskNotifier::new(Arc::new(directory), captured_trigger(&store));

        let err = notifier.on_created(&task(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, NotificationError::MissingRecipient(_)));
        assert!(store.is_empty().await);
    }
}
