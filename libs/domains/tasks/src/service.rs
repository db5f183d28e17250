use email::{HookRegistry, HookReport};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::error::{TaskError, TaskResult};
use crate::models::{CreateOwner, CreateTask, Owner, Task, TaskFilter, UpdateOwner};
use crate::owners::{OwnerDirectory, OwnerStore};
use crate::repository::TaskRepository;

/// A stored task plus what its creation hooks did
#[derive(Debug)]
pub struct CreatedTask {
    pub task: Task,
    pub report: HookReport,
}

/// Service layer for Task business logic
pub struct TaskService<R: TaskRepository> {
    repository: Arc<R>,
    owners: Arc<dyn OwnerStore>,
    hooks: HookRegistry<Task>,
}

impl<R: TaskRepository> TaskService<R> {
    pub fn new(repository: R, owners: Arc<dyn OwnerStore>) -> Self {
        Self {
            repository: Arc::new(repository),
            owners,
            hooks: HookRegistry::new(),
        }
    }

    /// Hooks run after every successful `create_task`
    pub fn with_hooks(mut self, hooks: HookRegistry<Task>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn owners(&self) -> Arc<dyn OwnerStore> {
        self.owners.clone()
    }

    /// Store a task, then run the creation hooks.
    ///
    /// Hook failures never fail the call; they are returned in the report.
    /// If the repository fails, no hook runs.
    #[instrument(skip(self, input), fields(owner_id = %input.owner_id))]
    pub async fn create_task(&self, input: CreateTask) -> TaskResult<CreatedTask> {
        input
            .validate()
            .map_err(|e| TaskError::Validation(e.to_string()))?;

        let task = self.repository.create(input).await?;
        let report = self.hooks.emit_created(&task).await;

        info!(
            task_id = %task.id,
            notified = report.receipts.len(),
            hook_failures = report.failures.len(),
            "Task created"
        );

        Ok(CreatedTask { task, report })
    }

    /// Get a task by ID
    #[instrument(skip(self), fields(task_id = %id))]
    pub async fn get_task(&self, id: Uuid) -> TaskResult<Task> {
        self.repository
            .get_by_id(id)
            .await?
            .ok_or(TaskError::NotFound(id))
    }

    /// List tasks with filters
    pub async fn list_tasks(&self, filter: TaskFilter) -> TaskResult<Vec<Task>> {
        self.repository.list(filter).await
    }

    #[instrument(skip(self, input))]
    pub fn create_owner(&self, input: CreateOwner) -> TaskResult<Owner> {
        input
            .validate()
            .map_err(|e| TaskError::Validation(e.to_string()))?;

        Ok(self.owners.create(input))
    }

    pub fn get_owner(&self, id: Uuid) -> TaskResult<Owner> {
        self.owners.find(id).ok_or(TaskError::OwnerNotFound(id))
    }

    #[instrument(skip(self, input), fields(owner_id = %id))]
    pub fn update_owner(&self, id: Uuid, input: UpdateOwner) -> TaskResult<Owner> {
        input
            .validate()
            .map_err(|e| TaskError::Validation(e.to_string()))?;

        self.owners
            .update(id, input)
            .ok_or(TaskError::OwnerNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::owners::InMemoryOwnerDirectory;
    use crate::repository::MockTaskRepository;
    use async_trait::async_trait;
    use email::{CreationHook, DeliveryReceipt, NotificationResult};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct CountingHook {
        calls: AtomicU32,
    }

    #[async_trait]
    impl CreationHook<Task> for CountingHook {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn on_created(&self, _task: &Task) -> NotificationResult<DeliveryReceipt> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(email::NotificationError::Render("not under test".to_string()))
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_runs_no_hooks() {
        let mut repo = MockTaskRepository::new();
        repo.expect_create()
            .times(1)
            .returning(|_| Err(TaskError::Internal("disk full".to_string())));

        let hook = Arc::new(CountingHook::default());
        let service = TaskService::new(repo, Arc::new(InMemoryOwnerDirectory::new()))
            .with_hooks(HookRegistry::new().with_hook(hook.clone()));

        let result = service
            .create_task(CreateTask {
                content: "Buy milk".to_string(),
                owner_id: Uuid::new_v4(),
            })
            .await;

        assert!(matches!(result, Err(TaskError::Internal(_))));
        assert_eq!(hook.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_validation_failure_skips_repository() {
        let mut repo = MockTaskRepository::new();
        repo.expect_create().times(0);

        let service = TaskService::new(repo, Arc::new(InMemoryOwnerDirectory::new()));
        let result = service
            .create_task(CreateTask {
                content: "x".repeat(10_001),
                owner_id: Uuid::new_v4(),
            })
            .await;

        assert!(matches!(result, Err(TaskError::Validation(_))));
    }

    #[tokio::test]
    async fn test_hook_failure_does_not_fail_creation() {
        let mut repo = MockTaskRepository::new();
        repo.expect_create().returning(|input| Ok(Task::new(input)));

        let hook = Arc::new(CountingHook::default());
        let service = TaskService::new(repo, Arc::new(InMemoryOwnerDirectory::new()))
            .with_hooks(HookRegistry::new().with_hook(hook.clone()));

        let created = service
            .create_task(CreateTask {
                content: "Buy milk".to_string(),
                owner_id: Uuid::new_v4(),
            })
            .await
            .unwrap();

        assert_eq!(created.task.content, "Buy milk");
        assert_eq!(hook.calls.load(Ordering::SeqCst), 1);
        assert!(created.report.failure("counting").is_some());
    }

    #[tokio::test]
    async fn test_get_missing_task() {
        let mut repo = MockTaskRepository::new();
        repo.expect_get_by_id().returning(|_| Ok(None));

        let service = TaskService::new(repo, Arc::new(InMemoryOwnerDirectory::new()));
        let id = Uuid::new_v4();

        assert!(matches!(service.get_task(id).await, Err(TaskError::NotFound(found)) if found == id));
    }

    /// Read-only store holding a single owner
    struct FixedOwner(Owner);

    impl OwnerDirectory for FixedOwner {
        fn find(&self, id: Uuid) -> Option<Owner> {
            (id == self.0.id).then(|| self.0.clone())
        }

        fn upsert(&self, _owner: Owner) {}
    }

    impl OwnerStore for FixedOwner {
        fn create(&self, _input: CreateOwner) -> Owner {
            self.0.clone()
        }

        fn update(&self, _id: Uuid, _input: UpdateOwner) -> Option<Owner> {
            None
        }
    }

    #[test]
    fn test_owner_calls_go_through_the_store() {
        let fixed = Owner::new(CreateOwner {
            email: "fixed@example.com".to_string(),
            name: None,
        });
        let service = TaskService::new(MockTaskRepository::new(), Arc::new(FixedOwner(fixed.clone())));

        assert_eq!(service.get_owner(fixed.id).unwrap(), fixed);
        assert!(matches!(
            service.get_owner(Uuid::new_v4()),
            Err(TaskError::OwnerNotFound(_))
        ));

        let created = service
            .create_owner(CreateOwner {
                email: "new@example.com".to_string(),
                name: None,
            })
            .unwrap();
        assert_eq!(created, fixed);

        assert!(matches!(
            service.update_owner(fixed.id, UpdateOwner::default()),
            Err(TaskError::OwnerNotFound(id)) if id == fixed.id
        ));
        assert_eq!(service.owners().find(fixed.id), Some(fixed));
    }
}
