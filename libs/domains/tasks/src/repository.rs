use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::TaskResult;
use crate::models::{CreateTask, Task, TaskFilter};

/// Repository trait for Task persistence
///
/// `create` returns only once the task is durably stored. Creation hooks
/// rely on that.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Create a new task
    async fn create(&self, input: CreateTask) -> TaskResult<Task>;

    /// Get a task by ID
    async fn get_by_id(&self, id: Uuid) -> TaskResult<Option<Task>>;

    /// List tasks with optional filters, oldest first
    async fn list(&self, filter: TaskFilter) -> TaskResult<Vec<Task>>;

    /// Count all tasks
    async fn count(&self) -> TaskResult<usize>;
}

/// In-memory implementation of TaskRepository (for development/testing)
#[derive(Debug, Default, Clone)]
pub struct InMemoryTaskRepository {
    /// Insertion order is creation order
    tasks: Arc<RwLock<Vec<Task>>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn create(&self, input: CreateTask) -> TaskResult<Task> {
        let task = Task::new(input);
        self.tasks.write().await.push(task.clone());

        tracing::info!(task_id = %task.id, owner_id = %task.owner_id, "Created task");
        Ok(task)
    }

    async fn get_by_id(&self, id: Uuid) -> TaskResult<Option<Task>> {
        Ok(self.tasks.read().await.iter().find(|t| t.id == id).cloned())
    }

    async fn list(&self, filter: TaskFilter) -> TaskResult<Vec<Task>> {
        let tasks = self.tasks.read().await;

        Ok(tasks
            .iter()
            .filter(|t| filter.owner_id.is_none_or(|owner_id| t.owner_id == owner_id))
            .skip(filter.offset)
            .take(filter.limit)
            .cloned()
            .collect())
    }

    async fn count(&self) -> TaskResult<usize> {
        Ok(self.tasks.read().await.len())
    }
}
