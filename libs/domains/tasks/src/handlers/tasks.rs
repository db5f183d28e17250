use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use email::DeliveryReceipt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{TaskError, TaskResult};
use crate::models::{CreateTask, Task, TaskFilter};
use crate::repository::TaskRepository;
use crate::service::{CreatedTask, TaskService};

/// A creation hook that did not deliver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationFailure {
    pub hook: String,
    pub error: String,
}

/// Response body for `POST /tasks`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCreatedResponse {
    pub task: Task,
    pub notifications: Vec<DeliveryReceipt>,
    pub notification_failures: Vec<NotificationFailure>,
}

impl From<CreatedTask> for TaskCreatedResponse {
    fn from(created: CreatedTask) -> Self {
        Self {
            task: created.task,
            notifications: created.report.receipts,
            notification_failures: created
                .report
                .failures
                .into_iter()
                .map(|f| NotificationFailure {
                    hook: f.hook.to_string(),
                    error: f.error.to_string(),
                })
                .collect(),
        }
    }
}

fn parse_id(id: &str) -> TaskResult<Uuid> {
    Uuid::parse_str(id).map_err(|_| TaskError::Validation("Invalid task ID".to_string()))
}

/// List tasks, optionally for one owner
pub async fn list_tasks<R: TaskRepository>(
    State(service): State<Arc<TaskService<R>>>,
    Query(filter): Query<TaskFilter>,
) -> TaskResult<Json<Vec<Task>>> {
    let tasks = service.list_tasks(filter).await?;
    Ok(Json(tasks))
}

/// Get a task by ID
pub async fn get_task<R: TaskRepository>(
    State(service): State<Arc<TaskService<R>>>,
    Path(id): Path<String>,
) -> TaskResult<impl IntoResponse> {
    let task = service.get_task(parse_id(&id)?).await?;
    Ok(Json(task))
}

/// Create a new task. Returns 201 even when the notification could not be sent.
pub async fn create_task<R: TaskRepository>(
    State(service): State<Arc<TaskService<R>>>,
    Json(input): Json<CreateTask>,
) -> TaskResult<impl IntoResponse> {
    let created = service.create_task(input).await?;
    Ok((StatusCode::CREATED, Json(TaskCreatedResponse::from(created))))
}
