mod owners;
mod tasks;

pub use tasks::{NotificationFailure, TaskCreatedResponse};

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::repository::TaskRepository;
use crate::service::TaskService;

/// Router for task and owner handlers
///
/// ```text
/// POST /tasks          create a task and notify its owner
/// GET  /tasks          list tasks (?owner_id=)
/// GET  /tasks/{id}
/// POST /owners
/// GET  /owners/{id}
/// PATCH /owners/{id}
/// ```
pub fn router<R: TaskRepository + 'static>(service: TaskService<R>) -> Router {
    let shared_service = Arc::new(service);

    Router::new()
        .route("/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route("/tasks/{id}", get(tasks::get_task))
        .route("/owners", post(owners::create_owner))
        .route("/owners/{id}", get(owners::get_owner).patch(owners::update_owner))
        .with_state(shared_service)
}
