use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{TaskError, TaskResult};
use crate::models::{CreateOwner, UpdateOwner};
use crate::repository::TaskRepository;
use crate::service::TaskService;

fn parse_id(id: &str) -> TaskResult<Uuid> {
    Uuid::parse_str(id).map_err(|_| TaskError::Validation("Invalid owner ID".to_string()))
}

pub async fn create_owner<R: TaskRepository>(
    State(service): State<Arc<TaskService<R>>>,
    Json(input): Json<CreateOwner>,
) -> TaskResult<impl IntoResponse> {
    let owner = service.create_owner(input)?;
    Ok((StatusCode::CREATED, Json(owner)))
}

pub async fn get_owner<R: TaskRepository>(
    State(service): State<Arc<TaskService<R>>>,
    Path(id): Path<String>,
) -> TaskResult<impl IntoResponse> {
    let owner = service.get_owner(parse_id(&id)?)?;
    Ok(Json(owner))
}

/// Change an owner's contact details. Jobs already built keep the old values.
pub async fn update_owner<R: TaskRepository>(
    State(service): State<Arc<TaskService<R>>>,
    Path(id): Path<String>,
    Json(input): Json<UpdateOwner>,
) -> TaskResult<impl IntoResponse> {
    let owner = service.update_owner(parse_id(&id)?, input)?;
    Ok(Json(owner))
}
