use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(Uuid),

    #[error("Owner not found: {0}")]
    OwnerNotFound(Uuid),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type TaskResult<T> = Result<T, TaskError>;

/// Standard JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

impl IntoResponse for TaskError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            TaskError::NotFound(_) | TaskError::OwnerNotFound(_) => {
                tracing::info!("Not found: {}", self);
                (StatusCode::NOT_FOUND, "NotFound")
            }
            TaskError::Validation(_) => {
                tracing::info!("Bad request: {}", self);
                (StatusCode::BAD_REQUEST, "BadRequest")
            }
            TaskError::Internal(_) => {
                tracing::error!("Internal server error: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError")
            }
        };

        let body = Json(ErrorResponse {
            error,
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}
