//! Local inspection viewer for captured notifications
//!
//! ```text
//! GET /                      captured jobs in capture order
//! GET /?recipient=a@x.com    only jobs for one recipient
//! GET /{id}                  one job by job ID
//! GET /{id}/body             the rendered body as plain text
//! ```

use crate::capture::{CaptureStore, DeliveryRecord};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    pub recipient: Option<String>,
}

#[derive(Debug, Serialize)]
struct ViewerError {
    error: &'static str,
    message: String,
}

enum ViewerRejection {
    InvalidId(String),
    NotFound(Uuid),
}

impl IntoResponse for ViewerRejection {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            Self::InvalidId(raw) => (
                StatusCode::BAD_REQUEST,
                "BadRequest",
                format!("Invalid job ID: {}", raw),
            ),
            Self::NotFound(id) => (
                StatusCode::NOT_FOUND,
                "NotFound",
                format!("No captured notification with job ID {}", id),
            ),
        };
        (status, Json(ViewerError { error, message })).into_response()
    }
}

/// Router over a capture store. Mount it under any prefix.
pub fn router(store: CaptureStore) -> Router {
    Router::new()
        .route("/", get(list_captured))
        .route("/{id}", get(get_captured))
        .route("/{id}/body", get(get_captured_body))
        .with_state(store)
}

async fn list_captured(
    State(store): State<CaptureStore>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<DeliveryRecord>> {
    let records = match query.recipient.as_deref() {
        Some(recipient) => store.by_recipient(recipient).await,
        None => store.list().await,
    };
    Json(records)
}

async fn find(store: &CaptureStore, raw_id: &str) -> Result<DeliveryRecord, ViewerRejection> {
    let id = Uuid::parse_str(raw_id).map_err(|_| ViewerRejection::InvalidId(raw_id.to_string()))?;
    store.get(id).await.ok_or(ViewerRejection::NotFound(id))
}

async fn get_captured(
    State(store): State<CaptureStore>,
    Path(id): Path<String>,
) -> Result<Json<DeliveryRecord>, ViewerRejection> {
    find(&store, &id).await.map(Json)
}

async fn get_captured_body(
    State(store): State<CaptureStore>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ViewerRejection> {
    let record = find(&store, &id).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        record.body,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Notification, NotificationJob};
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn job(to: &str, body: &str) -> NotificationJob {
        NotificationJob::new(
            "task:1",
            Notification {
                recipient: to.to_string(),
                subject: "New Task Created".to_string(),
                body: body.to_string(),
                created_at: Utc::now(),
            },
        )
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_list_and_filter() {
        let store = CaptureStore::new();
        store.append(&job("a@example.com", "one")).await;
        store.append(&job("b@example.com", "two")).await;

        let (status, body) = get(router(store.clone()), "/").await;
        assert_eq!(status, StatusCode::OK);
        let all: Vec<DeliveryRecord> = serde_json::from_slice(&body).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].sequence, 1);

        let (_, body) = get(router(store), "/?recipient=b@example.com").await;
        let filtered: Vec<DeliveryRecord> = serde_json::from_slice(&body).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].body, "two");
    }

    #[tokio::test]
    async fn test_fetch_by_id() {
        let store = CaptureStore::new();
        let captured = job("a@example.com", "Buy milk");
        store.append(&captured).await;

        let (status, body) = get(router(store.clone()), &format!("/{}", captured.id)).await;
        assert_eq!(status, StatusCode::OK);
        let record: DeliveryRecord = serde_json::from_slice(&body).unwrap();
        assert_eq!(record.job_id, captured.id);

        let (status, body) = get(router(store), &format!("/{}/body", captured.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"Buy milk");
    }

    #[tokio::test]
    async fn test_unknown_and_invalid_ids() {
        let store = CaptureStore::new();

        let (status, body) = get(router(store.clone()), &format!("/{}", Uuid::new_v4())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(error["error"], "NotFound");

        let (status, _) = get(router(store), "/not-a-uuid").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
