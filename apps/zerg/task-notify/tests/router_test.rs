//! Router tests for the task notify service, captured strategy

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use core_config::Environment;
use email::{
    DEFAULT_CLAIM_IDLE, DEFAULT_DEDUP_CAPACITY, DeliverySettings, DeliveryStrategy, RetryPolicy,
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::sync::watch;
use tower::ServiceExt; // For oneshot()
use zerg_task_notify::{build_delivery, build_router, build_service, consumer_id};

fn captured_settings() -> DeliverySettings {
    DeliverySettings {
        environment: Environment::Development,
        strategy: DeliveryStrategy::Captured,
        retry: RetryPolicy::default(),
        redis_url: None,
        stream_name: "notifications:jobs".to_string(),
        claim_idle: DEFAULT_CLAIM_IDLE,
        dedup_capacity: DEFAULT_DEDUP_CAPACITY,
    }
}

async fn app() -> Router {
    let (_tx, rx) = watch::channel(false);
    let settings = captured_settings();
    let delivery = build_delivery(&settings, rx).await.unwrap();
    assert!(delivery.worker.is_none());

    let service = build_service(delivery.backend).unwrap();
    build_router(service, settings.strategy, delivery.capture)
}

async fn body_bytes(body: Body) -> Vec<u8> {
    body.collect().await.unwrap().to_bytes().to_vec()
}

async fn json_body(body: Body) -> Value {
    serde_json::from_slice(&body_bytes(body).await).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_reports_strategy() {
    let app = app().await;

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["delivery_strategy"], "captured");
}

#[tokio::test]
async fn test_created_task_shows_up_in_viewer() {
    let app = app().await;

    let response = app
        .clone()
        .oneshot(post("/owners", json!({ "email": "a@example.com" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let owner = json_body(response.into_body()).await;

    let response = app
        .clone()
        .oneshot(post(
            "/tasks",
            json!({ "content": "Buy milk", "owner_id": owner["id"] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response.into_body()).await;
    let job_id = created["notifications"][0]["job_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(get("/notifications?recipient=a@example.com"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let records = json_body(response.into_body()).await;
    assert_eq!(records.as_array().unwrap().len(), 1);
    assert_eq!(records[0]["job_id"], job_id.as_str());

    let response = app
        .oneshot(get(&format!("/notifications/{}/body", job_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = String::from_utf8(body_bytes(response.into_body()).await).unwrap();
    assert!(body.contains("Buy milk"));
}

#[tokio::test]
async fn test_viewer_unknown_job_returns_404() {
    let app = app().await;

    let response = app
        .oneshot(get("/notifications/00000000-0000-0000-0000-000000000000"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response.into_body()).await;
    assert_eq!(body["error"], "NotFound");
}

#[test]
fn test_consumer_id_is_unique_per_host() {
    temp_env::with_var("HOSTNAME", Some("worker-7d9f-abc"), || {
        assert_eq!(consumer_id(), "task-notify-worker-7d9f-abc");
    });

    temp_env::with_var("HOSTNAME", None::<&str>, || {
        let first = consumer_id();
        let second = consumer_id();
        assert!(first.starts_with("task-notify-"));
        assert_ne!(first, second);
    });
}
