//! Task Notify Service
//!
//! HTTP service that stores tasks and emails each task's owner.
//!
//! ## Architecture
//!
//! ```text
//! POST /tasks
//!   ↓
//! TaskService ──► HookRegistry ──► TaskNotifier ──► NotificationTrigger
//!                                                        ↓
//!                                                 DeliveryBackend
//!          ┌──────────────────────┬─────────────────────┼──────────────────────┐
//!      immediate              deferred                                   captured
//!   SmtpProvider      WorkQueue → DeliveryWorker → SmtpProvider        CaptureStore
//!                     (Redis stream or in-process)                 (GET /notifications)
//! ```
//!
//! The strategy is read once at startup from `NOTIFY_DELIVERY_STRATEGY`.

use axum::{Json, Router, extract::State, routing::get};
use core_config::{Environment, FromEnv, server::ServerConfig};
use domain_tasks::{InMemoryOwnerDirectory, InMemoryTaskRepository, TaskNotifier, TaskService};
use email::{
    CaptureStore, DeliveryBackend, DeliveryConfig, DeliverySettings, DeliveryStrategy,
    DeliveryWorker, HookRegistry, InMemoryQueue, NotificationTrigger, RedisStreamConsumer,
    RedisStreamQueue, SmtpProvider, TemplateEngine, TransmissionProvider, WorkQueue,
};
use eyre::{Result, WrapErr};
use redis::aio::ConnectionManager;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Consumer group shared by every replica reading the notification stream
pub const CONSUMER_GROUP: &str = "notification_workers";

/// Delivery backend plus whatever it needs running beside it
pub struct Delivery {
    pub backend: DeliveryBackend,
    /// Set for the captured strategy; served under `/notifications`
    pub capture: Option<CaptureStore>,
    /// Set for the deferred strategy
    pub worker: Option<JoinHandle<()>>,
}

/// Stream consumer name for this process, unique per replica
///
/// Uses `HOSTNAME` (the pod name under Kubernetes) when set, so a restarted
/// replica picks up its own unacknowledged entries. Falls back to a random ID.
pub fn consumer_id() -> String {
    match std::env::var("HOSTNAME") {
        Ok(host) if !host.trim().is_empty() => format!("task-notify-{}", host.trim()),
        _ => format!("task-notify-{}", uuid::Uuid::new_v4()),
    }
}

async fn connection_manager(url: &str) -> Result<ConnectionManager> {
    let client = redis::Client::open(url).wrap_err("Invalid REDIS_URL")?;
    ConnectionManager::new(client)
        .await
        .wrap_err("Failed to connect to Redis")
}

/// Build the one delivery backend this process will use.
///
/// Deferred delivery goes through the Redis stream when `REDIS_URL` is set,
/// otherwise through an in-process queue. Either way a `DeliveryWorker` is
/// spawned and stops when `shutdown` flips to true.
pub async fn build_delivery(
    settings: &DeliverySettings,
    shutdown: watch::Receiver<bool>,
) -> Result<Delivery> {
    let config = DeliveryConfig::new(settings.environment, settings.strategy);

    let delivery = match settings.strategy {
        DeliveryStrategy::Captured => {
            info!("Capturing notifications; nothing will be sent");
            let store = CaptureStore::new();
            Delivery {
                backend: DeliveryBackend::new(config.with_capture_store(store.clone()))?,
                capture: Some(store),
                worker: None,
            }
        }
        DeliveryStrategy::Immediate => {
            let provider = SmtpProvider::from_env().wrap_err("SMTP configuration error")?;
            Delivery {
                backend: DeliveryBackend::new(config.with_provider(Arc::new(provider)))?,
                capture: None,
                worker: None,
            }
        }
        DeliveryStrategy::Deferred => {
            let provider: Arc<dyn TransmissionProvider> =
                Arc::new(SmtpProvider::from_env().wrap_err("SMTP configuration error")?);
            let worker = Arc::new(
                DeliveryWorker::new(provider, settings.retry)
                    .with_dedup_capacity(settings.dedup_capacity),
            );

            let (queue, handle): (Arc<dyn WorkQueue>, JoinHandle<()>) = match &settings.redis_url
            {
                Some(url) => {
                    // The consumer blocks on XREADGROUP, so it gets its own connection
                    let producer = connection_manager(url).await?;
                    let consumer = RedisStreamConsumer::new(
                        connection_manager(url).await?,
                        CONSUMER_GROUP,
                        consumer_id(),
                    )
                    .with_stream(settings.stream_name.clone())
                    .with_claim_idle(settings.claim_idle);

                    let handle = tokio::spawn(async move {
                        if let Err(e) = worker.run_stream(consumer, shutdown).await {
                            error!(error = %e, "Stream delivery worker failed");
                        }
                    });
                    let queue =
                        RedisStreamQueue::new(producer).with_stream(settings.stream_name.clone());
                    (Arc::new(queue), handle)
                }
                None => {
                    info!("REDIS_URL not set, deferring through an in-process queue");
                    let (queue, receiver) = InMemoryQueue::channel();
                    let handle = tokio::spawn(async move { worker.run(receiver, shutdown).await });
                    (Arc::new(queue), handle)
                }
            };

            info!(queue = queue.name(), "Deferred delivery ready");
            Delivery {
                backend: DeliveryBackend::new(config.with_queue(queue))?,
                capture: None,
                worker: Some(handle),
            }
        }
    };

    Ok(delivery)
}

/// Wire tasks, owners and the notifier around a delivery backend
pub fn build_service(backend: DeliveryBackend) -> Result<TaskService<InMemoryTaskRepository>> {
    let templates = TemplateEngine::new().wrap_err("Failed to initialize template engine")?;
    let trigger = NotificationTrigger::new(Arc::new(templates), Arc::new(backend));

    let owners = Arc::new(InMemoryOwnerDirectory::new());
    let hooks = HookRegistry::new().with_hook(Arc::new(TaskNotifier::new(owners.clone(), trigger)));

    Ok(TaskService::new(InMemoryTaskRepository::new(), owners).with_hooks(hooks))
}

async fn health(State(strategy): State<DeliveryStrategy>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "delivery_strategy": strategy.to_string(),
    }))
}

/// Full application router
///
/// ```text
/// GET  /health
/// /tasks, /owners            task and owner handlers
/// /notifications             capture viewer, captured strategy only
/// ```
pub fn build_router(
    service: TaskService<InMemoryTaskRepository>,
    strategy: DeliveryStrategy,
    capture: Option<CaptureStore>,
) -> Router {
    let health_routes = Router::new()
        .route("/health", get(health))
        .with_state(strategy);

    let mut app = Router::new()
        .merge(health_routes)
        .merge(domain_tasks::handlers::router(service));

    if let Some(store) = capture {
        app = app.nest("/notifications", email::viewer::router(store));
    }

    app.layer(TraceLayer::new_for_http())
}

/// Run the service until SIGINT or SIGTERM
pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    info!(
        service = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        environment = environment.as_str(),
        "Starting task notify service"
    );

    let settings = DeliverySettings::load(environment)
        .wrap_err("Failed to load delivery configuration")?;
    info!(strategy = %settings.strategy, "Delivery strategy selected");

    let server = ServerConfig::from_env().wrap_err("Failed to load server configuration")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let delivery = build_delivery(&settings, shutdown_rx).await?;
    let service = build_service(delivery.backend)?;
    let app = build_router(service, settings.strategy, delivery.capture);

    let listener = TcpListener::bind(server.address())
        .await
        .wrap_err_with(|| format!("Failed to bind to {}", server.address()))?;
    info!(address = %server.address(), "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await
        .wrap_err("Server failed")?;

    if let Some(worker) = delivery.worker {
        if let Err(e) = worker.await {
            error!(error = %e, "Delivery worker panicked");
        }
    }

    info!("Task notify service stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }
}
