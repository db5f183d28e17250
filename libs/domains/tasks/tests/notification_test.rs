//! Task creation → owner notification, end to end
//!
//! Wires the real service, owner directory, notifier hook and delivery
//! backends, and checks what reaches the capture store or provider.

use core_config::Environment;
use domain_tasks::*;
use email::{
    CaptureStore, DeliveryBackend, DeliveryConfig, DeliveryStatus, DeliveryStrategy,
    DeliveryWorker, HookRegistry, InMemoryQueue, MockProvider, NotificationError,
    NotificationTrigger, RetryPolicy, TemplateEngine,
};
use std::sync::Arc;
use std::time::Duration;
use test_utils::TestDataBuilder;
use test_utils::assertions::{assert_some, assert_uuid_eq};
use tokio::sync::watch;

fn service_with(backend: DeliveryBackend) -> TaskService<InMemoryTaskRepository> {
    let owners = Arc::new(InMemoryOwnerDirectory::new());
    let trigger = NotificationTrigger::new(
        Arc::new(TemplateEngine::new().expect("built-in templates")),
        Arc::new(backend),
    );
    let hooks = HookRegistry::new().with_hook(Arc::new(TaskNotifier::new(owners.clone(), trigger)));

    TaskService::new(InMemoryTaskRepository::new(), owners).with_hooks(hooks)
}

fn captured_service() -> (TaskService<InMemoryTaskRepository>, CaptureStore) {
    let store = CaptureStore::new();
    let backend = DeliveryBackend::new(
        DeliveryConfig::new(Environment::Test, DeliveryStrategy::Captured)
            .with_capture_store(store.clone()),
    )
    .unwrap();
    (service_with(backend), store)
}

fn owner(service: &TaskService<InMemoryTaskRepository>, email: &str) -> Owner {
    service
        .create_owner(CreateOwner {
            email: email.to_string(),
            name: None,
        })
        .unwrap()
}

#[tokio::test]
async fn test_buy_milk_is_captured_for_owner() {
    let (service, store) = captured_service();
    let owner = owner(&service, "a@example.com");

    let created = service
        .create_task(CreateTask {
            content: "Buy milk".to_string(),
            owner_id: owner.id,
        })
        .await
        .unwrap();

    assert!(created.report.is_clean());
    assert_eq!(created.report.receipts.len(), 1);
    assert_eq!(created.report.receipts[0].status, DeliveryStatus::Captured);

    let records = store.by_recipient("a@example.com").await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].subject, "New Task Created");
    assert!(records[0].body.contains("Buy milk"));
    assert!(records[0].body.contains("a@example.com"));
    assert_eq!(records[0].source, format!("task:{}", created.task.id));

    let job_id = created.report.receipts[0].job_id;
    let record = assert_some(store.get(job_id).await, "captured record by job id");
    assert_uuid_eq(record.job_id, job_id, "captured record");
    assert_eq!(record.sequence, 1);
}

#[tokio::test]
async fn test_each_creation_produces_exactly_one_job() {
    let (service, store) = captured_service();
    let builder = TestDataBuilder::from_test_name("test_each_creation_produces_exactly_one_job");
    let alice = owner(&service, &builder.email("alice"));
    let bob = owner(&service, &builder.email("bob"));

    let mut created_ids = Vec::new();
    for (i, owner) in [&alice, &bob, &alice].into_iter().enumerate() {
        let created = service
            .create_task(CreateTask {
                content: builder.task_content(&i.to_string()),
                owner_id: owner.id,
            })
            .await
            .unwrap();
        created_ids.push(created.task.id);
    }

    let records = store.list().await;
    assert_eq!(records.len(), 3);

    let sources: Vec<String> = records.iter().map(|r| r.source.clone()).collect();
    let expected: Vec<String> = created_ids.iter().map(|id| format!("task:{}", id)).collect();
    assert_eq!(sources, expected);

    assert_eq!(store.by_recipient(&builder.email("alice")).await.len(), 2);
    assert_eq!(store.by_recipient(&builder.email("bob")).await.len(), 1);
}

#[tokio::test]
async fn test_owner_without_email_still_gets_task() {
    let (service, store) = captured_service();
    let owner = owner(&service, "");

    let created = service
        .create_task(CreateTask {
            content: "Buy milk".to_string(),
            owner_id: owner.id,
        })
        .await
        .unwrap();

    assert!(matches!(
        created.report.failure(TaskNotifier::NAME),
        Some(NotificationError::MissingRecipient(_))
    ));
    assert!(created.report.receipts.is_empty());
    assert!(store.is_empty().await);

    // The task itself was stored
    assert_eq!(service.get_task(created.task.id).await.unwrap(), created.task);
}

#[tokio::test]
async fn test_unknown_owner_still_gets_task() {
    let (service, store) = captured_service();

    let created = service
        .create_task(CreateTask {
            content: "Buy milk".to_string(),
            owner_id: uuid::Uuid::new_v4(),
        })
        .await
        .unwrap();

    assert!(matches!(
        created.report.failure(TaskNotifier::NAME),
        Some(NotificationError::MissingRecipient(_))
    ));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_empty_content_is_a_render_failure() {
    let (service, store) = captured_service();
    let owner = owner(&service, "a@example.com");

    let created = service
        .create_task(CreateTask {
            content: "   ".to_string(),
            owner_id: owner.id,
        })
        .await
        .unwrap();

    assert!(matches!(
        created.report.failure(TaskNotifier::NAME),
        Some(NotificationError::Render(_))
    ));
    assert!(store.is_empty().await);
    assert!(service.get_task(created.task.id).await.is_ok());
}

#[tokio::test]
async fn test_rendering_is_deterministic() {
    let (service, store) = captured_service();
    let owner = owner(&service, "a@example.com");

    let task = service
        .create_task(CreateTask {
            content: "Buy milk".to_string(),
            owner_id: owner.id,
        })
        .await
        .unwrap()
        .task;

    let directory = service.owners();
    let trigger_owner = directory.find(owner.id).unwrap();
    let notice = TaskCreatedNotice::snapshot(&task, &trigger_owner);
    let engine = TemplateEngine::new().unwrap();

    let first = engine.render_source(&notice).unwrap();
    let second = engine.render_source(&notice).unwrap();
    assert_eq!(first, second);

    let captured = &store.list().await[0];
    assert_eq!(captured.subject, first.subject);
    assert_eq!(captured.body, first.body);
}

#[tokio::test]
async fn test_rendered_job_ignores_later_owner_changes() {
    let (service, store) = captured_service();
    let owner = owner(&service, "a@example.com");

    service
        .create_task(CreateTask {
            content: "Buy milk".to_string(),
            owner_id: owner.id,
        })
        .await
        .unwrap();

    service
        .update_owner(
            owner.id,
            UpdateOwner {
                email: Some("changed@example.com".to_string()),
                name: None,
            },
        )
        .unwrap();

    let record = &store.list().await[0];
    assert_eq!(record.recipient, "a@example.com");
    assert!(record.body.contains("a@example.com"));
    assert!(!record.body.contains("changed@example.com"));
}

#[tokio::test]
async fn test_deferred_creation_returns_before_delivery() {
    let provider = MockProvider::new().with_delay(Duration::from_millis(300));
    let (queue, receiver) = InMemoryQueue::channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = Arc::new(DeliveryWorker::new(
        Arc::new(provider.clone()),
        RetryPolicy::default(),
    ));
    let worker_handle = tokio::spawn({
        let worker = worker.clone();
        async move { worker.run(receiver, shutdown_rx).await }
    });

    let backend = DeliveryBackend::new(
        DeliveryConfig::new(Environment::Production, DeliveryStrategy::Deferred)
            .with_queue(Arc::new(queue)),
    )
    .unwrap();
    let service = service_with(backend);
    let owner = owner(&service, "a@example.com");

    let created = service
        .create_task(CreateTask {
            content: "Buy milk".to_string(),
            owner_id: owner.id,
        })
        .await
        .unwrap();

    assert_eq!(created.report.receipts[0].status, DeliveryStatus::Pending);
    assert_eq!(provider.sent_count().await, 0);

    tokio::time::timeout(Duration::from_secs(5), async {
        while provider.sent_count().await == 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("worker delivered the job");

    let sent = provider.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient(), "a@example.com");
    assert!(sent[0].body().contains("Buy milk"));

    shutdown_tx.send(true).unwrap();
    worker_handle.await.unwrap();
}
