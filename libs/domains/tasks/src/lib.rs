//! Tasks Domain
//!
//! Tasks, their owners, and the notification sent when a task is created.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  ← axum routes for tasks and owners
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐     ┌──────────────┐
//! │   Service   │ ──► │ HookRegistry │  ← runs TaskNotifier after a task is stored
//! └──────┬──────┘     └──────────────┘
//!        │
//! ┌──────▼──────┐
//! │ Repository  │  ← Data access (trait + in-memory implementation)
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │   Models    │  ← Task, Owner, DTOs
//! └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_tasks::{InMemoryOwnerDirectory, InMemoryTaskRepository, TaskNotifier, TaskService};
//! use email::HookRegistry;
//!
//! let owners = Arc::new(InMemoryOwnerDirectory::new());
//! let hooks = HookRegistry::new().with_hook(Arc::new(TaskNotifier::new(owners.clone(), trigger)));
//! let service = TaskService::new(InMemoryTaskRepository::new(), owners).with_hooks(hooks);
//!
//! let created = service.create_task(input).await?;
//! assert!(created.report.is_clean());
//! ```

pub mod error;
pub mod handlers;
pub mod models;
pub mod notifier;
pub mod owners;
pub mod repository;
pub mod service;

// Re-export commonly used types
pub use error::{TaskError, TaskResult};
pub use handlers::{NotificationFailure, TaskCreatedResponse};
pub use models::{CreateOwner, CreateTask, Owner, Task, TaskFilter, UpdateOwner};
pub use notifier::{TaskCreatedNotice, TaskNotifier};
pub use owners::{InMemoryOwnerDirectory, OwnerDirectory, OwnerStore};
pub use repository::{InMemoryTaskRepository, TaskRepository};
pub use service::{CreatedTask, TaskService};
