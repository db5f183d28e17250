use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Task entity. Belongs to exactly one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: Uuid,
    /// What needs doing
    pub content: String,
    /// Owner to notify on creation
    pub owner_id: Uuid,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Create a new task from CreateTask DTO
    pub fn new(input: CreateTask) -> Self {
        Self {
            id: Uuid::now_v7(),
            content: input.content,
            owner_id: input.owner_id,
            created_at: Utc::now(),
        }
    }
}

/// DTO for creating a new task
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTask {
    #[serde(default)]
    #[validate(length(max = 10000))]
    pub content: String,
    pub owner_id: Uuid,
}

/// Query filters for listing tasks
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TaskFilter {
    pub owner_id: Option<Uuid>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// Owner of tasks, and the recipient of their notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: Uuid,
    /// Contact address. May be empty when the owner has none on file.
    pub email: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Owner {
    pub fn new(input: CreateOwner) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            email: input.email.trim().to_string(),
            name: input.name,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply updates from UpdateOwner DTO
    pub fn apply_update(&mut self, update: UpdateOwner) {
        if let Some(email) = update.email {
            self.email = email.trim().to_string();
        }
        if let Some(name) = update.name {
            self.name = name;
        }
        self.updated_at = Utc::now();
    }

    pub fn has_contact(&self) -> bool {
        !self.email.is_empty()
    }
}

/// DTO for creating an owner
#[derive(Debug, Clone, Deserialize, Validate, Default)]
pub struct CreateOwner {
    #[serde(default)]
    #[validate(length(max = 320))]
    pub email: String,
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
}

/// DTO for updating an owner
#[derive(Debug, Clone, Deserialize, Validate, Default)]
pub struct UpdateOwner {
    #[validate(length(max = 320))]
    pub email: Option<String>,
    pub name: Option<Option<String>>,
}
