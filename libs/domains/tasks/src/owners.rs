use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

use crate::models::{CreateOwner, Owner, UpdateOwner};

/// In-process owner lookup. Called synchronously inside task creation.
#[cfg_attr(test, mockall::automock)]
pub trait OwnerDirectory: Send + Sync {
    fn find(&self, id: Uuid) -> Option<Owner>;

    /// Insert or replace an owner
    fn upsert(&self, owner: Owner);
}

/// Owner storage behind the owner endpoints
pub trait OwnerStore: OwnerDirectory {
    fn create(&self, input: CreateOwner) -> Owner;

    /// `None` when no owner has this ID
    fn update(&self, id: Uuid, input: UpdateOwner) -> Option<Owner>;
}

/// In-memory implementation of OwnerDirectory
#[derive(Debug, Default, Clone)]
pub struct InMemoryOwnerDirectory {
    owners: Arc<RwLock<HashMap<Uuid, Owner>>>,
}

impl InMemoryOwnerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.owners.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OwnerDirectory for InMemoryOwnerDirectory {
    fn find(&self, id: Uuid) -> Option<Owner> {
        self.owners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    fn upsert(&self, owner: Owner) {
        self.owners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(owner.id, owner);
    }
}

impl OwnerStore for InMemoryOwnerDirectory {
    fn create(&self, input: CreateOwner) -> Owner {
        let owner = Owner::new(input);
        self.upsert(owner.clone());
        tracing::info!(owner_id = %owner.id, has_contact = owner.has_contact(), "Created owner");
        owner
    }

    fn update(&self, id: Uuid, input: UpdateOwner) -> Option<Owner> {
        let mut owners = self.owners.write().unwrap_or_else(PoisonError::into_inner);
        let owner = owners.get_mut(&id)?;
        owner.apply_update(input);
        Some(owner.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_find() {
        let directory = InMemoryOwnerDirectory::new();
        let owner = directory.create(CreateOwner {
            email: "a@example.com".to_string(),
            name: Some("Alice".to_string()),
        });

        assert_eq!(directory.find(owner.id), Some(owner));
        assert_eq!(directory.len(), 1);
        assert!(directory.find(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_update_unknown_owner() {
        let directory = InMemoryOwnerDirectory::new();
        assert!(directory.update(Uuid::new_v4(), UpdateOwner::default()).is_none());
    }
}
