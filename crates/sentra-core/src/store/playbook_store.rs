//! Playbook storage.
//!
//! Playbooks are validated at write time. Updating a playbook never
//! affects runs already created, because runs snapshot the step list
//! at creation.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::playbook::Playbook;
use crate::query::ListQuery;
use crate::store::StoreError;

/// Storage contract for playbooks.
#[async_trait]
pub trait PlaybookStore: Send + Sync {
    /// Validates and persists a new playbook.
    async fn create(&self, playbook: Playbook) -> Result<Playbook, StoreError>;

    /// Validates and replaces an existing playbook.
    async fn update(&self, playbook: Playbook) -> Result<Playbook, StoreError>;

    /// Fetches a playbook by id.
    async fn get(&self, id: Uuid) -> Result<Playbook, StoreError>;

    /// Lists all playbooks.
    async fn list(&self, query: &ListQuery) -> Result<Vec<Playbook>, StoreError>;

    /// Lists active playbooks only, for the trigger matcher.
    async fn list_active(&self) -> Result<Vec<Playbook>, StoreError>;
}

/// In-memory implementation of [`PlaybookStore`].
pub struct InMemoryPlaybookStore {
    playbooks: Arc<RwLock<HashMap<Uuid, Playbook>>>,
}

impl Default for InMemoryPlaybookStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPlaybookStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            playbooks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Creates a store pre-populated with playbooks. Test helper;
    /// skips validation.
    pub fn with_playbooks(playbooks: Vec<Playbook>) -> Self {
        let map: HashMap<Uuid, Playbook> = playbooks.into_iter().map(|p| (p.id, p)).collect();
        Self {
            playbooks: Arc::new(RwLock::new(map)),
        }
    }
}

#[async_trait]
impl PlaybookStore for InMemoryPlaybookStore {
    async fn create(&self, playbook: Playbook) -> Result<Playbook, StoreError> {
        playbook.validate()?;
        let mut playbooks = self.playbooks.write().await;
        if playbooks.contains_key(&playbook.id) {
            return Err(StoreError::Conflict(format!(
                "playbook {} already exists",
                playbook.id
            )));
        }
        playbooks.insert(playbook.id, playbook.clone());
        Ok(playbook)
    }

    async fn update(&self, mut playbook: Playbook) -> Result<Playbook, StoreError> {
        playbook.validate()?;
        let mut playbooks = self.playbooks.write().await;
        if !playbooks.contains_key(&playbook.id) {
            return Err(StoreError::not_found("playbook", playbook.id));
        }
        playbook.updated_at = Utc::now();
        playbooks.insert(playbook.id, playbook.clone());
        Ok(playbook)
    }

    async fn get(&self, id: Uuid) -> Result<Playbook, StoreError> {
        let playbooks = self.playbooks.read().await;
        playbooks
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("playbook", id))
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<Playbook>, StoreError> {
        let playbooks = self.playbooks.read().await;
        let mut result: Vec<Playbook> = playbooks.values().cloned().collect();
        match query.sort.as_ref().map(|k| k.field.as_str()) {
            Some("name") => result.sort_by(|a, b| a.name.cmp(&b.name)),
            Some("priority") => result.sort_by_key(|p| p.priority),
            _ => result.sort_by_key(|p| p.created_at),
        }
        Ok(query.finish(result))
    }

    async fn list_active(&self) -> Result<Vec<Playbook>, StoreError> {
        let playbooks = self.playbooks.read().await;
        Ok(playbooks.values().filter(|p| p.active).cloned().collect())
    }
}
