//! Knowledge base storage.
//!
//! Usage counts are held in per-entry atomics so concurrent
//! `record_usage` calls increment without a whole-record
//! read-modify-write and lose no updates.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::knowledge::{KnowledgeSource, OrganizationalKnowledge};
use crate::query::ListQuery;
use crate::store::StoreError;

/// Storage contract for knowledge entries.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Persists a new entry. When the entry's source is an insight
    /// already present in the base, returns the existing entry
    /// instead of inserting a duplicate.
    async fn insert(
        &self,
        entry: OrganizationalKnowledge,
    ) -> Result<OrganizationalKnowledge, StoreError>;

    /// Fetches an entry by id.
    async fn get(&self, id: Uuid) -> Result<OrganizationalKnowledge, StoreError>;

    /// Lists entries.
    async fn list(&self, query: &ListQuery) -> Result<Vec<OrganizationalKnowledge>, StoreError>;

    /// Atomically increments an entry's usage count. Returns the new
    /// count.
    async fn record_usage(&self, id: Uuid) -> Result<u64, StoreError>;

    /// Sets an entry's effectiveness rating.
    async fn set_rating(
        &self,
        id: Uuid,
        rating: f32,
    ) -> Result<OrganizationalKnowledge, StoreError>;

    /// Adds a tag to an entry.
    async fn add_tag(
        &self,
        id: Uuid,
        tag: &str,
    ) -> Result<OrganizationalKnowledge, StoreError>;

    /// Finds the entry promoted from a given insight, if any.
    async fn find_by_source_insight(
        &self,
        insight_id: Uuid,
    ) -> Result<Option<OrganizationalKnowledge>, StoreError>;
}

struct Entry {
    record: OrganizationalKnowledge,
    usage: Arc<AtomicU64>,
}

impl Entry {
    // Materializes the live usage count into the serializable record.
    fn materialize(&self) -> OrganizationalKnowledge {
        let mut record = self.record.clone();
        record.usage_count = self.usage.load(Ordering::Relaxed);
        record
    }
}

/// In-memory implementation of [`KnowledgeStore`].
pub struct InMemoryKnowledgeStore {
    entries: Arc<RwLock<HashMap<Uuid, Entry>>>,
    by_insight: Arc<RwLock<HashMap<Uuid, Uuid>>>,
}

impl Default for InMemoryKnowledgeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryKnowledgeStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            by_insight: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn insert(
        &self,
        entry: OrganizationalKnowledge,
    ) -> Result<OrganizationalKnowledge, StoreError> {
        // The index is consulted and updated under the entries write
        // lock, so two concurrent promotions of one insight cannot
        // both insert.
        let mut entries = self.entries.write().await;
        let mut by_insight = self.by_insight.write().await;
        if entries.contains_key(&entry.id) {
            return Err(StoreError::Conflict(format!(
                "knowledge entry {} already exists",
                entry.id
            )));
        }
        if let KnowledgeSource::Insight { insight_id } = &entry.source {
            if let Some(existing_id) = by_insight.get(insight_id) {
                if let Some(existing) = entries.get(existing_id) {
                    return Ok(existing.materialize());
                }
            }
            by_insight.insert(*insight_id, entry.id);
        }
        let stored = Entry {
            usage: Arc::new(AtomicU64::new(entry.usage_count)),
            record: entry,
        };
        let materialized = stored.materialize();
        entries.insert(stored.record.id, stored);
        Ok(materialized)
    }

    async fn get(&self, id: Uuid) -> Result<OrganizationalKnowledge, StoreError> {
        let entries = self.entries.read().await;
        entries
            .get(&id)
            .map(Entry::materialize)
            .ok_or_else(|| StoreError::not_found("knowledge entry", id))
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<OrganizationalKnowledge>, StoreError> {
        let entries = self.entries.read().await;
        let mut result: Vec<OrganizationalKnowledge> =
            entries.values().map(Entry::materialize).collect();
        match query.sort.as_ref().map(|k| k.field.as_str()) {
            Some("usage_count") => result.sort_by_key(|e| e.usage_count),
            Some("title") => result.sort_by(|a, b| a.title.cmp(&b.title)),
            _ => result.sort_by_key(|e| e.created_at),
        }
        Ok(query.finish(result))
    }

    async fn record_usage(&self, id: Uuid) -> Result<u64, StoreError> {
        let usage = {
            let entries = self.entries.read().await;
            entries
                .get(&id)
                .map(|e| Arc::clone(&e.usage))
                .ok_or_else(|| StoreError::not_found("knowledge entry", id))?
        };
        Ok(usage.fetch_add(1, Ordering::Relaxed) + 1)
    }

    async fn set_rating(
        &self,
        id: Uuid,
        rating: f32,
    ) -> Result<OrganizationalKnowledge, StoreError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("knowledge entry", id))?;
        entry.record.effectiveness_rating = Some(rating);
        entry.record.updated_at = Utc::now();
        Ok(entry.materialize())
    }

    async fn add_tag(
        &self,
        id: Uuid,
        tag: &str,
    ) -> Result<OrganizationalKnowledge, StoreError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("knowledge entry", id))?;
        entry.record.tags.insert(tag.to_string());
        entry.record.updated_at = Utc::now();
        Ok(entry.materialize())
    }

    async fn find_by_source_insight(
        &self,
        insight_id: Uuid,
    ) -> Result<Option<OrganizationalKnowledge>, StoreError> {
        let by_insight = self.by_insight.read().await;
        let Some(knowledge_id) = by_insight.get(&insight_id) else {
            return Ok(None);
        };
        let entries = self.entries.read().await;
        Ok(entries.get(knowledge_id).map(Entry::materialize))
    }
}
