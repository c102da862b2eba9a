//! Security event storage.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::event::{EventFilter, SecurityEvent};
use crate::query::ListQuery;
use crate::store::StoreError;

/// Storage contract for security events.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persists a new event. The id must be unused.
    async fn create(&self, event: SecurityEvent) -> Result<SecurityEvent, StoreError>;

    /// Fetches an event by id.
    async fn get(&self, id: Uuid) -> Result<SecurityEvent, StoreError>;

    /// Lists events matching the filter, in creation order unless the
    /// query says otherwise.
    async fn list(
        &self,
        filter: &EventFilter,
        query: &ListQuery,
    ) -> Result<Vec<SecurityEvent>, StoreError>;
}

/// In-memory implementation of [`EventStore`].
pub struct InMemoryEventStore {
    events: Arc<RwLock<HashMap<Uuid, SecurityEvent>>>,
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn create(&self, event: SecurityEvent) -> Result<SecurityEvent, StoreError> {
        let mut events = self.events.write().await;
        if events.contains_key(&event.id) {
            return Err(StoreError::Conflict(format!(
                "event {} already exists",
                event.id
            )));
        }
        events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn get(&self, id: Uuid) -> Result<SecurityEvent, StoreError> {
        let events = self.events.read().await;
        events
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("event", id))
    }

    async fn list(
        &self,
        filter: &EventFilter,
        query: &ListQuery,
    ) -> Result<Vec<SecurityEvent>, StoreError> {
        let events = self.events.read().await;
        let mut result: Vec<SecurityEvent> = events
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        match query.sort.as_ref().map(|k| k.field.as_str()) {
            Some("severity") => result.sort_by_key(|e| e.severity),
            Some("occurred_at") => result.sort_by_key(|e| e.occurred_at),
            _ => result.sort_by_key(|e| e.created_at),
        }
        Ok(query.finish(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Severity;

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryEventStore::new();
        let event = SecurityEvent::new("malware_detected", Severity::High).with_asset("ws-01");
        let created = store.create(event.clone()).await.unwrap();
        assert_eq!(created.id, event.id);
        let fetched = store.get(event.id).await.unwrap();
        assert_eq!(fetched.event_type, "malware_detected");
    }

    #[tokio::test]
    async fn test_create_duplicate_rejected() {
        let store = InMemoryEventStore::new();
        let event = SecurityEvent::new("phishing_detected", Severity::Medium);
        store.create(event.clone()).await.unwrap();
        assert!(matches!(
            store.create(event).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = InMemoryEventStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(
            store.get(id).await,
            Err(StoreError::NotFound { entity: "event", .. })
        ));
    }

    #[tokio::test]
    async fn test_list_filters_by_min_severity() {
        let store = InMemoryEventStore::new();
        store
            .create(SecurityEvent::new("a", Severity::Low))
            .await
            .unwrap();
        store
            .create(SecurityEvent::new("b", Severity::Critical))
            .await
            .unwrap();
        let filter = EventFilter {
            min_severity: Some(Severity::High),
            ..Default::default()
        };
        let result = store.list(&filter, &ListQuery::unsorted()).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].event_type, "b");
    }
}
