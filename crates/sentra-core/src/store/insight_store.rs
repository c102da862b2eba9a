//! Learning insight storage with the approval workflow.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::insight::{InsightFilter, LearningInsight};
use crate::query::ListQuery;
use crate::store::StoreError;

/// Storage contract for learning insights.
///
/// Workflow moves go through the store so the status, the deciding
/// actor, and the timestamp are recorded in one write.
#[async_trait]
pub trait InsightStore: Send + Sync {
    /// Persists a new insight.
    async fn create(&self, insight: LearningInsight) -> Result<LearningInsight, StoreError>;

    /// Fetches an insight by id.
    async fn get(&self, id: Uuid) -> Result<LearningInsight, StoreError>;

    /// Lists insights matching the filter.
    async fn list(
        &self,
        filter: &InsightFilter,
        query: &ListQuery,
    ) -> Result<Vec<LearningInsight>, StoreError>;

    /// Approves an insight for implementation.
    async fn approve(&self, id: Uuid, actor: &str) -> Result<LearningInsight, StoreError>;

    /// Rejects an insight. Terminal.
    async fn reject(&self, id: Uuid, actor: &str) -> Result<LearningInsight, StoreError>;

    /// Marks an approved insight implemented.
    async fn implement(&self, id: Uuid, actor: &str) -> Result<LearningInsight, StoreError>;
}

/// In-memory implementation of [`InsightStore`].
pub struct InMemoryInsightStore {
    insights: Arc<RwLock<HashMap<Uuid, LearningInsight>>>,
}

impl Default for InMemoryInsightStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryInsightStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            insights: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn mutate<F>(&self, id: Uuid, f: F) -> Result<LearningInsight, StoreError>
    where
        F: FnOnce(&mut LearningInsight) -> Result<(), StoreError>,
    {
        let mut insights = self.insights.write().await;
        let insight = insights
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("insight", id))?;
        f(insight)?;
        Ok(insight.clone())
    }
}

#[async_trait]
impl InsightStore for InMemoryInsightStore {
    async fn create(&self, insight: LearningInsight) -> Result<LearningInsight, StoreError> {
        let mut insights = self.insights.write().await;
        if insights.contains_key(&insight.id) {
            return Err(StoreError::Conflict(format!(
                "insight {} already exists",
                insight.id
            )));
        }
        insights.insert(insight.id, insight.clone());
        Ok(insight)
    }

    async fn get(&self, id: Uuid) -> Result<LearningInsight, StoreError> {
        let insights = self.insights.read().await;
        insights
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("insight", id))
    }

    async fn list(
        &self,
        filter: &InsightFilter,
        query: &ListQuery,
    ) -> Result<Vec<LearningInsight>, StoreError> {
        let insights = self.insights.read().await;
        let mut result: Vec<LearningInsight> = insights
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        match query.sort.as_ref().map(|k| k.field.as_str()) {
            Some("confidence_score") => result.sort_by_key(|i| i.confidence_score),
            _ => result.sort_by_key(|i| i.created_at),
        }
        Ok(query.finish(result))
    }

    async fn approve(&self, id: Uuid, actor: &str) -> Result<LearningInsight, StoreError> {
        self.mutate(id, |i| i.approve(actor).map_err(Into::into)).await
    }

    async fn reject(&self, id: Uuid, actor: &str) -> Result<LearningInsight, StoreError> {
        self.mutate(id, |i| i.reject(actor).map_err(Into::into)).await
    }

    async fn implement(&self, id: Uuid, actor: &str) -> Result<LearningInsight, StoreError> {
        self.mutate(id, |i| i.implement(actor).map_err(Into::into)).await
    }
}
