//! Run record storage.
//!
//! `step_results` is append-only. The store enforces the run status
//! transition table; callers never write a status directly.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::query::ListQuery;
use crate::response::{AutomatedResponse, ExecutionStatus, ResponseFilter, StepResult};
use crate::store::StoreError;

/// Storage contract for automated response runs.
#[async_trait]
pub trait ResponseStore: Send + Sync {
    /// Persists a new run record.
    async fn create(&self, run: AutomatedResponse) -> Result<AutomatedResponse, StoreError>;

    /// Fetches a run by id.
    async fn get(&self, id: Uuid) -> Result<AutomatedResponse, StoreError>;

    /// Moves a run to a new status, enforcing the transition table.
    /// Returns the updated record.
    async fn transition(
        &self,
        id: Uuid,
        to: ExecutionStatus,
    ) -> Result<AutomatedResponse, StoreError>;

    /// Appends one step result to a run's log.
    async fn append_step_result(
        &self,
        id: Uuid,
        result: StepResult,
    ) -> Result<AutomatedResponse, StoreError>;

    /// Lists runs matching the filter. Unspecified sort means most
    /// recent first.
    async fn list(
        &self,
        filter: &ResponseFilter,
        query: &ListQuery,
    ) -> Result<Vec<AutomatedResponse>, StoreError>;
}

/// In-memory implementation of [`ResponseStore`].
pub struct InMemoryResponseStore {
    runs: Arc<RwLock<HashMap<Uuid, AutomatedResponse>>>,
}

impl Default for InMemoryResponseStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryResponseStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            runs: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl ResponseStore for InMemoryResponseStore {
    async fn create(&self, run: AutomatedResponse) -> Result<AutomatedResponse, StoreError> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(&run.id) {
            return Err(StoreError::Conflict(format!(
                "run {} already exists",
                run.id
            )));
        }
        runs.insert(run.id, run.clone());
        Ok(run)
    }

    async fn get(&self, id: Uuid) -> Result<AutomatedResponse, StoreError> {
        let runs = self.runs.read().await;
        runs.get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("run", id))
    }

    async fn transition(
        &self,
        id: Uuid,
        to: ExecutionStatus,
    ) -> Result<AutomatedResponse, StoreError> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("run", id))?;
        run.transition(to)?;
        Ok(run.clone())
    }

    async fn append_step_result(
        &self,
        id: Uuid,
        result: StepResult,
    ) -> Result<AutomatedResponse, StoreError> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("run", id))?;
        run.record_step(result);
        Ok(run.clone())
    }

    async fn list(
        &self,
        filter: &ResponseFilter,
        query: &ListQuery,
    ) -> Result<Vec<AutomatedResponse>, StoreError> {
        let runs = self.runs.read().await;
        let mut result: Vec<AutomatedResponse> =
            runs.values().filter(|r| filter.matches(r)).cloned().collect();
        match query.sort.as_ref().map(|k| k.field.as_str()) {
            Some("created_at") => result.sort_by_key(|r| r.created_at),
            Some("completed_at") => result.sort_by_key(|r| r.completed_at),
            _ => {
                // most recent first
                result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            }
        }
        Ok(query.finish(result))
    }
}
