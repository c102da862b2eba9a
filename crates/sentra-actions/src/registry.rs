//! Action registry.
//!
//! Holds one implementation per [`ActionType`] and adapts them to the
//! engine's dispatch seam. Timeouts are enforced by the engine; an
//! action just runs to completion or fails.

use async_trait::async_trait;
use sentra_core::dispatch::{ActionDispatch, DispatchError, DispatchOutput, StepInvocation};
use sentra_core::playbook::ActionType;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Errors raised by action implementations.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("connector error: {0}")]
    Connector(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("rollback not supported: {0}")]
    RollbackNotSupported(String),

    #[error("rollback failed: {0}")]
    RollbackFailed(String),
}

/// Parameters and targets handed to an action for one step.
#[derive(Debug, Clone)]
pub struct ActionContext {
    /// Run driving this invocation.
    pub run_id: Uuid,
    /// Step parameters from the playbook snapshot.
    pub parameters: HashMap<String, serde_json::Value>,
    /// Effective target assets.
    pub assets: BTreeSet<String>,
}

impl ActionContext {
    /// Creates an empty context for a run.
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            parameters: HashMap::new(),
            assets: BTreeSet::new(),
        }
    }

    /// Adds a parameter.
    pub fn with_param(mut self, key: &str, value: serde_json::Value) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }

    /// Adds a target asset.
    pub fn with_asset(mut self, asset: impl Into<String>) -> Self {
        self.assets.insert(asset.into());
        self
    }

    /// Fetches an optional string parameter.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.parameters
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    /// Fetches a required string parameter.
    pub fn require_string(&self, key: &str) -> Result<String, ActionError> {
        self.get_string(key)
            .ok_or_else(|| ActionError::InvalidParameters(format!("missing parameter '{key}'")))
    }

    /// Fetches a required unsigned integer parameter.
    pub fn require_u64(&self, key: &str) -> Result<u64, ActionError> {
        self.parameters
            .get(key)
            .and_then(|v| v.as_u64())
            .ok_or_else(|| {
                ActionError::InvalidParameters(format!("missing or non-integer parameter '{key}'"))
            })
    }
}

/// One automated response action.
#[async_trait]
pub trait Action: Send + Sync {
    /// The action type this implementation serves.
    fn action_type(&self) -> ActionType;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Whether the action registers an inverse.
    fn supports_rollback(&self) -> bool;

    /// Applies the action.
    async fn execute(&self, context: &ActionContext) -> Result<DispatchOutput, ActionError>;

    /// Reverses a previous execution from its rollback data.
    async fn rollback(
        &self,
        rollback_data: serde_json::Value,
    ) -> Result<DispatchOutput, ActionError> {
        let _ = rollback_data;
        Err(ActionError::RollbackNotSupported(
            self.action_type().to_string(),
        ))
    }
}

/// Registry of action implementations, keyed by action type.
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<ActionType, Arc<dyn Action>>,
}

impl ActionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an action, replacing any previous one of the same
    /// type.
    pub fn register(&mut self, action: Arc<dyn Action>) {
        debug!(action = %action.action_type(), "action registered");
        self.actions.insert(action.action_type(), action);
    }

    /// Registered action types.
    pub fn registered(&self) -> Vec<ActionType> {
        self.actions.keys().copied().collect()
    }

    fn get(&self, action: ActionType) -> Result<&Arc<dyn Action>, DispatchError> {
        self.actions
            .get(&action)
            .ok_or(DispatchError::NotRegistered(action))
    }
}

#[async_trait]
impl ActionDispatch for ActionRegistry {
    fn is_reversible(&self, action: ActionType) -> bool {
        self.actions
            .get(&action)
            .map(|a| a.supports_rollback())
            .unwrap_or(false)
    }

    #[instrument(skip(self, invocation), fields(run_id = %invocation.run_id, action = %invocation.step.action))]
    async fn execute(&self, invocation: &StepInvocation) -> Result<DispatchOutput, DispatchError> {
        let action = self.get(invocation.step.action)?;
        let context = ActionContext {
            run_id: invocation.run_id,
            parameters: invocation.step.parameters.clone(),
            assets: invocation.assets.clone(),
        };
        action.execute(&context).await.map_err(|err| match err {
            ActionError::InvalidParameters(msg) => DispatchError::InvalidParameters(msg),
            other => DispatchError::ExecutionFailed(other.to_string()),
        })
    }

    #[instrument(skip(self, rollback_data))]
    async fn inverse(
        &self,
        action_type: ActionType,
        rollback_data: serde_json::Value,
    ) -> Result<DispatchOutput, DispatchError> {
        let action = self.get(action_type)?;
        if !action.supports_rollback() {
            return Err(DispatchError::NoInverse(action_type));
        }
        action
            .rollback(rollback_data)
            .await
            .map_err(|err| DispatchError::InverseFailed(err.to_string()))
    }
}
