//! Dispatch seam between the execution engine and the action layer.
//!
//! The engine drives steps through this trait; the concrete registry
//! of action implementations lives in the `sentra-actions` crate.
//! Timeouts are enforced by the engine, not by implementations.

use crate::playbook::{ActionType, PlaybookStep};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the action layer.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("no action registered for '{0}'")]
    NotRegistered(ActionType),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("action execution failed: {0}")]
    ExecutionFailed(String),

    #[error("action '{0}' has no registered inverse")]
    NoInverse(ActionType),

    #[error("inverse action failed: {0}")]
    InverseFailed(String),
}

/// What the engine hands to the action layer for one step.
#[derive(Debug, Clone)]
pub struct StepInvocation {
    /// Run driving this invocation.
    pub run_id: Uuid,
    /// The snapshotted step.
    pub step: PlaybookStep,
    /// Effective target assets for this step.
    pub assets: BTreeSet<String>,
}

/// What the action layer hands back on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchOutput {
    /// Human-readable result message.
    pub message: String,
    /// Structured output data.
    #[serde(default)]
    pub output: HashMap<String, serde_json::Value>,
    /// Whether the applied effect can be reversed.
    pub reversible: bool,
    /// Opaque data the inverse action needs, when reversible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_data: Option<serde_json::Value>,
}

impl DispatchOutput {
    /// Builds an irreversible output.
    pub fn irreversible(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            output: HashMap::new(),
            reversible: false,
            rollback_data: None,
        }
    }

    /// Builds a reversible output carrying rollback data.
    pub fn reversible(message: impl Into<String>, rollback_data: serde_json::Value) -> Self {
        Self {
            message: message.into(),
            output: HashMap::new(),
            reversible: true,
            rollback_data: Some(rollback_data),
        }
    }

    /// Attaches an output value.
    pub fn with_output(mut self, key: &str, value: serde_json::Value) -> Self {
        self.output.insert(key.to_string(), value);
        self
    }
}

/// Polymorphic action capability consumed by the engine and the
/// rollback manager.
#[async_trait]
pub trait ActionDispatch: Send + Sync {
    /// Whether the action type registers an inverse.
    fn is_reversible(&self, action: ActionType) -> bool;

    /// Executes one step. The caller enforces the step timeout.
    async fn execute(&self, invocation: &StepInvocation) -> Result<DispatchOutput, DispatchError>;

    /// Invokes the inverse of a previously executed action.
    async fn inverse(
        &self,
        action: ActionType,
        rollback_data: serde_json::Value,
    ) -> Result<DispatchOutput, DispatchError>;
}
