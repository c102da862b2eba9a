//! Rollback of settled runs.
//!
//! Successful steps are reversed in reverse execution order through
//! the dispatch seam. A missing inverse or an inverse failure stops
//! the sweep at that step and leaves the run in `RollbackPartial`;
//! the already reversed steps stay reversed.

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::dispatch::{ActionDispatch, DispatchError};
use crate::playbook::ActionType;
use crate::response::{ExecutionStatus, StepOutcome};
use crate::store::{ResponseStore, StoreError};

/// Errors from the rollback manager.
#[derive(Error, Debug)]
pub enum RollbackError {
    /// The run executed at least one irreversible effect.
    #[error("rollback is not available for run {0}")]
    Unavailable(Uuid),

    /// Only settled, non-skipped runs can be rolled back.
    #[error("run {id} in status {status} cannot be rolled back")]
    InvalidStatus { id: Uuid, status: ExecutionStatus },

    /// The action layer registers no inverse for an executed action.
    #[error("action '{action}' has no inverse; run left in rollback_partial")]
    NoInverse { action: ActionType },

    /// An inverse action failed at runtime.
    #[error("inverse of '{action}' failed: {message}; run left in rollback_partial")]
    InverseFailed { action: ActionType, message: String },

    /// Underlying storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One reversed step in a rollback report.
#[derive(Debug, Clone)]
pub struct ReversalResult {
    /// Step that was reversed.
    pub step_number: u32,
    /// Action whose inverse ran.
    pub action: ActionType,
    /// Message from the inverse action.
    pub message: String,
}

/// Report of a completed rollback.
#[derive(Debug, Clone)]
pub struct RollbackReport {
    /// Run that was rolled back.
    pub run_id: Uuid,
    /// Reversed steps, in the order they were reversed.
    pub reversed: Vec<ReversalResult>,
}

/// Reverses the effects of settled runs.
pub struct RollbackManager {
    responses: Arc<dyn ResponseStore>,
    dispatch: Arc<dyn ActionDispatch>,
}

impl RollbackManager {
    /// Creates a manager over the run store and the action layer.
    pub fn new(responses: Arc<dyn ResponseStore>, dispatch: Arc<dyn ActionDispatch>) -> Self {
        Self {
            responses,
            dispatch,
        }
    }

    /// Rolls back every successful step of a settled run, newest
    /// first. Full reversal leaves the run `RolledBack`.
    #[instrument(skip(self), fields(%run_id))]
    pub async fn rollback(&self, run_id: Uuid) -> Result<RollbackReport, RollbackError> {
        let run = self.responses.get(run_id).await?;

        if !matches!(
            run.execution_status,
            ExecutionStatus::Completed
                | ExecutionStatus::PartiallyFailed
                | ExecutionStatus::Cancelled
        ) {
            return Err(RollbackError::InvalidStatus {
                id: run_id,
                status: run.execution_status,
            });
        }
        if !run.rollback_available {
            return Err(RollbackError::Unavailable(run_id));
        }

        let mut reversed = Vec::new();
        for result in run
            .step_results
            .iter()
            .rev()
            .filter(|r| r.outcome == StepOutcome::Success)
        {
            let data = result
                .rollback_data
                .clone()
                .unwrap_or(serde_json::Value::Null);
            match self.dispatch.inverse(result.action, data).await {
                Ok(output) => {
                    info!(step = result.step_number, action = %result.action, "step reversed");
                    reversed.push(ReversalResult {
                        step_number: result.step_number,
                        action: result.action,
                        message: output.message,
                    });
                }
                Err(err) => {
                    warn!(step = result.step_number, error = %err, "rollback stopped");
                    self.responses
                        .transition(run_id, ExecutionStatus::RollbackPartial)
                        .await?;
                    return Err(match err {
                        DispatchError::NoInverse(action) => RollbackError::NoInverse { action },
                        other => RollbackError::InverseFailed {
                            action: result.action,
                            message: other.to_string(),
                        },
                    });
                }
            }
        }

        self.responses
            .transition(run_id, ExecutionStatus::RolledBack)
            .await?;
        info!(steps = reversed.len(), "run rolled back");
        Ok(RollbackReport { run_id, reversed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{DispatchOutput, StepInvocation};
    use crate::event::{SecurityEvent, Severity};
    use crate::playbook::{Playbook, PlaybookStep};
    use crate::response::{AutomatedResponse, StepResult};
    use crate::store::InMemoryResponseStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// Records inverse invocations; optionally fails on one action.
    struct RecordingDispatch {
        inverses: Mutex<Vec<ActionType>>,
        fail_inverse_on: Option<ActionType>,
    }

    impl RecordingDispatch {
        fn new() -> Self {
            Self {
                inverses: Mutex::new(Vec::new()),
                fail_inverse_on: None,
            }
        }

        fn failing_on(action: ActionType) -> Self {
            Self {
                inverses: Mutex::new(Vec::new()),
                fail_inverse_on: Some(action),
            }
        }
    }

    #[async_trait]
    impl ActionDispatch for RecordingDispatch {
        fn is_reversible(&self, _action: ActionType) -> bool {
            true
        }

        async fn execute(
            &self,
            _invocation: &StepInvocation,
        ) -> Result<DispatchOutput, DispatchError> {
            Ok(DispatchOutput::irreversible("unused"))
        }

        async fn inverse(
            &self,
            action: ActionType,
            _rollback_data: serde_json::Value,
        ) -> Result<DispatchOutput, DispatchError> {
            if self.fail_inverse_on == Some(action) {
                return Err(DispatchError::InverseFailed("connector unreachable".into()));
            }
            self.inverses.lock().await.push(action);
            Ok(DispatchOutput::irreversible("undone"))
        }
    }

    async fn settled_run(store: &InMemoryResponseStore) -> AutomatedResponse {
        let event = SecurityEvent::new("ransomware_detected", Severity::Critical)
            .with_asset("ws-01");
        let playbook = Playbook::new("Containment", "ransomware")
            .with_trigger("ransomware_detected")
            .with_severity(Severity::Critical)
            .with_step(PlaybookStep::new(1, ActionType::IsolateHost))
            .with_step(PlaybookStep::new(2, ActionType::BlockIp))
            .with_step(PlaybookStep::new(3, ActionType::NotifyTeam));
        let run = store
            .create(AutomatedResponse::new(&event, &playbook, 95))
            .await
            .unwrap();
        store
            .transition(run.id, ExecutionStatus::Running)
            .await
            .unwrap();
        for step in &run.steps {
            store
                .append_step_result(
                    run.id,
                    StepResult::success(
                        step,
                        "ok",
                        HashMap::new(),
                        true,
                        Some(json!({ "step": step.step_number })),
                        Utc::now(),
                    ),
                )
                .await
                .unwrap();
        }
        store
            .transition(run.id, ExecutionStatus::Completed)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_rollback_reverses_in_reverse_order() {
        let store = Arc::new(InMemoryResponseStore::new());
        let dispatch = Arc::new(RecordingDispatch::new());
        let run = settled_run(&store).await;
        let manager = RollbackManager::new(store.clone(), dispatch.clone());

        let report = manager.rollback(run.id).await.unwrap();
        assert_eq!(
            report.reversed.iter().map(|r| r.step_number).collect::<Vec<_>>(),
            vec![3, 2, 1]
        );
        assert_eq!(
            *dispatch.inverses.lock().await,
            vec![
                ActionType::NotifyTeam,
                ActionType::BlockIp,
                ActionType::IsolateHost
            ]
        );
        let settled = store.get(run.id).await.unwrap();
        assert_eq!(settled.execution_status, ExecutionStatus::RolledBack);
    }

    #[tokio::test]
    async fn test_rollback_unavailable_is_typed() {
        let store = Arc::new(InMemoryResponseStore::new());
        let run = settled_run(&store).await;
        // rewrite availability by appending an irreversible success
        let step = run.steps[0].clone();
        store
            .append_step_result(
                run.id,
                StepResult::success(&step, "done", HashMap::new(), false, None, Utc::now()),
            )
            .await
            .unwrap();
        let manager = RollbackManager::new(store, Arc::new(RecordingDispatch::new()));
        let err = manager.rollback(run.id).await.unwrap_err();
        assert!(matches!(err, RollbackError::Unavailable(id) if id == run.id));
    }

    #[tokio::test]
    async fn test_rollback_requires_settled_status() {
        let store = Arc::new(InMemoryResponseStore::new());
        let event = SecurityEvent::new("e", Severity::Low).with_asset("a");
        let playbook = Playbook::new("P", "c")
            .with_trigger("e")
            .with_severity(Severity::Low)
            .with_step(PlaybookStep::new(1, ActionType::NotifyTeam));
        let run = store
            .create(AutomatedResponse::new(&event, &playbook, 90))
            .await
            .unwrap();
        let manager = RollbackManager::new(store, Arc::new(RecordingDispatch::new()));
        let err = manager.rollback(run.id).await.unwrap_err();
        assert!(matches!(
            err,
            RollbackError::InvalidStatus {
                status: ExecutionStatus::Pending,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_inverse_failure_leaves_rollback_partial() {
        let store = Arc::new(InMemoryResponseStore::new());
        let run = settled_run(&store).await;
        // step 2's inverse fails; step 3 reverses first, step 1 never runs
        let dispatch = Arc::new(RecordingDispatch::failing_on(ActionType::BlockIp));
        let manager = RollbackManager::new(store.clone(), dispatch.clone());

        let err = manager.rollback(run.id).await.unwrap_err();
        assert!(matches!(
            err,
            RollbackError::InverseFailed {
                action: ActionType::BlockIp,
                ..
            }
        ));
        assert_eq!(*dispatch.inverses.lock().await, vec![ActionType::NotifyTeam]);
        let settled = store.get(run.id).await.unwrap();
        assert_eq!(settled.execution_status, ExecutionStatus::RollbackPartial);
    }
}
