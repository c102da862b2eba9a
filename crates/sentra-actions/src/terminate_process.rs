//! Process termination action.
//!
//! Killing a process cannot be undone, so this action is
//! irreversible and any run containing a successful termination loses
//! rollback availability.

use crate::connectors::EdrConnector;
use crate::registry::{Action, ActionContext, ActionError};
use async_trait::async_trait;
use sentra_core::dispatch::DispatchOutput;
use sentra_core::playbook::ActionType;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};

/// Terminates a process on the target hosts via EDR.
pub struct TerminateProcessAction {
    edr: Arc<dyn EdrConnector>,
}

impl TerminateProcessAction {
    /// Creates the action over an EDR connector.
    pub fn new(edr: Arc<dyn EdrConnector>) -> Self {
        Self { edr }
    }
}

#[async_trait]
impl Action for TerminateProcessAction {
    fn action_type(&self) -> ActionType {
        ActionType::TerminateProcess
    }

    fn description(&self) -> &str {
        "Kills a process on the target hosts via the EDR agent"
    }

    fn supports_rollback(&self) -> bool {
        false
    }

    #[instrument(skip(self, context), fields(run_id = %context.run_id))]
    async fn execute(&self, context: &ActionContext) -> Result<DispatchOutput, ActionError> {
        let raw_pid = context.require_u64("pid")?;
        let pid = u32::try_from(raw_pid).map_err(|_| {
            ActionError::InvalidParameters(format!("pid {raw_pid} out of range"))
        })?;
        if context.assets.is_empty() {
            return Err(ActionError::InvalidParameters(
                "no target hosts for process termination".to_string(),
            ));
        }

        for hostname in &context.assets {
            self.edr
                .terminate_process(hostname, pid)
                .await
                .map_err(|e| ActionError::Connector(e.to_string()))?;
        }
        info!(pid, hosts = context.assets.len(), "process terminated");

        Ok(
            DispatchOutput::irreversible(format!(
                "terminated pid {pid} on {} host(s)",
                context.assets.len()
            ))
            .with_output("pid", json!(pid)),
        )
    }
}
