//! Host isolation action.
//!
//! Isolates every target host from the network through the EDR
//! connector. Reversible: the inverse removes isolation from the same
//! hosts.

use crate::connectors::EdrConnector;
use crate::registry::{Action, ActionContext, ActionError};
use async_trait::async_trait;
use sentra_core::dispatch::DispatchOutput;
use sentra_core::playbook::ActionType;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};

/// Isolates target hosts via EDR.
pub struct IsolateHostAction {
    edr: Arc<dyn EdrConnector>,
}

impl IsolateHostAction {
    /// Creates the action over an EDR connector.
    pub fn new(edr: Arc<dyn EdrConnector>) -> Self {
        Self { edr }
    }
}

#[async_trait]
impl Action for IsolateHostAction {
    fn action_type(&self) -> ActionType {
        ActionType::IsolateHost
    }

    fn description(&self) -> &str {
        "Isolates the target hosts from the network via the EDR agent"
    }

    fn supports_rollback(&self) -> bool {
        true
    }

    #[instrument(skip(self, context), fields(run_id = %context.run_id))]
    async fn execute(&self, context: &ActionContext) -> Result<DispatchOutput, ActionError> {
        if context.assets.is_empty() {
            return Err(ActionError::InvalidParameters(
                "no target hosts to isolate".to_string(),
            ));
        }

        let mut isolated = Vec::new();
        for hostname in &context.assets {
            self.edr
                .isolate_host(hostname)
                .await
                .map_err(|e| ActionError::Connector(e.to_string()))?;
            isolated.push(hostname.clone());
        }
        info!(count = isolated.len(), "hosts isolated");

        Ok(DispatchOutput::reversible(
            format!("isolated {} host(s)", isolated.len()),
            json!({ "hostnames": isolated }),
        )
        .with_output("hostnames", json!(context.assets)))
    }

    #[instrument(skip(self, rollback_data))]
    async fn rollback(
        &self,
        rollback_data: serde_json::Value,
    ) -> Result<DispatchOutput, ActionError> {
        let hostnames = rollback_data["hostnames"]
            .as_array()
            .ok_or_else(|| {
                ActionError::InvalidParameters("missing hostnames in rollback data".to_string())
            })?
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect::<Vec<_>>();

        for hostname in &hostnames {
            self.edr
                .unisolate_host(hostname)
                .await
                .map_err(|e| ActionError::RollbackFailed(e.to_string()))?;
        }
        info!(count = hostnames.len(), "host isolation removed");

        Ok(DispatchOutput::irreversible(format!(
            "removed isolation from {} host(s)",
            hostnames.len()
        )))
    }
}
