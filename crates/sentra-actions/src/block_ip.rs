//! IP block action.

use crate::connectors::FirewallConnector;
use crate::registry::{Action, ActionContext, ActionError};
use async_trait::async_trait;
use sentra_core::dispatch::DispatchOutput;
use sentra_core::playbook::ActionType;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};

/// Blocks an address at the perimeter firewall.
pub struct BlockIpAction {
    firewall: Arc<dyn FirewallConnector>,
}

impl BlockIpAction {
    /// Creates the action over a firewall connector.
    pub fn new(firewall: Arc<dyn FirewallConnector>) -> Self {
        Self { firewall }
    }
}

#[async_trait]
impl Action for BlockIpAction {
    fn action_type(&self) -> ActionType {
        ActionType::BlockIp
    }

    fn description(&self) -> &str {
        "Adds a firewall block rule for the given address"
    }

    fn supports_rollback(&self) -> bool {
        true
    }

    #[instrument(skip(self, context), fields(run_id = %context.run_id))]
    async fn execute(&self, context: &ActionContext) -> Result<DispatchOutput, ActionError> {
        let ip = context.require_string("ip")?;
        let reason = context
            .get_string("reason")
            .unwrap_or_else(|| "automated block".to_string());

        self.firewall
            .block_ip(&ip, &reason)
            .await
            .map_err(|e| ActionError::Connector(e.to_string()))?;
        info!(%ip, "address blocked");

        Ok(
            DispatchOutput::reversible(format!("blocked {ip}"), json!({ "ip": ip }))
                .with_output("ip", json!(ip)),
        )
    }

    #[instrument(skip(self, rollback_data))]
    async fn rollback(
        &self,
        rollback_data: serde_json::Value,
    ) -> Result<DispatchOutput, ActionError> {
        let ip = rollback_data["ip"].as_str().ok_or_else(|| {
            ActionError::InvalidParameters("missing ip in rollback data".to_string())
        })?;
        self.firewall
            .unblock_ip(ip)
            .await
            .map_err(|e| ActionError::RollbackFailed(e.to_string()))?;
        info!(%ip, "block rule removed");
        Ok(DispatchOutput::irreversible(format!("unblocked {ip}")))
    }
}
