//! User account disable action.

use crate::connectors::IdentityConnector;
use crate::registry::{Action, ActionContext, ActionError};
use async_trait::async_trait;
use sentra_core::dispatch::DispatchOutput;
use sentra_core::playbook::ActionType;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};

/// Disables a user account in the identity provider.
pub struct DisableUserAction {
    identity: Arc<dyn IdentityConnector>,
}

impl DisableUserAction {
    /// Creates the action over an identity connector.
    pub fn new(identity: Arc<dyn IdentityConnector>) -> Self {
        Self { identity }
    }
}

#[async_trait]
impl Action for DisableUserAction {
    fn action_type(&self) -> ActionType {
        ActionType::DisableUser
    }

    fn description(&self) -> &str {
        "Disables a user account in the identity provider"
    }

    fn supports_rollback(&self) -> bool {
        true
    }

    #[instrument(skip(self, context), fields(run_id = %context.run_id))]
    async fn execute(&self, context: &ActionContext) -> Result<DispatchOutput, ActionError> {
        let username = context.require_string("username")?;
        self.identity
            .disable_user(&username)
            .await
            .map_err(|e| ActionError::Connector(e.to_string()))?;
        info!(%username, "account disabled");

        Ok(DispatchOutput::reversible(
            format!("disabled account {username}"),
            json!({ "username": username }),
        ))
    }

    #[instrument(skip(self, rollback_data))]
    async fn rollback(
        &self,
        rollback_data: serde_json::Value,
    ) -> Result<DispatchOutput, ActionError> {
        let username = rollback_data["username"].as_str().ok_or_else(|| {
            ActionError::InvalidParameters("missing username in rollback data".to_string())
        })?;
        self.identity
            .enable_user(username)
            .await
            .map_err(|e| ActionError::RollbackFailed(e.to_string()))?;
        info!(%username, "account re-enabled");
        Ok(DispatchOutput::irreversible(format!(
            "re-enabled account {username}"
        )))
    }
}
