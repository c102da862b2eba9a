//! Email quarantine action.

use crate::connectors::MailConnector;
use crate::registry::{Action, ActionContext, ActionError};
use async_trait::async_trait;
use sentra_core::dispatch::DispatchOutput;
use sentra_core::playbook::ActionType;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};

/// Moves a message into quarantine on the mail platform.
pub struct QuarantineEmailAction {
    mail: Arc<dyn MailConnector>,
}

impl QuarantineEmailAction {
    /// Creates the action over a mail connector.
    pub fn new(mail: Arc<dyn MailConnector>) -> Self {
        Self { mail }
    }
}

#[async_trait]
impl Action for QuarantineEmailAction {
    fn action_type(&self) -> ActionType {
        ActionType::QuarantineEmail
    }

    fn description(&self) -> &str {
        "Moves a message into quarantine on the mail platform"
    }

    fn supports_rollback(&self) -> bool {
        true
    }

    #[instrument(skip(self, context), fields(run_id = %context.run_id))]
    async fn execute(&self, context: &ActionContext) -> Result<DispatchOutput, ActionError> {
        let message_id = context.require_string("message_id")?;
        self.mail
            .quarantine_message(&message_id)
            .await
            .map_err(|e| ActionError::Connector(e.to_string()))?;
        info!(%message_id, "message quarantined");

        Ok(DispatchOutput::reversible(
            format!("quarantined message {message_id}"),
            json!({ "message_id": message_id }),
        ))
    }

    #[instrument(skip(self, rollback_data))]
    async fn rollback(
        &self,
        rollback_data: serde_json::Value,
    ) -> Result<DispatchOutput, ActionError> {
        let message_id = rollback_data["message_id"].as_str().ok_or_else(|| {
            ActionError::InvalidParameters("missing message_id in rollback data".to_string())
        })?;
        self.mail
            .release_message(message_id)
            .await
            .map_err(|e| ActionError::RollbackFailed(e.to_string()))?;
        info!(%message_id, "message released");
        Ok(DispatchOutput::irreversible(format!(
            "released message {message_id}"
        )))
    }
}
