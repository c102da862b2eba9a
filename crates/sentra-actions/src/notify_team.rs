//! Team notification action.
//!
//! Reversible by convention: the inverse retracts the posted message
//! and posts nothing new, so a rolled-back run leaves no stale alert
//! in the channel.

use crate::connectors::NotifierConnector;
use crate::registry::{Action, ActionContext, ActionError};
use async_trait::async_trait;
use sentra_core::dispatch::DispatchOutput;
use sentra_core::playbook::ActionType;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};

const DEFAULT_CHANNEL: &str = "#soc-alerts";

/// Posts a notification to the response team channel.
pub struct NotifyTeamAction {
    notifier: Arc<dyn NotifierConnector>,
}

impl NotifyTeamAction {
    /// Creates the action over a notifier connector.
    pub fn new(notifier: Arc<dyn NotifierConnector>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl Action for NotifyTeamAction {
    fn action_type(&self) -> ActionType {
        ActionType::NotifyTeam
    }

    fn description(&self) -> &str {
        "Posts a notification to the response team channel"
    }

    fn supports_rollback(&self) -> bool {
        true
    }

    #[instrument(skip(self, context), fields(run_id = %context.run_id))]
    async fn execute(&self, context: &ActionContext) -> Result<DispatchOutput, ActionError> {
        let channel = context
            .get_string("channel")
            .unwrap_or_else(|| DEFAULT_CHANNEL.to_string());
        let message = context.get_string("message").unwrap_or_else(|| {
            format!(
                "Automated response {} acting on: {}",
                context.run_id,
                context
                    .assets
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        });

        let message_id = self
            .notifier
            .post(&channel, &message)
            .await
            .map_err(|e| ActionError::Connector(e.to_string()))?;
        info!(%channel, %message_id, "team notified");

        Ok(DispatchOutput::reversible(
            format!("notified {channel}"),
            json!({ "message_id": message_id }),
        )
        .with_output("message_id", json!(message_id)))
    }

    #[instrument(skip(self, rollback_data))]
    async fn rollback(
        &self,
        rollback_data: serde_json::Value,
    ) -> Result<DispatchOutput, ActionError> {
        let message_id = rollback_data["message_id"].as_str().ok_or_else(|| {
            ActionError::InvalidParameters("missing message_id in rollback data".to_string())
        })?;
        self.notifier
            .retract(message_id)
            .await
            .map_err(|e| ActionError::RollbackFailed(e.to_string()))?;
        info!(%message_id, "notification retracted");
        Ok(DispatchOutput::irreversible("notification retracted"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::MockNotifierConnector;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_notify_and_retract() {
        let notifier = Arc::new(MockNotifierConnector::new());
        let action = NotifyTeamAction::new(notifier.clone());
        let context = ActionContext::new(Uuid::new_v4()).with_asset("ws-01");

        let output = action.execute(&context).await.unwrap();
        assert!(output.reversible);
        assert_eq!(notifier.live_messages().await.len(), 1);

        action.rollback(output.rollback_data.unwrap()).await.unwrap();
        assert!(notifier.live_messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_custom_channel_and_message() {
        let notifier = Arc::new(MockNotifierConnector::new());
        let action = NotifyTeamAction::new(notifier.clone());
        let context = ActionContext::new(Uuid::new_v4())
            .with_param("channel", json!("#ir-major"))
            .with_param("message", json!("containment started"));

        action.execute(&context).await.unwrap();
        let live = notifier.live_messages().await;
        assert_eq!(live[0].0, "#ir-major");
        assert_eq!(live[0].1, "containment started");
    }
}
