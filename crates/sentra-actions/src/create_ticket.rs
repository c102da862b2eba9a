//! Ticket creation action.
//!
//! Irreversible: a ticket, once opened, stays in the tracker as part
//! of the incident record.

use crate::connectors::TicketingConnector;
use crate::registry::{Action, ActionContext, ActionError};
use async_trait::async_trait;
use sentra_core::dispatch::DispatchOutput;
use sentra_core::playbook::ActionType;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};

/// Opens a ticket in the incident tracker.
pub struct CreateTicketAction {
    ticketing: Arc<dyn TicketingConnector>,
}

impl CreateTicketAction {
    /// Creates the action over a ticketing connector.
    pub fn new(ticketing: Arc<dyn TicketingConnector>) -> Self {
        Self { ticketing }
    }
}

#[async_trait]
impl Action for CreateTicketAction {
    fn action_type(&self) -> ActionType {
        ActionType::CreateTicket
    }

    fn description(&self) -> &str {
        "Opens a ticket in the incident tracker"
    }

    fn supports_rollback(&self) -> bool {
        false
    }

    #[instrument(skip(self, context), fields(run_id = %context.run_id))]
    async fn execute(&self, context: &ActionContext) -> Result<DispatchOutput, ActionError> {
        let summary = context
            .get_string("summary")
            .unwrap_or_else(|| format!("Automated response {}", context.run_id));
        let description = context.get_string("description").unwrap_or_else(|| {
            format!(
                "Assets involved: {}",
                context
                    .assets
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        });

        let key = self
            .ticketing
            .create_ticket(&summary, &description)
            .await
            .map_err(|e| ActionError::Connector(e.to_string()))?;
        info!(%key, "ticket opened");

        Ok(DispatchOutput::irreversible(format!("opened ticket {key}"))
            .with_output("ticket_key", json!(key)))
    }
}
