//! # sentra-actions
//!
//! Action implementations and connector layer for Sentra.
//!
//! This crate provides the action registry that backs the engine's
//! dispatch seam, the connector traits for external security tooling,
//! and the built-in response actions (host isolation, IP blocking,
//! account disabling, and so on).

pub mod block_ip;
pub mod connectors;
pub mod create_ticket;
pub mod disable_user;
pub mod isolate_host;
pub mod notify_team;
pub mod quarantine_email;
pub mod registry;
pub mod terminate_process;

pub use block_ip::BlockIpAction;
pub use connectors::{
    ConnectorError, EdrConnector, FirewallConnector, IdentityConnector, MailConnector,
    MockEdrConnector, MockFirewallConnector, MockIdentityConnector, MockMailConnector,
    MockNotifierConnector, MockTicketingConnector, NotifierConnector, TicketingConnector,
};
pub use create_ticket::CreateTicketAction;
pub use disable_user::DisableUserAction;
pub use isolate_host::IsolateHostAction;
pub use notify_team::NotifyTeamAction;
pub use quarantine_email::QuarantineEmailAction;
pub use registry::{Action, ActionContext, ActionError, ActionRegistry};
pub use terminate_process::TerminateProcessAction;

use std::sync::Arc;

/// Wires every built-in action into a registry over the given
/// connectors.
#[allow(clippy::too_many_arguments)]
pub fn build_registry(
    edr: Arc<dyn EdrConnector>,
    firewall: Arc<dyn FirewallConnector>,
    identity: Arc<dyn IdentityConnector>,
    mail: Arc<dyn MailConnector>,
    ticketing: Arc<dyn TicketingConnector>,
    notifier: Arc<dyn NotifierConnector>,
) -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    registry.register(Arc::new(IsolateHostAction::new(Arc::clone(&edr))));
    registry.register(Arc::new(BlockIpAction::new(firewall)));
    registry.register(Arc::new(DisableUserAction::new(identity)));
    registry.register(Arc::new(QuarantineEmailAction::new(mail)));
    registry.register(Arc::new(TerminateProcessAction::new(edr)));
    registry.register(Arc::new(NotifyTeamAction::new(notifier)));
    registry.register(Arc::new(CreateTicketAction::new(ticketing)));
    registry
}
