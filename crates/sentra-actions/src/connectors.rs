//! Connector layer between actions and external security tooling.
//!
//! Each connector trait covers one tool category. The mock
//! implementations are the single-node default and the test fixtures;
//! they support latency injection for timeout tests and an
//! unreachable switch for failure tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Errors surfaced by connectors.
#[derive(Error, Debug, Clone)]
pub enum ConnectorError {
    #[error("connector unreachable: {0}")]
    Unreachable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request failed: {0}")]
    RequestFailed(String),
}

/// Endpoint detection and response tooling.
#[async_trait]
pub trait EdrConnector: Send + Sync {
    /// Isolates a host from the network.
    async fn isolate_host(&self, hostname: &str) -> Result<(), ConnectorError>;

    /// Removes isolation from a host.
    async fn unisolate_host(&self, hostname: &str) -> Result<(), ConnectorError>;

    /// Kills a process on a host.
    async fn terminate_process(&self, hostname: &str, pid: u32) -> Result<(), ConnectorError>;
}

/// Network firewall management.
#[async_trait]
pub trait FirewallConnector: Send + Sync {
    /// Adds a block rule for an address.
    async fn block_ip(&self, ip: &str, reason: &str) -> Result<(), ConnectorError>;

    /// Removes the block rule for an address.
    async fn unblock_ip(&self, ip: &str) -> Result<(), ConnectorError>;
}

/// Directory / identity provider.
#[async_trait]
pub trait IdentityConnector: Send + Sync {
    /// Disables a user account.
    async fn disable_user(&self, username: &str) -> Result<(), ConnectorError>;

    /// Re-enables a user account.
    async fn enable_user(&self, username: &str) -> Result<(), ConnectorError>;
}

/// Mail platform.
#[async_trait]
pub trait MailConnector: Send + Sync {
    /// Moves a message to quarantine.
    async fn quarantine_message(&self, message_id: &str) -> Result<(), ConnectorError>;

    /// Releases a message from quarantine.
    async fn release_message(&self, message_id: &str) -> Result<(), ConnectorError>;
}

/// Ticketing system.
#[async_trait]
pub trait TicketingConnector: Send + Sync {
    /// Opens a ticket; returns the ticket key.
    async fn create_ticket(&self, summary: &str, description: &str)
        -> Result<String, ConnectorError>;
}

/// Team messaging.
#[async_trait]
pub trait NotifierConnector: Send + Sync {
    /// Posts a message; returns the message id.
    async fn post(&self, channel: &str, text: &str) -> Result<String, ConnectorError>;

    /// Retracts a previously posted message.
    async fn retract(&self, message_id: &str) -> Result<(), ConnectorError>;
}

/// Shared failure/latency injection for the mock connectors.
struct MockState {
    unreachable: bool,
    latency: Duration,
}

impl MockState {
    fn new() -> Arc<RwLock<Self>> {
        Arc::new(RwLock::new(Self {
            unreachable: false,
            latency: Duration::ZERO,
        }))
    }
}

macro_rules! mock_gate {
    ($self:ident, $name:expr) => {{
        let (unreachable, latency) = {
            let state = $self.state.read().await;
            (state.unreachable, state.latency)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if unreachable {
            return Err(ConnectorError::Unreachable($name.to_string()));
        }
    }};
}

/// Mock EDR connector.
pub struct MockEdrConnector {
    state: Arc<RwLock<MockState>>,
    isolated: Arc<RwLock<HashSet<String>>>,
    terminated: Arc<RwLock<Vec<(String, u32)>>>,
}

impl Default for MockEdrConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEdrConnector {
    /// Creates a healthy mock.
    pub fn new() -> Self {
        Self {
            state: MockState::new(),
            isolated: Arc::new(RwLock::new(HashSet::new())),
            terminated: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Injects a fixed latency into every call.
    pub async fn set_latency(&self, latency: Duration) {
        self.state.write().await.latency = latency;
    }

    /// Makes every call fail as unreachable.
    pub async fn set_unreachable(&self, unreachable: bool) {
        self.state.write().await.unreachable = unreachable;
    }

    /// True if the host is currently isolated.
    pub async fn is_isolated(&self, hostname: &str) -> bool {
        self.isolated.read().await.contains(hostname)
    }

    /// Terminated (hostname, pid) pairs, for assertions.
    pub async fn terminated(&self) -> Vec<(String, u32)> {
        self.terminated.read().await.clone()
    }
}

#[async_trait]
impl EdrConnector for MockEdrConnector {
    async fn isolate_host(&self, hostname: &str) -> Result<(), ConnectorError> {
        mock_gate!(self, "edr");
        self.isolated.write().await.insert(hostname.to_string());
        debug!(hostname, "mock host isolated");
        Ok(())
    }

    async fn unisolate_host(&self, hostname: &str) -> Result<(), ConnectorError> {
        mock_gate!(self, "edr");
        if !self.isolated.write().await.remove(hostname) {
            return Err(ConnectorError::NotFound(format!(
                "host {hostname} is not isolated"
            )));
        }
        Ok(())
    }

    async fn terminate_process(&self, hostname: &str, pid: u32) -> Result<(), ConnectorError> {
        mock_gate!(self, "edr");
        self.terminated
            .write()
            .await
            .push((hostname.to_string(), pid));
        Ok(())
    }
}

/// Mock firewall connector.
pub struct MockFirewallConnector {
    state: Arc<RwLock<MockState>>,
    blocked: Arc<RwLock<HashMap<String, String>>>,
}

impl Default for MockFirewallConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFirewallConnector {
    /// Creates a healthy mock.
    pub fn new() -> Self {
        Self {
            state: MockState::new(),
            blocked: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Makes every call fail as unreachable.
    pub async fn set_unreachable(&self, unreachable: bool) {
        self.state.write().await.unreachable = unreachable;
    }

    /// True if the address is currently blocked.
    pub async fn is_blocked(&self, ip: &str) -> bool {
        self.blocked.read().await.contains_key(ip)
    }
}

#[async_trait]
impl FirewallConnector for MockFirewallConnector {
    async fn block_ip(&self, ip: &str, reason: &str) -> Result<(), ConnectorError> {
        mock_gate!(self, "firewall");
        self.blocked
            .write()
            .await
            .insert(ip.to_string(), reason.to_string());
        debug!(ip, "mock ip blocked");
        Ok(())
    }

    async fn unblock_ip(&self, ip: &str) -> Result<(), ConnectorError> {
        mock_gate!(self, "firewall");
        if self.blocked.write().await.remove(ip).is_none() {
            return Err(ConnectorError::NotFound(format!("ip {ip} is not blocked")));
        }
        Ok(())
    }
}

/// Mock identity connector.
pub struct MockIdentityConnector {
    state: Arc<RwLock<MockState>>,
    disabled: Arc<RwLock<HashSet<String>>>,
}

impl Default for MockIdentityConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockIdentityConnector {
    /// Creates a healthy mock.
    pub fn new() -> Self {
        Self {
            state: MockState::new(),
            disabled: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Makes every call fail as unreachable.
    pub async fn set_unreachable(&self, unreachable: bool) {
        self.state.write().await.unreachable = unreachable;
    }

    /// True if the account is currently disabled.
    pub async fn is_disabled(&self, username: &str) -> bool {
        self.disabled.read().await.contains(username)
    }
}

#[async_trait]
impl IdentityConnector for MockIdentityConnector {
    async fn disable_user(&self, username: &str) -> Result<(), ConnectorError> {
        mock_gate!(self, "identity");
        self.disabled.write().await.insert(username.to_string());
        Ok(())
    }

    async fn enable_user(&self, username: &str) -> Result<(), ConnectorError> {
        mock_gate!(self, "identity");
        if !self.disabled.write().await.remove(username) {
            return Err(ConnectorError::NotFound(format!(
                "user {username} is not disabled"
            )));
        }
        Ok(())
    }
}

/// Mock mail connector.
pub struct MockMailConnector {
    state: Arc<RwLock<MockState>>,
    quarantined: Arc<RwLock<HashSet<String>>>,
}

impl Default for MockMailConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMailConnector {
    /// Creates a healthy mock.
    pub fn new() -> Self {
        Self {
            state: MockState::new(),
            quarantined: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Injects a fixed latency into every call.
    pub async fn set_latency(&self, latency: Duration) {
        self.state.write().await.latency = latency;
    }

    /// True if the message is currently quarantined.
    pub async fn is_quarantined(&self, message_id: &str) -> bool {
        self.quarantined.read().await.contains(message_id)
    }
}

#[async_trait]
impl MailConnector for MockMailConnector {
    async fn quarantine_message(&self, message_id: &str) -> Result<(), ConnectorError> {
        mock_gate!(self, "mail");
        self.quarantined.write().await.insert(message_id.to_string());
        Ok(())
    }

    async fn release_message(&self, message_id: &str) -> Result<(), ConnectorError> {
        mock_gate!(self, "mail");
        if !self.quarantined.write().await.remove(message_id) {
            return Err(ConnectorError::NotFound(format!(
                "message {message_id} is not quarantined"
            )));
        }
        Ok(())
    }
}

/// Mock ticketing connector.
pub struct MockTicketingConnector {
    state: Arc<RwLock<MockState>>,
    tickets: Arc<RwLock<Vec<(String, String)>>>,
}

impl Default for MockTicketingConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTicketingConnector {
    /// Creates a healthy mock.
    pub fn new() -> Self {
        Self {
            state: MockState::new(),
            tickets: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Created (key, summary) pairs, for assertions.
    pub async fn tickets(&self) -> Vec<(String, String)> {
        self.tickets.read().await.clone()
    }
}

#[async_trait]
impl TicketingConnector for MockTicketingConnector {
    async fn create_ticket(
        &self,
        summary: &str,
        _description: &str,
    ) -> Result<String, ConnectorError> {
        mock_gate!(self, "ticketing");
        let mut tickets = self.tickets.write().await;
        let key = format!("SEC-{}", tickets.len() + 1);
        tickets.push((key.clone(), summary.to_string()));
        Ok(key)
    }
}

/// Mock notifier connector.
pub struct MockNotifierConnector {
    state: Arc<RwLock<MockState>>,
    posted: Arc<RwLock<HashMap<String, (String, String)>>>,
    retracted: Arc<RwLock<Vec<String>>>,
}

impl Default for MockNotifierConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNotifierConnector {
    /// Creates a healthy mock.
    pub fn new() -> Self {
        Self {
            state: MockState::new(),
            posted: Arc::new(RwLock::new(HashMap::new())),
            retracted: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Makes every call fail as unreachable.
    pub async fn set_unreachable(&self, unreachable: bool) {
        self.state.write().await.unreachable = unreachable;
    }

    /// Messages posted and not retracted, as (channel, text).
    pub async fn live_messages(&self) -> Vec<(String, String)> {
        let posted = self.posted.read().await;
        let retracted = self.retracted.read().await;
        posted
            .iter()
            .filter(|(id, _)| !retracted.contains(id))
            .map(|(_, msg)| msg.clone())
            .collect()
    }
}

#[async_trait]
impl NotifierConnector for MockNotifierConnector {
    async fn post(&self, channel: &str, text: &str) -> Result<String, ConnectorError> {
        mock_gate!(self, "notifier");
        let id = Uuid::new_v4().to_string();
        self.posted
            .write()
            .await
            .insert(id.clone(), (channel.to_string(), text.to_string()));
        Ok(id)
    }

    async fn retract(&self, message_id: &str) -> Result<(), ConnectorError> {
        mock_gate!(self, "notifier");
        if !self.posted.read().await.contains_key(message_id) {
            return Err(ConnectorError::NotFound(format!(
                "message {message_id} was never posted"
            )));
        }
        self.retracted.write().await.push(message_id.to_string());
        Ok(())
    }
}
