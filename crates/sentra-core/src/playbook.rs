//! Playbook definitions for automated response.
//!
//! A playbook maps event trigger conditions to an ordered list of
//! remediation steps. Validation happens at write time in the playbook
//! store; the execution engine assumes well-formed playbooks.

use crate::event::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use uuid::Uuid;

/// Closed set of automated response action types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    IsolateHost,
    BlockIp,
    DisableUser,
    QuarantineEmail,
    TerminateProcess,
    NotifyTeam,
    CreateTicket,
}

impl ActionType {
    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::IsolateHost => "isolate_host",
            ActionType::BlockIp => "block_ip",
            ActionType::DisableUser => "disable_user",
            ActionType::QuarantineEmail => "quarantine_email",
            ActionType::TerminateProcess => "terminate_process",
            ActionType::NotifyTeam => "notify_team",
            ActionType::CreateTicket => "create_ticket",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "isolate_host" => Some(ActionType::IsolateHost),
            "block_ip" => Some(ActionType::BlockIp),
            "disable_user" => Some(ActionType::DisableUser),
            "quarantine_email" => Some(ActionType::QuarantineEmail),
            "terminate_process" => Some(ActionType::TerminateProcess),
            "notify_team" => Some(ActionType::NotifyTeam),
            "create_ticket" => Some(ActionType::CreateTicket),
            _ => None,
        }
    }

    /// Returns all action types.
    pub fn all() -> &'static [ActionType] {
        &[
            ActionType::IsolateHost,
            ActionType::BlockIp,
            ActionType::DisableUser,
            ActionType::QuarantineEmail,
            ActionType::TerminateProcess,
            ActionType::NotifyTeam,
            ActionType::CreateTicket,
        ]
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single remediation step within a playbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookStep {
    /// Position in the playbook, dense 1..N.
    pub step_number: u32,
    /// The action to execute.
    pub action: ActionType,
    /// Role accountable for the step outcome.
    pub role_responsible: String,
    /// Per-step execution timeout in seconds. Lock waiting counts
    /// against the same budget.
    pub timeout_secs: u64,
    /// Action parameters.
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
}

impl PlaybookStep {
    /// Creates a new step.
    pub fn new(step_number: u32, action: ActionType) -> Self {
        Self {
            step_number,
            action,
            role_responsible: "soc_analyst".to_string(),
            timeout_secs: 60,
            parameters: HashMap::new(),
        }
    }

    /// Sets the responsible role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role_responsible = role.into();
        self
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Sets a parameter.
    pub fn with_param(mut self, key: &str, value: serde_json::Value) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }

    /// The explicit target assets for this step, if the `assets`
    /// parameter names any. Steps without the parameter operate on
    /// the run's full target set.
    pub fn explicit_assets(&self) -> Option<BTreeSet<String>> {
        self.parameters.get("assets").and_then(|v| {
            v.as_array().map(|arr| {
                arr.iter()
                    .filter_map(|a| a.as_str().map(String::from))
                    .collect()
            })
        })
    }
}

/// Errors produced by playbook validation at write time.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("playbook must have at least one step")]
    EmptySteps,

    #[error("step numbers must be dense 1..N: expected {expected}, found {found}")]
    NonDenseSteps { expected: u32, found: u32 },

    #[error("confidence threshold must be within 0..=100, got {0}")]
    ThresholdOutOfRange(u8),

    #[error("playbook name must not be empty")]
    EmptyName,
}

/// A playbook: trigger conditions plus an ordered list of steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playbook {
    /// Unique identifier.
    pub id: Uuid,
    /// Human-readable name.
    pub name: String,
    /// Category, e.g. "ransomware" or "phishing".
    pub category: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Event type tags that trigger this playbook.
    pub trigger_conditions: BTreeSet<String>,
    /// Severities this playbook responds to.
    pub severity_mapping: BTreeSet<Severity>,
    /// Ordered remediation steps.
    pub steps: Vec<PlaybookStep>,
    /// Whether this playbook is eligible for matching.
    pub active: bool,
    /// Minimum detection confidence (0..=100) required before any
    /// step is executed.
    pub confidence_threshold: u8,
    /// Administrator-assigned tiebreak when multiple playbooks match
    /// the same event. Higher sorts first. Defaults to 0.
    #[serde(default)]
    pub priority: i32,
    /// When the playbook was created.
    pub created_at: DateTime<Utc>,
    /// When the playbook was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Playbook {
    /// Creates a new playbook in the given category.
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            category: category.into(),
            description: None,
            trigger_conditions: BTreeSet::new(),
            severity_mapping: BTreeSet::new(),
            steps: Vec::new(),
            active: true,
            confidence_threshold: 80,
            priority: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a trigger condition tag.
    pub fn with_trigger(mut self, event_type: impl Into<String>) -> Self {
        self.trigger_conditions.insert(event_type.into());
        self
    }

    /// Adds a severity to the mapping.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity_mapping.insert(severity);
        self
    }

    /// Appends a step.
    pub fn with_step(mut self, step: PlaybookStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Sets the confidence threshold.
    pub fn with_confidence_threshold(mut self, threshold: u8) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Sets the active flag.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Sets the matching priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Validates write-time invariants: non-empty steps, dense unique
    /// step numbering, confidence threshold in range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.steps.is_empty() {
            return Err(ValidationError::EmptySteps);
        }
        for (idx, step) in self.steps.iter().enumerate() {
            let expected = idx as u32 + 1;
            if step.step_number != expected {
                return Err(ValidationError::NonDenseSteps {
                    expected,
                    found: step.step_number,
                });
            }
        }
        if self.confidence_threshold > 100 {
            return Err(ValidationError::ThresholdOutOfRange(
                self.confidence_threshold,
            ));
        }
        Ok(())
    }

    /// Renumbers steps to a dense 1..N sequence in their current
    /// order. Reordering callers renumber atomically through this.
    pub fn renumber_steps(&mut self) {
        for (idx, step) in self.steps.iter_mut().enumerate() {
            step.step_number = idx as u32 + 1;
        }
        self.updated_at = Utc::now();
    }
}
