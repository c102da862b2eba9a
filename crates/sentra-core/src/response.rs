//! Automated response runs and their execution state machine.
//!
//! An [`AutomatedResponse`] is one execution attempt of a playbook
//! against a triggering event. Status changes go through an explicit
//! transition table; illegal transitions are rejected, never silently
//! applied.

use crate::event::SecurityEvent;
use crate::playbook::{ActionType, Playbook, PlaybookStep};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use uuid::Uuid;

/// Execution status of a response run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Created, confidence gate not yet evaluated.
    Pending,
    /// Steps are executing.
    Running,
    /// All steps succeeded.
    Completed,
    /// All steps failed.
    Failed,
    /// Some steps failed, some succeeded.
    PartiallyFailed,
    /// Confidence below the playbook threshold; no steps executed.
    SkippedLowConfidence,
    /// Cancelled by an analyst at a step boundary.
    Cancelled,
    /// All executed steps were reversed.
    RolledBack,
    /// Rollback stopped partway; remaining effects need human review.
    RollbackPartial,
}

impl ExecutionStatus {
    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::PartiallyFailed => "partially_failed",
            ExecutionStatus::SkippedLowConfidence => "skipped_low_confidence",
            ExecutionStatus::Cancelled => "cancelled",
            ExecutionStatus::RolledBack => "rolled_back",
            ExecutionStatus::RollbackPartial => "rollback_partial",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ExecutionStatus::Pending),
            "running" => Some(ExecutionStatus::Running),
            "completed" => Some(ExecutionStatus::Completed),
            "failed" => Some(ExecutionStatus::Failed),
            "partially_failed" => Some(ExecutionStatus::PartiallyFailed),
            "skipped_low_confidence" => Some(ExecutionStatus::SkippedLowConfidence),
            "cancelled" => Some(ExecutionStatus::Cancelled),
            "rolled_back" => Some(ExecutionStatus::RolledBack),
            "rollback_partial" => Some(ExecutionStatus::RollbackPartial),
            _ => None,
        }
    }

    /// True if no further transition is permitted.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Failed
                | ExecutionStatus::SkippedLowConfidence
                | ExecutionStatus::RolledBack
                | ExecutionStatus::RollbackPartial
        )
    }

    /// True if the run has finished executing steps (rollback may
    /// still apply).
    pub fn is_settled(&self) -> bool {
        !matches!(self, ExecutionStatus::Pending | ExecutionStatus::Running)
    }

    /// The explicit transition table.
    pub fn can_transition(&self, to: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, to),
            (Pending, Running)
                | (Pending, SkippedLowConfidence)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, PartiallyFailed)
                | (Running, Cancelled)
                | (Completed, RolledBack)
                | (Completed, RollbackPartial)
                | (PartiallyFailed, RolledBack)
                | (PartiallyFailed, RollbackPartial)
                | (Cancelled, RolledBack)
                | (Cancelled, RollbackPartial)
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a status transition violates the table.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid run transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: ExecutionStatus,
    pub to: ExecutionStatus,
}

/// Outcome of a single executed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Success,
    Failure,
    Timeout,
}

impl StepOutcome {
    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepOutcome::Success => "success",
            StepOutcome::Failure => "failure",
            StepOutcome::Timeout => "timeout",
        }
    }
}

/// Record of one executed step. Appended to the run's result log;
/// never rewritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Step number within the snapshotted playbook.
    pub step_number: u32,
    /// Action that was executed.
    pub action: ActionType,
    /// Outcome of the execution.
    pub outcome: StepOutcome,
    /// Result or error message.
    pub message: String,
    /// Output data from the action collaborator.
    #[serde(default)]
    pub output: HashMap<String, serde_json::Value>,
    /// Whether the executed effect can be reversed. Failed and
    /// timed-out steps took no effect and are trivially reversible.
    pub reversible: bool,
    /// Opaque data needed to invoke the inverse action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_data: Option<serde_json::Value>,
    /// When the step started.
    pub started_at: DateTime<Utc>,
    /// When the step finished.
    pub completed_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl StepResult {
    /// Builds a successful result.
    pub fn success(
        step: &PlaybookStep,
        message: impl Into<String>,
        output: HashMap<String, serde_json::Value>,
        reversible: bool,
        rollback_data: Option<serde_json::Value>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let completed_at = Utc::now();
        Self {
            step_number: step.step_number,
            action: step.action,
            outcome: StepOutcome::Success,
            message: message.into(),
            output,
            reversible,
            rollback_data,
            started_at,
            completed_at,
            duration_ms: (completed_at - started_at).num_milliseconds().max(0) as u64,
        }
    }

    /// Builds a failed result. Nothing took effect, so the step is
    /// trivially reversible.
    pub fn failure(
        step: &PlaybookStep,
        message: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let completed_at = Utc::now();
        Self {
            step_number: step.step_number,
            action: step.action,
            outcome: StepOutcome::Failure,
            message: message.into(),
            output: HashMap::new(),
            reversible: true,
            rollback_data: None,
            started_at,
            completed_at,
            duration_ms: (completed_at - started_at).num_milliseconds().max(0) as u64,
        }
    }

    /// Builds a timed-out result. `timeout_secs` is the effective
    /// deadline that was enforced, which may differ from the step's
    /// own when a configured default applied.
    pub fn timeout(step: &PlaybookStep, timeout_secs: u64, started_at: DateTime<Utc>) -> Self {
        let completed_at = Utc::now();
        Self {
            step_number: step.step_number,
            action: step.action,
            outcome: StepOutcome::Timeout,
            message: format!("step did not complete within {timeout_secs} seconds"),
            output: HashMap::new(),
            reversible: true,
            rollback_data: None,
            started_at,
            completed_at,
            duration_ms: (completed_at - started_at).num_milliseconds().max(0) as u64,
        }
    }
}

/// One execution attempt of a playbook against a triggering event.
///
/// Owned exclusively by the execution engine from creation to a
/// settled state; read-only to every other component. Steps and
/// target assets are snapshotted at creation (copy-on-execute), so
/// editing the playbook mid-incident cannot corrupt an active run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomatedResponse {
    /// Unique identifier.
    pub id: Uuid,
    /// The event that triggered this run.
    pub trigger_event_id: Uuid,
    /// The playbook this run executes.
    pub playbook_id: Uuid,
    /// Playbook name at snapshot time, for display.
    pub playbook_name: String,
    /// Current status.
    pub execution_status: ExecutionStatus,
    /// Detection confidence at trigger time (0..=100).
    pub confidence_at_trigger: u8,
    /// Confidence threshold snapshotted from the playbook.
    pub confidence_threshold: u8,
    /// Assets this run operates on.
    pub target_assets: BTreeSet<String>,
    /// Snapshot of the playbook steps at creation time.
    pub steps: Vec<PlaybookStep>,
    /// Append-only log of executed steps.
    pub step_results: Vec<StepResult>,
    /// Whether every executed effect can be reversed.
    pub rollback_available: bool,
    /// When the run record was created.
    pub created_at: DateTime<Utc>,
    /// When step execution began.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the run settled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl AutomatedResponse {
    /// Creates a new run in `Pending`, snapshotting the playbook's
    /// steps and the event's asset set.
    pub fn new(event: &SecurityEvent, playbook: &Playbook, confidence: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            trigger_event_id: event.id,
            playbook_id: playbook.id,
            playbook_name: playbook.name.clone(),
            execution_status: ExecutionStatus::Pending,
            confidence_at_trigger: confidence,
            confidence_threshold: playbook.confidence_threshold,
            target_assets: event.affected_assets.clone(),
            steps: playbook.steps.clone(),
            step_results: Vec::new(),
            rollback_available: false,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Applies a status transition, enforcing the table.
    pub fn transition(&mut self, to: ExecutionStatus) -> Result<(), TransitionError> {
        if !self.execution_status.can_transition(to) {
            return Err(TransitionError {
                from: self.execution_status,
                to,
            });
        }
        match to {
            ExecutionStatus::Running => self.started_at = Some(Utc::now()),
            _ if to.is_settled() && self.completed_at.is_none() => {
                self.completed_at = Some(Utc::now())
            }
            _ => {}
        }
        self.execution_status = to;
        Ok(())
    }

    /// Appends a step result and refreshes `rollback_available`.
    pub fn record_step(&mut self, result: StepResult) {
        self.step_results.push(result);
        self.rollback_available = self.compute_rollback_available();
    }

    /// Rollback is available iff every executed step either took no
    /// effect or is reversible.
    fn compute_rollback_available(&self) -> bool {
        !self.step_results.is_empty()
            && self
                .step_results
                .iter()
                .all(|r| r.outcome != StepOutcome::Success || r.reversible)
    }

    /// The terminal status implied by the recorded step results:
    /// all success => Completed, none => Failed, mixed =>
    /// PartiallyFailed.
    pub fn aggregate_status(&self) -> ExecutionStatus {
        let succeeded = self
            .step_results
            .iter()
            .filter(|r| r.outcome == StepOutcome::Success)
            .count();
        if succeeded == self.step_results.len() && succeeded > 0 {
            ExecutionStatus::Completed
        } else if succeeded == 0 {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::PartiallyFailed
        }
    }

    /// Fraction of executed steps that succeeded, if any executed.
    pub fn success_rate(&self) -> Option<f64> {
        if self.step_results.is_empty() {
            return None;
        }
        let succeeded = self
            .step_results
            .iter()
            .filter(|r| r.outcome == StepOutcome::Success)
            .count();
        Some(succeeded as f64 / self.step_results.len() as f64)
    }
}

/// Filter criteria for listing runs.
#[derive(Debug, Clone, Default)]
pub struct ResponseFilter {
    /// Filter by status.
    pub status: Option<ExecutionStatus>,
    /// Filter by playbook.
    pub playbook_id: Option<Uuid>,
    /// Filter by triggering event.
    pub trigger_event_id: Option<Uuid>,
    /// Only runs touching this asset.
    pub asset: Option<String>,
}

impl ResponseFilter {
    /// Returns true if the run passes the filter.
    pub fn matches(&self, run: &AutomatedResponse) -> bool {
        if let Some(status) = self.status {
            if run.execution_status != status {
                return false;
            }
        }
        if let Some(id) = self.playbook_id {
            if run.playbook_id != id {
                return false;
            }
        }
        if let Some(id) = self.trigger_event_id {
            if run.trigger_event_id != id {
                return false;
            }
        }
        if let Some(ref asset) = self.asset {
            if !run.target_assets.contains(asset) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Severity;

    fn sample_run() -> AutomatedResponse {
        let event = SecurityEvent::new("ransomware_detected", Severity::Critical)
            .with_asset("srv-01")
            .with_asset("ws-02");
        let playbook = Playbook::new("Containment", "ransomware")
            .with_trigger("ransomware_detected")
            .with_severity(Severity::Critical)
            .with_step(PlaybookStep::new(1, ActionType::IsolateHost))
            .with_step(PlaybookStep::new(2, ActionType::NotifyTeam));
        AutomatedResponse::new(&event, &playbook, 95)
    }

    #[test]
    fn test_new_run_snapshots_playbook() {
        let run = sample_run();
        assert_eq!(run.execution_status, ExecutionStatus::Pending);
        assert_eq!(run.steps.len(), 2);
        assert_eq!(run.target_assets.len(), 2);
        assert!(!run.rollback_available);
        assert!(run.started_at.is_none());
    }

    #[test]
    fn test_legal_transitions() {
        let mut run = sample_run();
        assert!(run.transition(ExecutionStatus::Running).is_ok());
        assert!(run.started_at.is_some());
        assert!(run.transition(ExecutionStatus::Completed).is_ok());
        assert!(run.completed_at.is_some());
        assert!(run.transition(ExecutionStatus::RolledBack).is_ok());
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut run = sample_run();
        let err = run.transition(ExecutionStatus::Completed).unwrap_err();
        assert_eq!(err.from, ExecutionStatus::Pending);
        assert_eq!(err.to, ExecutionStatus::Completed);

        run.transition(ExecutionStatus::SkippedLowConfidence).unwrap();
        // Terminal: nothing further allowed
        assert!(run.transition(ExecutionStatus::Running).is_err());
        assert!(run.transition(ExecutionStatus::RolledBack).is_err());
    }

    #[test]
    fn test_cancelled_is_rollback_eligible() {
        assert!(ExecutionStatus::Cancelled.can_transition(ExecutionStatus::RolledBack));
        assert!(ExecutionStatus::Cancelled.can_transition(ExecutionStatus::RollbackPartial));
        assert!(!ExecutionStatus::Cancelled.can_transition(ExecutionStatus::Running));
    }

    #[test]
    fn test_status_roundtrip() {
        for s in [
            ExecutionStatus::Pending,
            ExecutionStatus::Running,
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
            ExecutionStatus::PartiallyFailed,
            ExecutionStatus::SkippedLowConfidence,
            ExecutionStatus::Cancelled,
            ExecutionStatus::RolledBack,
            ExecutionStatus::RollbackPartial,
        ] {
            assert_eq!(ExecutionStatus::parse(s.as_str()), Some(s));
        }
    }

    #[test]
    fn test_aggregate_status() {
        let mut run = sample_run();
        let steps = run.steps.clone();
        let started = Utc::now();

        run.record_step(StepResult::success(
            &steps[0],
            "ok",
            HashMap::new(),
            true,
            None,
            started,
        ));
        assert_eq!(run.aggregate_status(), ExecutionStatus::Completed);

        run.record_step(StepResult::timeout(&steps[1], 60, started));
        assert_eq!(run.aggregate_status(), ExecutionStatus::PartiallyFailed);
        assert_eq!(run.step_results.len(), 2);
    }

    #[test]
    fn test_all_failed_aggregates_to_failed() {
        let mut run = sample_run();
        let steps = run.steps.clone();
        let started = Utc::now();
        run.record_step(StepResult::failure(&steps[0], "boom", started));
        run.record_step(StepResult::failure(&steps[1], "boom", started));
        assert_eq!(run.aggregate_status(), ExecutionStatus::Failed);
    }

    #[test]
    fn test_rollback_available_is_and_of_reversibility() {
        let mut run = sample_run();
        let steps = run.steps.clone();
        let started = Utc::now();

        run.record_step(StepResult::success(
            &steps[0],
            "ok",
            HashMap::new(),
            true,
            Some(serde_json::json!({"hosts": ["srv-01"]})),
            started,
        ));
        assert!(run.rollback_available);

        // A timed-out step never executed, so it is trivially reversible
        run.record_step(StepResult::timeout(&steps[1], 60, started));
        assert!(run.rollback_available);

        // An irreversible successful step flips the flag
        run.record_step(StepResult::success(
            &steps[1],
            "ok",
            HashMap::new(),
            false,
            None,
            started,
        ));
        assert!(!run.rollback_available);
    }

    #[test]
    fn test_response_filter() {
        let run = sample_run();
        let mut filter = ResponseFilter::default();
        assert!(filter.matches(&run));
        filter.status = Some(ExecutionStatus::Running);
        assert!(!filter.matches(&run));
        filter.status = Some(ExecutionStatus::Pending);
        filter.asset = Some("srv-01".to_string());
        assert!(filter.matches(&run));
    }
}
