//! Learning insights derived from run outcomes and analyst behavior.
//!
//! Insights are candidate process improvements. They are created by
//! the generator, move through a human approval workflow, and once
//! implemented can be promoted into organizational knowledge.

use crate::config::EngineConfig;
use crate::playbook::ActionType;
use crate::response::AutomatedResponse;
use crate::store::{InsightStore, StoreError};
use crate::summarize::Summarizer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// What kind of observation produced an insight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InsightType {
    /// An analyst overrode a suggested step during a run.
    AnalystOverride {
        run_id: Uuid,
        step_number: u32,
        action: ActionType,
    },
    /// The same manual action was repeated across several incidents.
    RepeatedManualAction { action: ActionType, occurrences: u32 },
    /// A playbook's runs succeed unusually often or unusually rarely.
    SuccessRateAnomaly {
        playbook_id: Uuid,
        success_rate: f64,
        run_count: u32,
    },
}

/// Expected impact of acting on an insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Low,
    Medium,
    High,
}

/// Estimated effort to implement an insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effort {
    Low,
    Medium,
    High,
}

/// Insight approval workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightStatus {
    /// Awaiting human review.
    New,
    /// Approved for implementation.
    Approved,
    /// Rejected; terminal.
    Rejected,
    /// Implemented; eligible for knowledge promotion.
    Implemented,
}

impl InsightStatus {
    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightStatus::New => "new",
            InsightStatus::Approved => "approved",
            InsightStatus::Rejected => "rejected",
            InsightStatus::Implemented => "implemented",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(InsightStatus::New),
            "approved" => Some(InsightStatus::Approved),
            "rejected" => Some(InsightStatus::Rejected),
            "implemented" => Some(InsightStatus::Implemented),
            _ => None,
        }
    }

    /// The approval workflow transition table.
    pub fn can_transition(&self, to: InsightStatus) -> bool {
        use InsightStatus::*;
        matches!((self, to), (New, Approved) | (New, Rejected) | (Approved, Implemented))
    }

    /// True for terminally dispositioned insights.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InsightStatus::Rejected | InsightStatus::Implemented)
    }
}

impl std::fmt::Display for InsightStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned on workflow misuse.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid insight transition: {from} -> {to}")]
pub struct InsightTransitionError {
    pub from: InsightStatus,
    pub to: InsightStatus,
}

/// A human decision on an insight, recorded for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Who made the decision.
    pub actor: String,
    /// When it was made.
    pub decided_at: DateTime<Utc>,
}

/// A candidate process improvement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningInsight {
    /// Unique identifier.
    pub id: Uuid,
    /// Source observation, with its data.
    pub insight_type: InsightType,
    /// Short title.
    pub title: String,
    /// Advisory text from the summarization collaborator.
    pub summary: String,
    /// Confidence in the observation (0..=100).
    pub confidence_score: u8,
    /// Expected impact.
    pub impact: Impact,
    /// Estimated implementation effort.
    pub effort: Effort,
    /// Workflow status.
    pub status: InsightStatus,
    /// Approval or rejection decision, once made.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    /// Implementation record, once implemented.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implemented: Option<Decision>,
    /// When this insight was created.
    pub created_at: DateTime<Utc>,
    /// When this insight was last updated.
    pub updated_at: DateTime<Utc>,
}

impl LearningInsight {
    /// Creates a new insight in `New`.
    pub fn new(
        insight_type: InsightType,
        title: impl Into<String>,
        summary: impl Into<String>,
        confidence_score: u8,
        impact: Impact,
        effort: Effort,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            insight_type,
            title: title.into(),
            summary: summary.into(),
            confidence_score,
            impact,
            effort,
            status: InsightStatus::New,
            decision: None,
            implemented: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn transition(&mut self, to: InsightStatus) -> Result<(), InsightTransitionError> {
        if !self.status.can_transition(to) {
            return Err(InsightTransitionError {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Approves the insight, recording the deciding analyst.
    pub fn approve(&mut self, actor: &str) -> Result<(), InsightTransitionError> {
        self.transition(InsightStatus::Approved)?;
        self.decision = Some(Decision {
            actor: actor.to_string(),
            decided_at: Utc::now(),
        });
        Ok(())
    }

    /// Rejects the insight, recording the deciding analyst. Terminal.
    pub fn reject(&mut self, actor: &str) -> Result<(), InsightTransitionError> {
        self.transition(InsightStatus::Rejected)?;
        self.decision = Some(Decision {
            actor: actor.to_string(),
            decided_at: Utc::now(),
        });
        Ok(())
    }

    /// Marks an approved insight implemented.
    pub fn implement(&mut self, actor: &str) -> Result<(), InsightTransitionError> {
        self.transition(InsightStatus::Implemented)?;
        self.implemented = Some(Decision {
            actor: actor.to_string(),
            decided_at: Utc::now(),
        });
        Ok(())
    }
}

/// Filter criteria for listing insights.
#[derive(Debug, Clone, Default)]
pub struct InsightFilter {
    /// Filter by workflow status.
    pub status: Option<InsightStatus>,
}

impl InsightFilter {
    /// Returns true if the insight passes the filter.
    pub fn matches(&self, insight: &LearningInsight) -> bool {
        match self.status {
            Some(status) => insight.status == status,
            None => true,
        }
    }
}

/// Record of an analyst overriding a suggested step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalystOverride {
    /// Unique identifier.
    pub id: Uuid,
    /// The run whose step was overridden.
    pub run_id: Uuid,
    /// Which step was overridden.
    pub step_number: u32,
    /// The suggested action.
    pub action: ActionType,
    /// Who overrode it.
    pub analyst: String,
    /// Why, in the analyst's words.
    pub reason: String,
    /// When the override happened.
    pub created_at: DateTime<Utc>,
}

impl AnalystOverride {
    /// Records a new override.
    pub fn new(
        run_id: Uuid,
        step_number: u32,
        action: ActionType,
        analyst: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            step_number,
            action,
            analyst: analyst.into(),
            reason: reason.into(),
            created_at: Utc::now(),
        }
    }
}

/// Derives candidate insights from run outcomes and analyst behavior
/// and persists them for review.
pub struct InsightGenerator {
    store: Arc<dyn InsightStore>,
    summarizer: Arc<dyn Summarizer>,
    config: EngineConfig,
}

impl InsightGenerator {
    /// Creates a generator over the given store and summarizer.
    pub fn new(
        store: Arc<dyn InsightStore>,
        summarizer: Arc<dyn Summarizer>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            summarizer,
            config,
        }
    }

    /// Proposes an insight from a settled run when its success rate
    /// is anomalous against the configured thresholds. Returns `None`
    /// for unremarkable runs.
    #[instrument(skip(self, run), fields(run_id = %run.id))]
    pub async fn propose_from_run(
        &self,
        run: &AutomatedResponse,
    ) -> Result<Option<LearningInsight>, StoreError> {
        let Some(rate) = run.success_rate() else {
            return Ok(None);
        };
        if rate > self.config.low_success_rate && rate < self.config.high_success_rate {
            debug!(rate, "run success rate unremarkable, no insight");
            return Ok(None);
        }

        let direction = if rate <= self.config.low_success_rate {
            "unusually low"
        } else {
            "unusually high"
        };
        let prompt = format!(
            "Playbook '{}' finished a run with {} success rate {:.0}% across {} steps. \
             Review whether its steps or confidence threshold need adjustment.",
            run.playbook_name,
            direction,
            rate * 100.0,
            run.step_results.len()
        );
        let summary = self.summarize(&prompt).await;

        let insight = LearningInsight::new(
            InsightType::SuccessRateAnomaly {
                playbook_id: run.playbook_id,
                success_rate: rate,
                run_count: 1,
            },
            format!("Success rate anomaly in '{}'", run.playbook_name),
            summary,
            70,
            Impact::Medium,
            Effort::Medium,
        );
        info!(insight_id = %insight.id, "proposed success-rate insight");
        self.store.create(insight).await.map(Some)
    }

    /// Proposes an insight from an analyst override.
    #[instrument(skip(self, record), fields(run_id = %record.run_id))]
    pub async fn propose_from_override(
        &self,
        record: &AnalystOverride,
    ) -> Result<LearningInsight, StoreError> {
        let prompt = format!(
            "Analyst {} overrode step {} ({}) because: {}. Consider refining the playbook step.",
            record.analyst,
            record.step_number,
            record.action.as_str(),
            record.reason
        );
        let summary = self.summarize(&prompt).await;

        let insight = LearningInsight::new(
            InsightType::AnalystOverride {
                run_id: record.run_id,
                step_number: record.step_number,
                action: record.action,
            },
            format!("Analyst override of {}", record.action.as_str()),
            summary,
            85,
            Impact::High,
            Effort::Low,
        );
        info!(insight_id = %insight.id, "proposed override insight");
        self.store.create(insight).await
    }

    /// Proposes an automation insight when the same manual action was
    /// repeated across at least the configured number of incidents.
    #[instrument(skip(self))]
    pub async fn propose_from_repeated_actions(
        &self,
        action: ActionType,
        occurrences: u32,
    ) -> Result<Option<LearningInsight>, StoreError> {
        if occurrences < self.config.min_repeat_occurrences {
            return Ok(None);
        }
        let prompt = format!(
            "Action '{}' was performed manually across {} incidents. \
             Candidate for a dedicated playbook step.",
            action.as_str(),
            occurrences
        );
        let summary = self.summarize(&prompt).await;

        let insight = LearningInsight::new(
            InsightType::RepeatedManualAction {
                action,
                occurrences,
            },
            format!("Repeated manual {}", action.as_str()),
            summary,
            80,
            Impact::Medium,
            Effort::Low,
        );
        info!(insight_id = %insight.id, "proposed repetition insight");
        self.store.create(insight).await.map(Some)
    }

    // Summarizer failures degrade to the raw prompt; advisory text is
    // never load-bearing.
    async fn summarize(&self, prompt: &str) -> String {
        match self.summarizer.summarize(prompt).await {
            Ok(text) => text,
            Err(_) => prompt.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{SecurityEvent, Severity};
    use crate::playbook::{Playbook, PlaybookStep};
    use crate::response::StepResult;
    use crate::store::InMemoryInsightStore;
    use crate::summarize::TemplateSummarizer;
    use std::collections::HashMap;

    fn insight() -> LearningInsight {
        LearningInsight::new(
            InsightType::RepeatedManualAction {
                action: ActionType::BlockIp,
                occurrences: 4,
            },
            "Repeated manual block_ip",
            "Automate it",
            80,
            Impact::Medium,
            Effort::Low,
        )
    }

    fn generator() -> InsightGenerator {
        InsightGenerator::new(
            Arc::new(InMemoryInsightStore::new()),
            Arc::new(TemplateSummarizer::new()),
            EngineConfig::default(),
        )
    }

    fn run_with_outcomes(successes: usize, failures: usize) -> AutomatedResponse {
        let event = SecurityEvent::new("malware_detected", Severity::High).with_asset("ws-01");
        let mut playbook = Playbook::new("Test", "test")
            .with_trigger("malware_detected")
            .with_severity(Severity::High);
        for i in 0..(successes + failures) {
            playbook = playbook.with_step(PlaybookStep::new(i as u32 + 1, ActionType::NotifyTeam));
        }
        let mut run = AutomatedResponse::new(&event, &playbook, 95);
        let steps = run.steps.clone();
        let started = Utc::now();
        for (i, step) in steps.iter().enumerate() {
            if i < successes {
                run.record_step(StepResult::success(
                    step,
                    "ok",
                    HashMap::new(),
                    true,
                    None,
                    started,
                ));
            } else {
                run.record_step(StepResult::failure(step, "boom", started));
            }
        }
        run
    }

    #[test]
    fn test_workflow_happy_path() {
        let mut i = insight();
        assert_eq!(i.status, InsightStatus::New);
        i.approve("alice").unwrap();
        assert_eq!(i.status, InsightStatus::Approved);
        assert_eq!(i.decision.as_ref().unwrap().actor, "alice");
        i.implement("bob").unwrap();
        assert_eq!(i.status, InsightStatus::Implemented);
        assert_eq!(i.implemented.as_ref().unwrap().actor, "bob");
    }

    #[test]
    fn test_implement_requires_approval() {
        let mut i = insight();
        let err = i.implement("bob").unwrap_err();
        assert_eq!(err.from, InsightStatus::New);
        assert_eq!(err.to, InsightStatus::Implemented);
    }

    #[test]
    fn test_rejected_is_terminal() {
        let mut i = insight();
        i.reject("alice").unwrap();
        assert!(i.status.is_terminal());
        assert!(i.approve("bob").is_err());
        assert!(i.implement("bob").is_err());
    }

    #[test]
    fn test_status_roundtrip() {
        for s in [
            InsightStatus::New,
            InsightStatus::Approved,
            InsightStatus::Rejected,
            InsightStatus::Implemented,
        ] {
            assert_eq!(InsightStatus::parse(s.as_str()), Some(s));
        }
    }

    #[tokio::test]
    async fn test_propose_from_run_low_rate() {
        let generated = generator()
            .propose_from_run(&run_with_outcomes(1, 3))
            .await
            .unwrap();
        let insight = generated.expect("low success rate should propose");
        assert!(matches!(
            insight.insight_type,
            InsightType::SuccessRateAnomaly { .. }
        ));
        assert!(insight.summary.contains("unusually low"));
    }

    #[tokio::test]
    async fn test_propose_from_run_unremarkable() {
        // 3 of 4 succeeded: between the thresholds
        let generated = generator()
            .propose_from_run(&run_with_outcomes(3, 1))
            .await
            .unwrap();
        assert!(generated.is_none());
    }

    #[tokio::test]
    async fn test_propose_from_repeated_actions_threshold() {
        let generator = generator();
        assert!(generator
            .propose_from_repeated_actions(ActionType::BlockIp, 2)
            .await
            .unwrap()
            .is_none());
        assert!(generator
            .propose_from_repeated_actions(ActionType::BlockIp, 3)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_propose_from_override() {
        let record = AnalystOverride::new(
            Uuid::new_v4(),
            2,
            ActionType::DisableUser,
            "carol",
            "user was the CEO",
        );
        let insight = generator().propose_from_override(&record).await.unwrap();
        assert!(matches!(
            insight.insight_type,
            InsightType::AnalystOverride { step_number: 2, .. }
        ));
        assert!(insight.summary.contains("carol"));
    }
}
