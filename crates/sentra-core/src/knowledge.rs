//! Organizational knowledge base.
//!
//! Knowledge entries capture what the team learned: promoted
//! insights and manually authored notes. Entries are never deleted;
//! superseded ones carry the `deprecated` tag.

use crate::insight::{InsightStatus, InsightType, LearningInsight};
use crate::query::ListQuery;
use crate::store::{KnowledgeStore, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

/// Tag carried by superseded entries.
pub const DEPRECATED_TAG: &str = "deprecated";

/// Category of a knowledge entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeType {
    ProcessImprovement,
    PlaybookPattern,
    DetectionNote,
    ResponseRunbook,
}

impl KnowledgeType {
    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            KnowledgeType::ProcessImprovement => "process_improvement",
            KnowledgeType::PlaybookPattern => "playbook_pattern",
            KnowledgeType::DetectionNote => "detection_note",
            KnowledgeType::ResponseRunbook => "response_runbook",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "process_improvement" => Some(KnowledgeType::ProcessImprovement),
            "playbook_pattern" => Some(KnowledgeType::PlaybookPattern),
            "detection_note" => Some(KnowledgeType::DetectionNote),
            "response_runbook" => Some(KnowledgeType::ResponseRunbook),
            _ => None,
        }
    }
}

/// Where a knowledge entry came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KnowledgeSource {
    /// Promoted from an implemented learning insight.
    Insight { insight_id: Uuid },
    /// Authored directly by a person.
    Manual { author: String },
}

/// A durable entry in the knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationalKnowledge {
    /// Unique identifier.
    pub id: Uuid,
    /// Category.
    pub knowledge_type: KnowledgeType,
    /// Short title.
    pub title: String,
    /// Body text.
    pub content: String,
    /// Search tags, sorted.
    pub tags: BTreeSet<String>,
    /// Provenance.
    pub source: KnowledgeSource,
    /// Confidence in the entry (0..=100).
    pub confidence_level: u8,
    /// How many times the entry was consulted. Monotonic.
    pub usage_count: u64,
    /// Analyst-assigned effectiveness, 0.0..=5.0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effectiveness_rating: Option<f32>,
    /// When the entry was created.
    pub created_at: DateTime<Utc>,
    /// When metadata last changed. Usage does not bump this.
    pub updated_at: DateTime<Utc>,
}

impl OrganizationalKnowledge {
    /// Creates a new entry.
    pub fn new(
        knowledge_type: KnowledgeType,
        title: impl Into<String>,
        content: impl Into<String>,
        source: KnowledgeSource,
        confidence_level: u8,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            knowledge_type,
            title: title.into(),
            content: content.into(),
            tags: BTreeSet::new(),
            source,
            confidence_level,
            usage_count: 0,
            effectiveness_rating: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Adds a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// True for superseded entries.
    pub fn is_deprecated(&self) -> bool {
        self.tags.contains(DEPRECATED_TAG)
    }
}

/// Errors from curator operations.
#[derive(Error, Debug)]
pub enum CurateError {
    /// Only implemented insights may be promoted.
    #[error("insight must be implemented before promotion, was {status}")]
    NotImplemented { status: InsightStatus },

    /// Rating outside 0.0..=5.0.
    #[error("effectiveness rating {0} outside 0.0..=5.0")]
    InvalidRating(f32),

    /// Underlying storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Curates the knowledge base: promotion, usage tracking, search,
/// rating, and deprecation.
pub struct KnowledgeCurator {
    store: Arc<dyn KnowledgeStore>,
}

impl KnowledgeCurator {
    /// Creates a curator over the given store.
    pub fn new(store: Arc<dyn KnowledgeStore>) -> Self {
        Self { store }
    }

    /// Promotes an implemented insight into the knowledge base.
    /// Idempotent: promoting the same insight again returns the
    /// existing entry without creating a duplicate.
    #[instrument(skip(self, insight), fields(insight_id = %insight.id))]
    pub async fn promote(
        &self,
        insight: &LearningInsight,
    ) -> Result<OrganizationalKnowledge, CurateError> {
        if insight.status != InsightStatus::Implemented {
            return Err(CurateError::NotImplemented {
                status: insight.status,
            });
        }
        if let Some(existing) = self.store.find_by_source_insight(insight.id).await? {
            return Ok(existing);
        }

        let (knowledge_type, tag) = match &insight.insight_type {
            InsightType::AnalystOverride { action, .. } => {
                (KnowledgeType::PlaybookPattern, action.as_str())
            }
            InsightType::RepeatedManualAction { action, .. } => {
                (KnowledgeType::ProcessImprovement, action.as_str())
            }
            InsightType::SuccessRateAnomaly { .. } => {
                (KnowledgeType::DetectionNote, "success_rate")
            }
        };
        let entry = OrganizationalKnowledge::new(
            knowledge_type,
            insight.title.clone(),
            insight.summary.clone(),
            KnowledgeSource::Insight {
                insight_id: insight.id,
            },
            insight.confidence_score,
        )
        .with_tag(tag);
        let entry = self.store.insert(entry).await?;
        info!(knowledge_id = %entry.id, "promoted insight to knowledge");
        Ok(entry)
    }

    /// Adds a manually authored entry.
    pub async fn add_manual(
        &self,
        knowledge_type: KnowledgeType,
        title: impl Into<String>,
        content: impl Into<String>,
        author: impl Into<String>,
        tags: impl IntoIterator<Item = String>,
    ) -> Result<OrganizationalKnowledge, CurateError> {
        let mut entry = OrganizationalKnowledge::new(
            knowledge_type,
            title,
            content,
            KnowledgeSource::Manual {
                author: author.into(),
            },
            100,
        );
        entry.tags.extend(tags);
        Ok(self.store.insert(entry).await?)
    }

    /// Records one consultation of an entry. Returns the new count.
    pub async fn record_usage(&self, id: Uuid) -> Result<u64, CurateError> {
        Ok(self.store.record_usage(id).await?)
    }

    /// Sets an entry's effectiveness rating.
    pub async fn rate(&self, id: Uuid, rating: f32) -> Result<OrganizationalKnowledge, CurateError> {
        if !(0.0..=5.0).contains(&rating) {
            return Err(CurateError::InvalidRating(rating));
        }
        Ok(self.store.set_rating(id, rating).await?)
    }

    /// Marks an entry superseded. The entry stays in the base and
    /// keeps its history; it just drops out of search results.
    pub async fn deprecate(&self, id: Uuid) -> Result<OrganizationalKnowledge, CurateError> {
        Ok(self.store.add_tag(id, DEPRECATED_TAG).await?)
    }

    /// Searches entries by tags and free text, ranked by match score
    /// then usage count descending. Deprecated entries are excluded.
    /// With no criteria, returns everything by usage descending.
    pub async fn search(
        &self,
        tags: &[String],
        free_text: &str,
        limit: usize,
    ) -> Result<Vec<OrganizationalKnowledge>, CurateError> {
        let all = self.store.list(&ListQuery::unsorted()).await?;
        let terms: Vec<String> = free_text
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();

        let mut scored: Vec<(u32, OrganizationalKnowledge)> = all
            .into_iter()
            .filter(|e| !e.is_deprecated())
            .filter_map(|e| {
                let score = Self::score(&e, tags, &terms);
                if tags.is_empty() && terms.is_empty() {
                    Some((0, e))
                } else if score > 0 {
                    Some((score, e))
                } else {
                    None
                }
            })
            .collect();
        scored.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then(b.1.usage_count.cmp(&a.1.usage_count))
                .then(a.1.created_at.cmp(&b.1.created_at))
        });
        Ok(scored.into_iter().take(limit).map(|(_, e)| e).collect())
    }

    // Tag hits weigh double a free-text hit.
    fn score(entry: &OrganizationalKnowledge, tags: &[String], terms: &[String]) -> u32 {
        let tag_hits = tags.iter().filter(|t| entry.tags.contains(*t)).count() as u32;
        let haystack = format!("{} {}", entry.title, entry.content).to_lowercase();
        let text_hits = terms.iter().filter(|t| haystack.contains(*t)).count() as u32;
        tag_hits * 2 + text_hits
    }
}
