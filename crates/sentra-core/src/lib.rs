//! # sentra-core
//!
//! Core engine and data models for Sentra.
//!
//! This crate provides the trigger matcher, playbook model, the
//! automated response execution engine with per-asset exclusivity
//! and rollback, and the learning loop (insights and organizational
//! knowledge) for the Sentra response platform.

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod event;
pub mod insight;
pub mod knowledge;
pub mod locks;
pub mod matcher;
pub mod playbook;
pub mod query;
pub mod response;
pub mod rollback;
pub mod store;
pub mod summarize;

pub use config::{ConfigError, EngineConfig};
pub use dispatch::{ActionDispatch, DispatchError, DispatchOutput, StepInvocation};
pub use engine::{EngineError, ResponseEngine};
pub use event::{EventFilter, SecurityEvent, Severity};
pub use insight::{
    AnalystOverride, Effort, Impact, InsightFilter, InsightGenerator, InsightStatus,
    InsightTransitionError, InsightType, LearningInsight,
};
pub use knowledge::{
    CurateError, KnowledgeCurator, KnowledgeSource, KnowledgeType, OrganizationalKnowledge,
};
pub use locks::{AssetLockRegistry, LockTimeout};
pub use matcher::match_event;
pub use playbook::{ActionType, Playbook, PlaybookStep, ValidationError};
pub use query::{ListQuery, SortKey};
pub use response::{
    AutomatedResponse, ExecutionStatus, ResponseFilter, StepOutcome, StepResult, TransitionError,
};
pub use rollback::{ReversalResult, RollbackError, RollbackManager, RollbackReport};
pub use store::{
    EventStore, InMemoryEventStore, InMemoryInsightStore, InMemoryKnowledgeStore,
    InMemoryPlaybookStore, InMemoryResponseStore, InsightStore, KnowledgeStore, PlaybookStore,
    ResponseStore, StoreError,
};
pub use summarize::{SummarizeError, Summarizer, TemplateSummarizer};
