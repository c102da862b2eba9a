//! Entity storage: async trait per entity plus in-memory
//! implementations.
//!
//! The in-memory stores are the production default for single-node
//! deployments and double as test fixtures. Every store takes a
//! [`crate::query::ListQuery`] on its list operation.

mod error;
mod event_store;
mod insight_store;
mod knowledge_store;
mod playbook_store;
mod response_store;

pub use error::StoreError;
pub use event_store::{EventStore, InMemoryEventStore};
pub use insight_store::{InMemoryInsightStore, InsightStore};
pub use knowledge_store::{InMemoryKnowledgeStore, KnowledgeStore};
pub use playbook_store::{InMemoryPlaybookStore, PlaybookStore};
pub use response_store::{InMemoryResponseStore, ResponseStore};
