//! Storage error type shared by the entity stores.

use crate::insight::InsightTransitionError;
use crate::playbook::ValidationError;
use crate::response::TransitionError;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// The write conflicts with an existing record.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The record was rejected at write time.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An illegal run status transition was requested.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// An illegal insight workflow transition was requested.
    #[error(transparent)]
    InsightTransition(#[from] InsightTransitionError),
}

impl StoreError {
    /// Shorthand for a missing record.
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        StoreError::NotFound { entity, id }
    }
}
