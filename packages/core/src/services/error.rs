//! Service Layer Error Types
//!
//! Errors returned by `HierarchyService`. Each variant tells the caller what
//! to do next: fix the input, re-fetch and retry, or re-fetch and verify.

use crate::db::DatabaseError;
use crate::models::ValidationError;
use thiserror::Error;

/// Ordering operation errors
#[derive(Error, Debug)]
pub enum OrderingError {
    /// Malformed input, rejected before any store access
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// One or more ids are unknown, of another kind, or outside the scope
    #[error("Nodes not found: {}", ids.join(", "))]
    NotFound { ids: Vec<String> },

    /// Parent change would make a node its own ancestor
    #[error("Circular reference detected: {context}")]
    CircularReference { context: String },

    /// Two nodes in one batch were given the same rank
    #[error("Duplicate rank {rank} submitted for nodes: {}", ids.join(", "))]
    DuplicateRank { rank: i64, ids: Vec<String> },

    /// A concurrent writer changed the data this operation was computed from
    #[error("Concurrent modification: {context}")]
    Conflict { context: String },

    /// Structural rule violated, e.g. deleting a node that still has children
    #[error("Hierarchy constraint violated: {0}")]
    HierarchyViolation(String),

    /// Opaque store failure
    #[error("Storage operation failed: {0}")]
    Storage(DatabaseError),

    /// The write did not answer in time; it may or may not have committed
    #[error("Outcome unknown, re-fetch and verify: {context}")]
    OutcomeUnknown { context: String },
}

impl OrderingError {
    pub fn validation(error: ValidationError) -> Self {
        Self::Validation(error)
    }

    pub fn not_found(ids: Vec<String>) -> Self {
        Self::NotFound { ids }
    }

    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            ids: vec![id.into()],
        }
    }

    pub fn circular_reference(context: impl Into<String>) -> Self {
        Self::CircularReference {
            context: context.into(),
        }
    }

    pub fn duplicate_rank(rank: i64, ids: Vec<String>) -> Self {
        Self::DuplicateRank { rank, ids }
    }

    pub fn conflict(context: impl Into<String>) -> Self {
        Self::Conflict {
            context: context.into(),
        }
    }

    pub fn hierarchy_violation(msg: impl Into<String>) -> Self {
        Self::HierarchyViolation(msg.into())
    }

    pub fn outcome_unknown(context: impl Into<String>) -> Self {
        Self::OutcomeUnknown {
            context: context.into(),
        }
    }

    /// True when re-fetching and resubmitting may succeed
    ///
    /// The core itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DuplicateRank { .. } | Self::Conflict { .. })
    }
}

impl From<DatabaseError> for OrderingError {
    fn from(error: DatabaseError) -> Self {
        match error {
            e if e.is_conflict() => Self::conflict(e.to_string()),
            // A row validated moments ago vanished: another writer deleted it
            DatabaseError::NodeNotFound { id } => {
                Self::conflict(format!("node {} was removed concurrently", id))
            }
            // Children appeared after the pre-delete check
            DatabaseError::HasChildren { id, children } => Self::hierarchy_violation(format!(
                "node {} still has {} children; reassign or remove them first",
                id, children
            )),
            other => Self::Storage(other),
        }
    }
}
