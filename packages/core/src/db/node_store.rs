//! NodeStore Trait - Store Abstraction Layer
//!
//! This module defines the `NodeStore` trait that abstracts persistence of
//! ordered nodes. Business rules (rank allocation, batch validation, cycle
//! checks) live in `HierarchyService`; the store only guarantees that a batch
//! of writes is applied atomically.
//!
//! # Design Decisions
//!
//! 1. **Async-First**: All methods are async so embedded and networked
//!    backends share one interface
//! 2. **Ownership Semantics**: Methods take ownership of values to avoid
//!    unnecessary cloning
//! 3. **Atomic batches**: `update_many` applies every write or none of them
//! 4. **Optimistic concurrency**: each write names the version it was computed
//!    from; a mismatch aborts the whole batch with `VersionConflict`
//!
//! # Examples
//!
//! ```rust,no_run
//! use planboard_core::db::{MemoryStore, NodeStore};
//! use planboard_core::models::{NodeKind, NodeWrite, OrderedNode};
//!
//! # async fn example() -> Result<(), planboard_core::db::DatabaseError> {
//! let store = MemoryStore::new();
//! let node = store
//!     .insert(OrderedNode::new(NodeKind::Feature, "project-1", "Login", 100))
//!     .await?;
//!
//! store
//!     .update_many(vec![NodeWrite::new(node.id.clone(), node.version).rank(200)])
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::db::DatabaseError;
use crate::models::{NodeKind, NodeWrite, OrderedNode};
use async_trait::async_trait;

/// Persistence operations for ranked, self-referencing nodes
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the service is shared across
/// concurrent requests.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Get node by ID
    ///
    /// - `Ok(Some(node))` if node exists
    /// - `Ok(None)` if node doesn't exist (not an error)
    async fn find_by_id(&self, id: &str) -> Result<Option<OrderedNode>, DatabaseError>;

    /// All nodes of `kind` in `scope_id`, in no particular order
    async fn find_many_by_scope(
        &self,
        kind: NodeKind,
        scope_id: &str,
    ) -> Result<Vec<OrderedNode>, DatabaseError>;

    /// Direct children of `parent_id`, in no particular order
    async fn find_children(&self, parent_id: &str) -> Result<Vec<OrderedNode>, DatabaseError>;

    /// Insert a new node
    ///
    /// # Errors
    ///
    /// - `DuplicateId` if the id is taken
    /// - `NodeNotFound` if `parent_id` names a missing row
    async fn insert(&self, node: OrderedNode) -> Result<OrderedNode, DatabaseError>;

    /// Apply all writes in one transaction and return the rows as written
    ///
    /// `check_only` writes are version-checked like the others but neither
    /// change their row nor appear in the result.
    ///
    /// # Errors
    ///
    /// Nothing is written if any of these occur:
    /// - `NodeNotFound` for a missing row
    /// - `VersionConflict` if a row's version differs from `expected_version`
    async fn update_many(&self, writes: Vec<NodeWrite>) -> Result<Vec<OrderedNode>, DatabaseError>;

    /// Delete a node. Returns false if it did not exist
    ///
    /// # Errors
    ///
    /// - `HasChildren` if another row still names it as parent
    async fn delete(&self, id: &str) -> Result<bool, DatabaseError>;
}
