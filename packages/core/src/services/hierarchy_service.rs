//! Hierarchy Service - Ordered Hierarchy Management
//!
//! One `HierarchyService` manages the ranked forest of a single `NodeKind`.
//! It owns every rule about ranks and parents; the store underneath only
//! applies version-checked batches atomically.
//!
//! # Operations
//!
//! - **Create**: append after the last sibling (or at an explicit rank)
//! - **Reorder**: validate a batch of `(id, rank)` pairs as a set, then commit
//!   all of them in one store transaction
//! - **Move up/down**: one-step moves planned by the move adapter and
//!   submitted as a reorder
//! - **Reparent**: cycle-guarded parent change with an appended rank among
//!   the new siblings
//! - **Normalize**: renumber a scope to `step, 2*step, ...`
//! - **Delete**: only childless nodes
//!
//! Every committed mutation is announced as an `AuditEvent` on a broadcast
//! channel. A failed send never undoes a commit.
//!
//! # Concurrency
//!
//! The service holds no ordering state. Each write carries the version of the
//! row it was computed from, so a batch planned from stale reads fails with a
//! retryable `OrderingError::Conflict` instead of overwriting newer data.
//! Rows that shaped a decision without being changed are version-checked in
//! the same batch: the siblings a move was planned from, and the ancestors a
//! reparent's cycle check walked. The service never retries on its own.

use crate::config::{ConfigError, HierarchyConfig, UniquenessScope};
use crate::db::{AuditEvent, DatabaseError, NodeStore, RankChange};
use crate::models::{
    BatchReorderRequest, BatchReorderResponse, CreateNodeParams, NodeKind, NodeWrite, OrderedNode,
    RankPatch, RankPatchRequest, RankPatchResponse, RankUpdate, ReorderOutcome, TreeNode,
    ValidationError,
};
use crate::ordering::{
    canonical_sort, plan_move, walk_ancestors_in_store, MoveDirection, RankAllocator,
};
use crate::services::OrderingError;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Ranked hierarchy operations for one entity kind
///
/// # Examples
///
/// ```rust
/// use planboard_core::db::MemoryStore;
/// use planboard_core::models::{CreateNodeParams, NodeKind};
/// use planboard_core::services::HierarchyService;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let service = HierarchyService::new(Arc::new(MemoryStore::new()), NodeKind::Feature);
///
/// let login = service.create_node(CreateNodeParams::new("project-1", "Login")).await?;
/// let signup = service.create_node(CreateNodeParams::new("project-1", "Signup")).await?;
/// assert_eq!((login.rank, signup.rank), (100, 200));
///
/// let outcome = service.move_up(&signup.id).await?;
/// assert_eq!(outcome.nodes[0].id, signup.id);
/// # Ok(())
/// # }
/// ```
pub struct HierarchyService<S: NodeStore + ?Sized> {
    store: Arc<S>,

    kind: NodeKind,

    config: HierarchyConfig,

    allocator: RankAllocator,

    /// Broadcast channel for audit events, shared by all `with_actor` clones
    audit_tx: broadcast::Sender<AuditEvent>,

    /// User recorded on emitted audit events
    actor_id: Option<String>,
}

// Manual Clone: S itself does not need to be Clone, only the Arc
impl<S: NodeStore + ?Sized> Clone for HierarchyService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            kind: self.kind,
            config: self.config.clone(),
            allocator: self.allocator,
            audit_tx: self.audit_tx.clone(),
            actor_id: self.actor_id.clone(),
        }
    }
}

impl<S: NodeStore + ?Sized> HierarchyService<S> {
    /// Create a service with the preset configuration for `kind`
    pub fn new(store: Arc<S>, kind: NodeKind) -> Self {
        Self::build(store, kind, HierarchyConfig::for_kind(kind))
    }

    /// Create a service with an explicit configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the configuration fails validation.
    pub fn with_config(
        store: Arc<S>,
        kind: NodeKind,
        config: HierarchyConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(store, kind, config))
    }

    fn build(store: Arc<S>, kind: NodeKind, config: HierarchyConfig) -> Self {
        let (audit_tx, _) = broadcast::channel(config.event_channel_capacity);
        Self {
            store,
            kind,
            allocator: RankAllocator::with_step(config.rank_step),
            config,
            audit_tx,
            actor_id: None,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn config(&self) -> &HierarchyConfig {
        &self.config
    }

    /// Clone of this service whose audit events name `actor_id`
    ///
    /// The clone shares the store and the audit channel.
    ///
    /// ```rust
    /// # use planboard_core::db::MemoryStore;
    /// # use planboard_core::models::NodeKind;
    /// # use planboard_core::services::HierarchyService;
    /// # use std::sync::Arc;
    /// let service = HierarchyService::new(Arc::new(MemoryStore::new()), NodeKind::File);
    /// let scoped = service.with_actor("user-42");
    /// assert_eq!(scoped.actor_id(), Some("user-42"));
    /// ```
    pub fn with_actor(&self, actor_id: impl Into<String>) -> Self {
        let mut cloned = self.clone();
        cloned.actor_id = Some(actor_id.into());
        cloned
    }

    pub fn actor_id(&self) -> Option<&str> {
        self.actor_id.as_deref()
    }

    /// Subscribe to audit events emitted after each committed mutation
    pub fn subscribe_to_audit_events(&self) -> broadcast::Receiver<AuditEvent> {
        self.audit_tx.subscribe()
    }

    /// Ignores send errors: having no subscriber is normal
    fn emit_event(&self, event: AuditEvent) {
        let _ = self.audit_tx.send(event);
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Get a node of this service's kind
    ///
    /// # Errors
    ///
    /// `NotFound` if the id is unknown or belongs to another kind.
    pub async fn get_node(&self, id: &str) -> Result<OrderedNode, OrderingError> {
        self.store
            .find_by_id(id)
            .await
            .map_err(|e| self.store_error("find_by_id", e))?
            .filter(|node| node.kind == self.kind)
            .ok_or_else(|| OrderingError::node_not_found(id))
    }

    /// All nodes of the scope in canonical order (rank, name, id)
    pub async fn list_scope(&self, scope_id: &str) -> Result<Vec<OrderedNode>, OrderingError> {
        let mut nodes = self.load_scope(scope_id).await?;
        canonical_sort(&mut nodes);
        Ok(nodes)
    }

    /// Direct children of `parent_id` in canonical order
    pub async fn list_children(&self, parent_id: &str) -> Result<Vec<OrderedNode>, OrderingError> {
        let mut children: Vec<OrderedNode> = self
            .store
            .find_children(parent_id)
            .await
            .map_err(|e| self.store_error("find_children", e))?
            .into_iter()
            .filter(|node| node.kind == self.kind)
            .collect();
        canonical_sort(&mut children);
        Ok(children)
    }

    /// The scope as a forest with derived `children`, every level canonically ordered
    ///
    /// A node whose parent is outside the scope is listed as a root. A stored
    /// parent loop is listed from its first node in canonical order, so no
    /// node is dropped.
    pub async fn get_tree(&self, scope_id: &str) -> Result<Vec<TreeNode>, OrderingError> {
        let nodes = self.list_scope(scope_id).await?;
        let ids: HashSet<String> = nodes.iter().map(|n| n.id.clone()).collect();

        let mut children: HashMap<String, Vec<OrderedNode>> = HashMap::new();
        let mut roots = Vec::new();
        for node in nodes {
            match node.parent_id.clone() {
                Some(parent_id) if ids.contains(&parent_id) => {
                    children.entry(parent_id).or_default().push(node)
                }
                _ => roots.push(node),
            }
        }

        let mut forest: Vec<TreeNode> = roots
            .into_iter()
            .map(|root| build_tree(root, &mut children))
            .collect();

        // Whatever is left hangs off a parent loop and is unreachable from a
        // root. Each loop is cut at its first node in canonical order.
        if !children.is_empty() {
            let mut stranded: Vec<OrderedNode> = children.values().flatten().cloned().collect();
            canonical_sort(&mut stranded);
            let parents: HashMap<&str, &str> = stranded
                .iter()
                .filter_map(|n| Some((n.id.as_str(), n.parent_id.as_deref()?)))
                .collect();
            tracing::warn!(
                "{} scope {} has {} nodes hanging off a parent loop",
                self.kind,
                scope_id,
                stranded.len()
            );

            let mut cut = Vec::new();
            for node in &stranded {
                if in_parent_loop(&node.id, &parents) {
                    cut.push(node.clone());
                }
            }
            for node in cut {
                if placed(&forest, &node.id) {
                    continue;
                }
                if let Some(siblings) = node
                    .parent_id
                    .as_deref()
                    .and_then(|parent_id| children.get_mut(parent_id))
                {
                    siblings.retain(|n| n.id != node.id);
                }
                forest.push(build_tree(node, &mut children));
            }
        }

        Ok(forest)
    }

    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Create a node, appending it after its last sibling unless a rank is given
    ///
    /// # Errors
    ///
    /// - `Validation` for blank fields or a rank rejected by the positive-rank policy
    /// - `NotFound` if the parent does not exist
    /// - `HierarchyViolation` if the parent belongs to another scope
    pub async fn create_node(&self, params: CreateNodeParams) -> Result<OrderedNode, OrderingError> {
        if params.scope_id.trim().is_empty() {
            return Err(ValidationError::MissingField("scope_id".to_string()).into());
        }
        if params.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name".to_string()).into());
        }
        if let Some(rank) = params.rank {
            self.check_positive("order", rank)?;
        }
        if let Some(dev_rank) = params.dev_rank {
            self.check_positive("devorder", dev_rank)?;
        }

        if let Some(parent_id) = params.parent_id.as_deref() {
            let parent = self.get_node(parent_id).await?;
            if parent.scope_id != params.scope_id {
                return Err(OrderingError::hierarchy_violation(format!(
                    "parent {} belongs to scope {}, not {}",
                    parent_id, parent.scope_id, params.scope_id
                )));
            }
        }

        let rank = match params.rank {
            Some(rank) => rank,
            None => {
                let siblings = self
                    .load_siblings(&params.scope_id, params.parent_id.as_deref())
                    .await?;
                let ranks: Vec<i64> = siblings.iter().map(|n| n.rank).collect();
                self.allocator.allocate_append_rank(&ranks)
            }
        };

        let mut node = match params.id {
            Some(id) => {
                OrderedNode::new_with_id(id, self.kind, params.scope_id, params.name, rank)
            }
            None => OrderedNode::new(self.kind, params.scope_id, params.name, rank),
        };
        node.parent_id = params.parent_id;
        node.dev_rank = params.dev_rank;
        node.validate()?;

        let created = self.bounded("insert", self.store.insert(node)).await?;

        tracing::info!(
            "Created {} {} in scope {} at order {}",
            self.kind,
            created.id,
            created.scope_id,
            created.rank
        );
        self.emit_event(AuditEvent::NodeCreated {
            node: created.clone(),
            actor_id: self.actor_id.clone(),
        });

        Ok(created)
    }

    // ------------------------------------------------------------------
    // Reorder transaction
    // ------------------------------------------------------------------

    /// Apply a batch of rank assignments atomically
    ///
    /// The batch is validated as a whole before anything is written: every id
    /// must exist in `scope_id`, and the submitted ranks must be mutually
    /// distinct (within each sibling group under `UniquenessScope::Siblings`).
    /// Pairs whose rank is already current are not written, so resubmitting a
    /// committed batch changes nothing.
    ///
    /// # Returns
    ///
    /// The refreshed scope in canonical order and the number of rows written.
    ///
    /// # Errors
    ///
    /// - `Validation` for an empty, oversized or malformed batch
    /// - `NotFound` listing every unknown id; nothing is written
    /// - `DuplicateRank` if two nodes were given the same rank; nothing is written
    /// - `Conflict` if another writer changed a row after it was read
    /// - `OutcomeUnknown` if the write exceeded `store_timeout_ms`
    pub async fn reorder(
        &self,
        scope_id: &str,
        updates: Vec<RankUpdate>,
    ) -> Result<ReorderOutcome, OrderingError> {
        self.validate_batch(scope_id, &updates)?;
        let current = self.load_scope(scope_id).await?;
        self.reorder_from(scope_id, updates, &current, &[]).await
    }

    /// Reorder against a scope snapshot the caller already read
    ///
    /// Writes carry the versions from `current`. Every node in `guarded` that
    /// is not rewritten is version-checked in the same batch.
    async fn reorder_from(
        &self,
        scope_id: &str,
        updates: Vec<RankUpdate>,
        current: &[OrderedNode],
        guarded: &[OrderedNode],
    ) -> Result<ReorderOutcome, OrderingError> {
        let by_id: HashMap<&str, &OrderedNode> =
            current.iter().map(|n| (n.id.as_str(), n)).collect();

        let missing: Vec<String> = updates
            .iter()
            .filter(|u| !by_id.contains_key(u.id.as_str()))
            .map(|u| u.id.clone())
            .collect();
        if !missing.is_empty() {
            tracing::warn!(
                "Rejected reorder of {} scope {}: unknown ids {:?}",
                self.kind,
                scope_id,
                missing
            );
            return Err(OrderingError::not_found(missing));
        }

        self.check_distinct_ranks(&updates, &by_id)?;

        let mut targets: HashMap<String, i64> =
            updates.iter().map(|u| (u.id.clone(), u.rank)).collect();

        if self.config.normalize_after_reorder {
            let mut projected = current.to_vec();
            for node in &mut projected {
                if let Some(rank) = targets.get(&node.id) {
                    node.rank = *rank;
                }
            }
            targets = self.renumbered(&projected);
        }

        let updated_count = self
            .commit_ranks(scope_id, &by_id, targets, guarded)
            .await?;

        Ok(ReorderOutcome {
            nodes: self.list_scope(scope_id).await?,
            updated_count,
        })
    }

    /// Validate and apply a batch reorder request from the boundary
    pub async fn apply_batch_request(
        &self,
        request: BatchReorderRequest,
    ) -> Result<BatchReorderResponse, OrderingError> {
        request.validate()?;
        let outcome = self.reorder(&request.project_id, request.updates).await?;
        Ok(BatchReorderResponse {
            success: true,
            data: outcome.nodes,
            updated_count: outcome.updated_count,
        })
    }

    /// Renumber the scope as `step, 2*step, ...` in canonical order
    ///
    /// Under `UniquenessScope::Siblings` each sibling group is numbered
    /// separately. Nodes already at their target rank are not written.
    pub async fn normalize_scope(&self, scope_id: &str) -> Result<ReorderOutcome, OrderingError> {
        if scope_id.trim().is_empty() {
            return Err(ValidationError::MissingField("scope_id".to_string()).into());
        }

        let current = self.load_scope(scope_id).await?;
        let by_id: HashMap<&str, &OrderedNode> =
            current.iter().map(|n| (n.id.as_str(), n)).collect();
        let targets = self.renumbered(&current);

        let updated_count = self.commit_ranks(scope_id, &by_id, targets, &[]).await?;

        Ok(ReorderOutcome {
            nodes: self.list_scope(scope_id).await?,
            updated_count,
        })
    }

    // ------------------------------------------------------------------
    // Move adapter
    // ------------------------------------------------------------------

    /// Swap `id` with its previous sibling. A no-op for the first sibling.
    pub async fn move_up(&self, id: &str) -> Result<ReorderOutcome, OrderingError> {
        self.move_node(id, MoveDirection::Up).await
    }

    /// Swap `id` with its next sibling. A no-op for the last sibling.
    pub async fn move_down(&self, id: &str) -> Result<ReorderOutcome, OrderingError> {
        self.move_node(id, MoveDirection::Down).await
    }

    async fn move_node(
        &self,
        id: &str,
        direction: MoveDirection,
    ) -> Result<ReorderOutcome, OrderingError> {
        let node = self.get_node(id).await?;

        // Plan and commit from one snapshot so a sibling changed in between
        // surfaces as a conflict
        let scope = self.load_scope(&node.scope_id).await?;
        let mut siblings: Vec<OrderedNode> = scope
            .iter()
            .filter(|n| n.parent_id == node.parent_id)
            .cloned()
            .collect();
        canonical_sort(&mut siblings);

        let updates = plan_move(&siblings, id, direction, self.allocator)
            .ok_or_else(|| OrderingError::conflict(format!("node {} left its sibling group", id)))?;

        if updates.is_empty() {
            tracing::debug!("{} {} already at boundary for {:?}", self.kind, id, direction);
            let mut nodes = scope;
            canonical_sort(&mut nodes);
            return Ok(ReorderOutcome {
                nodes,
                updated_count: 0,
            });
        }

        self.validate_batch(&node.scope_id, &updates)?;
        self.reorder_from(&node.scope_id, updates, &scope, &siblings)
            .await
    }

    // ------------------------------------------------------------------
    // Per-node rank patch
    // ------------------------------------------------------------------

    /// Set `order` and/or `devorder` of a single node
    ///
    /// A single assignment is not checked against the ranks of other nodes;
    /// ties are broken by the canonical sort.
    pub async fn set_ranks(&self, id: &str, patch: RankPatch) -> Result<OrderedNode, OrderingError> {
        if patch.is_empty() {
            return Err(ValidationError::MissingField("order or devorder".to_string()).into());
        }
        if let Some(rank) = patch.rank {
            self.check_positive("order", rank)?;
        }
        if let Some(dev_rank) = patch.dev_rank {
            self.check_positive("devorder", dev_rank)?;
        }

        let node = self.get_node(id).await?;

        let mut write = NodeWrite::new(id, node.version);
        if let Some(rank) = patch.rank {
            write = write.rank(rank);
        }
        if let Some(dev_rank) = patch.dev_rank {
            write = write.dev_rank(dev_rank);
        }

        let updated = self.write_one("set_ranks", write).await?;

        if updated.rank != node.rank {
            self.emit_event(AuditEvent::RanksChanged {
                kind: self.kind,
                scope_id: updated.scope_id.clone(),
                changes: vec![RankChange::new(&updated.id, node.rank, updated.rank)],
                actor_id: self.actor_id.clone(),
            });
        }
        if let Some(new_dev_rank) = updated.dev_rank.filter(|d| Some(*d) != node.dev_rank) {
            self.emit_event(AuditEvent::DevRankChanged {
                id: updated.id.clone(),
                old_dev_rank: node.dev_rank,
                new_dev_rank,
                actor_id: self.actor_id.clone(),
            });
        }

        tracing::info!(
            "Set ranks of {} {}: order {}, devorder {:?}",
            self.kind,
            id,
            updated.rank,
            updated.dev_rank
        );
        Ok(updated)
    }

    /// Validate and apply a rank patch request from the boundary
    pub async fn apply_rank_patch(
        &self,
        id: &str,
        request: RankPatchRequest,
    ) -> Result<RankPatchResponse, OrderingError> {
        let patch = request.validate()?;
        let file = self.set_ranks(id, patch).await?;
        Ok(RankPatchResponse {
            success: true,
            file,
        })
    }

    // ------------------------------------------------------------------
    // Reparent
    // ------------------------------------------------------------------

    /// Move a node under `new_parent_id` (or to root level with `None`)
    ///
    /// The node is appended after the last of its new siblings. Parent and
    /// rank change in one write.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the node or the new parent does not exist
    /// - `CircularReference` if the new parent is the node itself or one of its descendants
    /// - `HierarchyViolation` if the new parent belongs to another scope
    pub async fn reparent(
        &self,
        id: &str,
        new_parent_id: Option<&str>,
    ) -> Result<OrderedNode, OrderingError> {
        if matches!(new_parent_id, Some(p) if p.trim().is_empty()) {
            return Err(
                ValidationError::InvalidParent("parent id must not be blank".to_string()).into(),
            );
        }

        let node = self.get_node(id).await?;
        if node.parent_id.as_deref() == new_parent_id {
            tracing::debug!("{} {} already under {:?}", self.kind, id, new_parent_id);
            return Ok(node);
        }

        let mut ancestors: Vec<OrderedNode> = Vec::new();

        if let Some(parent_id) = new_parent_id {
            if parent_id == id {
                return Err(OrderingError::circular_reference(format!(
                    "node {} cannot be its own parent",
                    id
                )));
            }

            let parent = self.get_node(parent_id).await?;
            if parent.scope_id != node.scope_id {
                return Err(OrderingError::hierarchy_violation(format!(
                    "cannot move {} from scope {} under {} in scope {}",
                    id, node.scope_id, parent_id, parent.scope_id
                )));
            }

            let walk = walk_ancestors_in_store(self.store.as_ref(), parent_id, id)
                .await
                .map_err(|e| self.store_error("find_by_id", e))?;
            if walk.creates_cycle {
                tracing::warn!("Rejected reparent of {} under its descendant {}", id, parent_id);
                return Err(OrderingError::circular_reference(format!(
                    "cannot move node {} under its descendant {}",
                    id, parent_id
                )));
            }
            ancestors = walk.visited;
        }

        let ranks: Vec<i64> = self
            .load_siblings(&node.scope_id, new_parent_id)
            .await?
            .iter()
            .filter(|n| n.id != id)
            .map(|n| n.rank)
            .collect();
        let rank = self.allocator.allocate_append_rank(&ranks);

        // A concurrent reparent anywhere on the checked chain bumps one of
        // these versions and turns this write into a conflict
        let mut writes = vec![NodeWrite::new(id, node.version)
            .parent(new_parent_id.map(str::to_string))
            .rank(rank)];
        writes.extend(
            ancestors
                .iter()
                .map(|a| NodeWrite::version_check(&a.id, a.version)),
        );
        let updated = self
            .bounded("reparent", self.store.update_many(writes))
            .await?
            .into_iter()
            .find(|n| n.id == id)
            .ok_or_else(|| OrderingError::conflict(format!("node {} was not written", id)))?;

        tracing::info!(
            "Reparented {} {} from {:?} to {:?} at order {}",
            self.kind,
            id,
            node.parent_id,
            updated.parent_id,
            updated.rank
        );
        self.emit_event(AuditEvent::NodeReparented {
            node: updated.clone(),
            old_parent_id: node.parent_id,
            actor_id: self.actor_id.clone(),
        });

        Ok(updated)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a node that has no children
    ///
    /// # Errors
    ///
    /// - `NotFound` if the node does not exist
    /// - `HierarchyViolation` if children still reference it
    pub async fn delete_node(&self, id: &str) -> Result<(), OrderingError> {
        let node = self.get_node(id).await?;

        let children = self.list_children(id).await?;
        if !children.is_empty() {
            return Err(OrderingError::hierarchy_violation(format!(
                "{} {} still has {} children; reassign or remove them first",
                self.kind,
                id,
                children.len()
            )));
        }

        let deleted = self.bounded("delete", self.store.delete(id)).await?;
        if !deleted {
            return Err(OrderingError::node_not_found(id));
        }

        tracing::info!("Deleted {} {}", self.kind, id);
        self.emit_event(AuditEvent::NodeDeleted {
            id: node.id,
            kind: self.kind,
            scope_id: node.scope_id,
            actor_id: self.actor_id.clone(),
        });

        Ok(())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn load_scope(&self, scope_id: &str) -> Result<Vec<OrderedNode>, OrderingError> {
        self.store
            .find_many_by_scope(self.kind, scope_id)
            .await
            .map_err(|e| self.store_error("find_many_by_scope", e))
    }

    /// Nodes of the scope sharing `parent_id` (root level for `None`)
    async fn load_siblings(
        &self,
        scope_id: &str,
        parent_id: Option<&str>,
    ) -> Result<Vec<OrderedNode>, OrderingError> {
        Ok(self
            .load_scope(scope_id)
            .await?
            .into_iter()
            .filter(|n| n.parent_id.as_deref() == parent_id)
            .collect())
    }

    fn validate_batch(&self, scope_id: &str, updates: &[RankUpdate]) -> Result<(), OrderingError> {
        if scope_id.trim().is_empty() {
            return Err(ValidationError::MissingField("scope_id".to_string()).into());
        }
        if updates.is_empty() {
            return Err(ValidationError::InvalidBatch(
                "batch must contain at least one update".to_string(),
            )
            .into());
        }
        if updates.len() > self.config.max_batch_size {
            return Err(ValidationError::InvalidBatch(format!(
                "batch of {} exceeds the limit of {}",
                updates.len(),
                self.config.max_batch_size
            ))
            .into());
        }

        let mut seen = HashSet::new();
        for update in updates {
            if update.id.trim().is_empty() {
                return Err(ValidationError::MissingField("id".to_string()).into());
            }
            if !seen.insert(update.id.as_str()) {
                return Err(ValidationError::InvalidBatch(format!(
                    "id '{}' appears more than once",
                    update.id
                ))
                .into());
            }
            self.check_positive("order", update.rank)?;
        }

        Ok(())
    }

    fn check_positive(&self, field: &str, rank: i64) -> Result<(), OrderingError> {
        if self.config.require_positive_ranks && rank <= 0 {
            return Err(ValidationError::InvalidRank(format!(
                "{} must be positive for {}, got {}",
                field, self.kind, rank
            ))
            .into());
        }
        Ok(())
    }

    /// Key under which submitted ranks must be distinct
    fn uniqueness_group(&self, node: &OrderedNode) -> Option<String> {
        match self.config.uniqueness {
            UniquenessScope::Scope => None,
            UniquenessScope::Siblings => node.parent_id.clone(),
        }
    }

    fn check_distinct_ranks(
        &self,
        updates: &[RankUpdate],
        by_id: &HashMap<&str, &OrderedNode>,
    ) -> Result<(), OrderingError> {
        let mut claimed: HashMap<(Option<String>, i64), Vec<String>> = HashMap::new();
        let mut keys = Vec::with_capacity(updates.len());

        for update in updates {
            let group = by_id
                .get(update.id.as_str())
                .and_then(|node| self.uniqueness_group(node));
            let key = (group, update.rank);
            claimed
                .entry(key.clone())
                .or_default()
                .push(update.id.clone());
            keys.push(key);
        }

        // Report the first collision in submission order
        for key in keys {
            if let Some(ids) = claimed.get(&key).filter(|ids| ids.len() > 1) {
                tracing::warn!(
                    "Rejected reorder of {}: rank {} submitted for {:?}",
                    self.kind,
                    key.1,
                    ids
                );
                return Err(OrderingError::duplicate_rank(key.1, ids.clone()));
            }
        }

        Ok(())
    }

    /// Target ranks after renumbering `nodes` in canonical order
    fn renumbered(&self, nodes: &[OrderedNode]) -> HashMap<String, i64> {
        let mut sorted = nodes.to_vec();
        canonical_sort(&mut sorted);

        let mut groups: Vec<(Option<String>, Vec<String>)> = Vec::new();
        for node in sorted {
            let group = self.uniqueness_group(&node);
            match groups.iter_mut().find(|(key, _)| *key == group) {
                Some((_, ids)) => ids.push(node.id),
                None => groups.push((group, vec![node.id])),
            }
        }

        groups
            .into_iter()
            .flat_map(|(_, ids)| self.allocator.normalize_ranks(ids))
            .collect()
    }

    /// Write every target rank that differs from the current one in a single
    /// transaction, then announce the changes
    async fn commit_ranks(
        &self,
        scope_id: &str,
        current: &HashMap<&str, &OrderedNode>,
        targets: HashMap<String, i64>,
        guarded: &[OrderedNode],
    ) -> Result<usize, OrderingError> {
        let mut writes: Vec<NodeWrite> = targets
            .into_iter()
            .filter_map(|(id, rank)| {
                let node = current.get(id.as_str())?;
                (node.rank != rank).then(|| NodeWrite::new(id, node.version).rank(rank))
            })
            .collect();

        if writes.is_empty() {
            tracing::debug!("Reorder of {} scope {} changes nothing", self.kind, scope_id);
            return Ok(0);
        }
        let rewritten: HashSet<String> = writes.iter().map(|w| w.id.clone()).collect();
        writes.extend(
            guarded
                .iter()
                .filter(|n| !rewritten.contains(&n.id))
                .map(|n| NodeWrite::version_check(&n.id, n.version)),
        );
        writes.sort_by(|a, b| a.id.cmp(&b.id));

        let written = self.bounded("update_many", self.store.update_many(writes)).await?;

        let changes: Vec<RankChange> = written
            .iter()
            .filter_map(|node| {
                current
                    .get(node.id.as_str())
                    .map(|old| RankChange::new(&node.id, old.rank, node.rank))
            })
            .collect();

        tracing::info!(
            "Committed {} rank changes in {} scope {}",
            written.len(),
            self.kind,
            scope_id
        );
        self.emit_event(AuditEvent::RanksChanged {
            kind: self.kind,
            scope_id: scope_id.to_string(),
            changes,
            actor_id: self.actor_id.clone(),
        });

        Ok(written.len())
    }

    async fn write_one(&self, operation: &str, write: NodeWrite) -> Result<OrderedNode, OrderingError> {
        let id = write.id.clone();
        self.bounded(operation, self.store.update_many(vec![write]))
            .await?
            .pop()
            .ok_or_else(|| OrderingError::conflict(format!("node {} was not written", id)))
    }

    /// Await a store write, bounded by `store_timeout_ms` when configured
    ///
    /// On expiry the write may still commit, so the caller gets
    /// `OutcomeUnknown` rather than a retryable error.
    async fn bounded<T, F>(&self, operation: &str, write: F) -> Result<T, OrderingError>
    where
        F: Future<Output = Result<T, DatabaseError>>,
    {
        let result = match self.config.store_timeout_ms {
            Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), write).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::error!(
                        "{} on {} store exceeded {}ms, outcome unknown",
                        operation,
                        self.kind,
                        ms
                    );
                    return Err(OrderingError::outcome_unknown(format!(
                        "{} did not complete within {}ms",
                        operation, ms
                    )));
                }
            },
            None => write.await,
        };
        result.map_err(|e| self.store_error(operation, e))
    }

    fn store_error(&self, operation: &str, error: DatabaseError) -> OrderingError {
        match &error {
            DatabaseError::NodeNotFound { .. } => {
                tracing::warn!("{} on {} store: {}", operation, self.kind, error)
            }
            e if e.is_conflict() => {
                tracing::warn!("{} on {} store: {}", operation, self.kind, error)
            }
            _ => tracing::error!("{} on {} store failed: {}", operation, self.kind, error),
        }
        error.into()
    }
}

/// Nodes are removed from `children` as they are placed, so a node is
/// never placed twice even if the stored parents loop.
fn build_tree(node: OrderedNode, children: &mut HashMap<String, Vec<OrderedNode>>) -> TreeNode {
    let direct = children.remove(&node.id).unwrap_or_default();
    TreeNode {
        children: direct
            .into_iter()
            .map(|child| build_tree(child, children))
            .collect(),
        node,
    }
}

/// True if following `parents` from `id` comes back to `id`
fn in_parent_loop(id: &str, parents: &HashMap<&str, &str>) -> bool {
    let mut seen = HashSet::new();
    let mut current = id;
    while let Some(parent) = parents.get(current).copied() {
        if parent == id {
            return true;
        }
        if !seen.insert(parent) {
            return false;
        }
        current = parent;
    }
    false
}

fn placed(forest: &[TreeNode], id: &str) -> bool {
    forest
        .iter()
        .any(|tree| tree.node.id == id || placed(&tree.children, id))
}
