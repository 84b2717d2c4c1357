//! In-memory arena store
//!
//! Nodes are kept in a map keyed by id behind a single `RwLock`. A batch takes
//! the write lock once, validates every write, then applies them, so readers
//! never observe a partially applied batch. Parent references are enforced
//! the same way the relational schema enforces them: an insert needs an
//! existing parent and a node with children cannot be deleted.

use crate::db::{DatabaseError, NodeStore};
use crate::models::{NodeKind, NodeWrite, OrderedNode};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryStore {
    nodes: RwLock<HashMap<String, OrderedNode>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }
}

#[async_trait]
impl NodeStore for MemoryStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<OrderedNode>, DatabaseError> {
        Ok(self.nodes.read().await.get(id).cloned())
    }

    async fn find_many_by_scope(
        &self,
        kind: NodeKind,
        scope_id: &str,
    ) -> Result<Vec<OrderedNode>, DatabaseError> {
        let nodes = self.nodes.read().await;
        Ok(nodes
            .values()
            .filter(|n| n.kind == kind && n.scope_id == scope_id)
            .cloned()
            .collect())
    }

    async fn find_children(&self, parent_id: &str) -> Result<Vec<OrderedNode>, DatabaseError> {
        let nodes = self.nodes.read().await;
        Ok(nodes
            .values()
            .filter(|n| n.parent_id.as_deref() == Some(parent_id))
            .cloned()
            .collect())
    }

    async fn insert(&self, node: OrderedNode) -> Result<OrderedNode, DatabaseError> {
        let mut nodes = self.nodes.write().await;
        if nodes.contains_key(&node.id) {
            return Err(DatabaseError::duplicate_id(node.id));
        }
        if let Some(parent_id) = node.parent_id.as_deref() {
            if !nodes.contains_key(parent_id) {
                return Err(DatabaseError::node_not_found(parent_id));
            }
        }
        nodes.insert(node.id.clone(), node.clone());
        Ok(node)
    }

    async fn update_many(&self, writes: Vec<NodeWrite>) -> Result<Vec<OrderedNode>, DatabaseError> {
        let mut nodes = self.nodes.write().await;

        // Validate every write before touching any row
        for write in &writes {
            let current = nodes
                .get(&write.id)
                .ok_or_else(|| DatabaseError::node_not_found(&write.id))?;
            if current.version != write.expected_version {
                return Err(DatabaseError::version_conflict(
                    &write.id,
                    write.expected_version,
                    current.version,
                ));
            }
        }

        let now = Utc::now();
        let mut written = Vec::with_capacity(writes.len());
        for write in writes.iter().filter(|w| !w.check_only) {
            if let Some(node) = nodes.get_mut(&write.id) {
                write.apply_to(node, now);
                written.push(node.clone());
            }
        }

        Ok(written)
    }

    async fn delete(&self, id: &str) -> Result<bool, DatabaseError> {
        let mut nodes = self.nodes.write().await;
        let children = nodes
            .values()
            .filter(|n| n.parent_id.as_deref() == Some(id))
            .count();
        if children > 0 {
            return Err(DatabaseError::has_children(id, children));
        }
        Ok(nodes.remove(id).is_some())
    }
}
