//! Audit Events for ordered node mutations
//!
//! Every committed mutation of a `HierarchyService` is announced on a tokio
//! broadcast channel. Delivery is fire-and-forget: a missing or lagging
//! subscriber never affects the write that produced the event.
//!
//! # Event Flow
//!
//! 1. `HierarchyService` commits a batch through the store
//! 2. An `AuditEvent` carrying the acting user is sent on the channel
//! 3. `AuditLogger` (or any other subscriber) records it asynchronously

use crate::models::{NodeKind, OrderedNode};
use serde::{Deserialize, Serialize};

/// Rank of one node before and after a committed batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankChange {
    pub id: String,
    pub old_rank: i64,
    pub new_rank: i64,
}

impl RankChange {
    pub fn new(id: impl Into<String>, old_rank: i64, new_rank: i64) -> Self {
        Self {
            id: id.into(),
            old_rank,
            new_rank,
        }
    }
}

/// Audit events emitted by `HierarchyService` after commit
///
/// `actor_id` is the user the service was scoped to with `with_actor()`,
/// or `None` for system-initiated changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AuditEvent {
    /// A node was created with an allocated or explicit rank
    #[serde(rename = "node:created", rename_all = "camelCase")]
    NodeCreated {
        node: OrderedNode,
        actor_id: Option<String>,
    },

    /// One or more ranks in a scope changed in a single transaction
    #[serde(rename = "ranks:changed", rename_all = "camelCase")]
    RanksChanged {
        kind: NodeKind,
        scope_id: String,
        changes: Vec<RankChange>,
        actor_id: Option<String>,
    },

    /// The developer order of a file changed
    #[serde(rename = "devrank:changed", rename_all = "camelCase")]
    DevRankChanged {
        id: String,
        old_dev_rank: Option<i64>,
        new_dev_rank: i64,
        actor_id: Option<String>,
    },

    /// A node moved under a different parent
    #[serde(rename = "node:reparented", rename_all = "camelCase")]
    NodeReparented {
        node: OrderedNode,
        old_parent_id: Option<String>,
        actor_id: Option<String>,
    },

    /// A childless node was deleted
    #[serde(rename = "node:deleted", rename_all = "camelCase")]
    NodeDeleted {
        id: String,
        kind: NodeKind,
        scope_id: String,
        actor_id: Option<String>,
    },
}

impl AuditEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            AuditEvent::NodeCreated { .. } => "node:created",
            AuditEvent::RanksChanged { .. } => "ranks:changed",
            AuditEvent::DevRankChanged { .. } => "devrank:changed",
            AuditEvent::NodeReparented { .. } => "node:reparented",
            AuditEvent::NodeDeleted { .. } => "node:deleted",
        }
    }

    pub fn actor_id(&self) -> Option<&str> {
        match self {
            AuditEvent::NodeCreated { actor_id, .. }
            | AuditEvent::RanksChanged { actor_id, .. }
            | AuditEvent::DevRankChanged { actor_id, .. }
            | AuditEvent::NodeReparented { actor_id, .. }
            | AuditEvent::NodeDeleted { actor_id, .. } => actor_id.as_deref(),
        }
    }

    /// Human-readable summary for the audit trail, e.g. `order of f1: 300 → 200`
    pub fn description(&self) -> String {
        match self {
            AuditEvent::NodeCreated { node, .. } => {
                format!("created {} {} at order {}", node.kind, node.id, node.rank)
            }
            AuditEvent::RanksChanged { changes, .. } => changes
                .iter()
                .map(|c| format!("order of {}: {} → {}", c.id, c.old_rank, c.new_rank))
                .collect::<Vec<_>>()
                .join(", "),
            AuditEvent::DevRankChanged {
                id,
                old_dev_rank,
                new_dev_rank,
                ..
            } => match old_dev_rank {
                Some(old) => format!("devorder of {}: {} → {}", id, old, new_dev_rank),
                None => format!("devorder of {}: unset → {}", id, new_dev_rank),
            },
            AuditEvent::NodeReparented {
                node,
                old_parent_id,
                ..
            } => format!(
                "parent of {}: {} → {}",
                node.id,
                old_parent_id.as_deref().unwrap_or("root"),
                node.parent_id.as_deref().unwrap_or("root")
            ),
            AuditEvent::NodeDeleted { id, kind, .. } => format!("deleted {} {}", kind, id),
        }
    }
}
