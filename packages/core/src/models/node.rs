//! Ordered Node Data Structures
//!
//! This module defines `OrderedNode`, the record shape shared by every entity
//! kind whose siblings carry an explicit rank (features, files, schema fields,
//! comments and road-map items).
//!
//! # Architecture
//!
//! - **Adjacency relation**: hierarchy is a `parent_id` self-reference, never an
//!   in-memory pointer graph. Children are derived by lookup.
//! - **Scoped ranks**: `rank` orders nodes within a `scope_id` (usually a project).
//! - **Optimistic concurrency**: `version` is bumped on every write so that
//!   a batch computed from stale reads is rejected as a whole.
//!
//! # Examples
//!
//! ```rust
//! use planboard_core::models::{NodeKind, OrderedNode};
//!
//! let feature = OrderedNode::new(NodeKind::Feature, "project-1", "Login", 100);
//! let sub = OrderedNode::new(NodeKind::Feature, "project-1", "OAuth", 100)
//!     .with_parent(feature.id.clone());
//! assert_eq!(sub.parent_id.as_deref(), Some(feature.id.as_str()));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Default version value for serde deserialization (version 1)
fn default_version() -> i64 {
    1
}

/// Validation errors raised while checking input at the boundary
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid node kind: {0}")]
    InvalidNodeKind(String),

    #[error("Invalid parent reference: {0}")]
    InvalidParent(String),

    #[error("Invalid rank: {0}")]
    InvalidRank(String),

    #[error("Invalid batch: {0}")]
    InvalidBatch(String),
}

/// Entity kinds that participate in ranked hierarchies.
///
/// One `HierarchyService` is instantiated per kind; a node can only be
/// parented to a node of the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Feature,
    File,
    SchemaField,
    Comment,
    RoadMapItem,
}

impl NodeKind {
    pub const ALL: [NodeKind; 5] = [
        NodeKind::Feature,
        NodeKind::File,
        NodeKind::SchemaField,
        NodeKind::Comment,
        NodeKind::RoadMapItem,
    ];

    /// Stable storage identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Feature => "feature",
            NodeKind::File => "file",
            NodeKind::SchemaField => "schema_field",
            NodeKind::Comment => "comment",
            NodeKind::RoadMapItem => "road_map_item",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidNodeKind(s.to_string()))
    }
}

/// A record whose position among its siblings is defined by `rank`.
///
/// # Fields
///
/// - `id`: Opaque unique identifier (UUID v4 when generated)
/// - `kind`: Entity kind; hierarchy never crosses kinds
/// - `scope_id`: Owning collection, usually the project id
/// - `parent_id`: Optional parent of the same kind and scope (`None` = root level)
/// - `rank`: Primary order (`order` on the wire)
/// - `dev_rank`: Secondary developer order (`devorder`), only used by files
/// - `name`: Display name, secondary sort key
/// - `version`: Optimistic concurrency counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderedNode {
    pub id: String,

    pub kind: NodeKind,

    pub scope_id: String,

    pub parent_id: Option<String>,

    #[serde(rename = "order")]
    pub rank: i64,

    #[serde(rename = "devorder", default, skip_serializing_if = "Option::is_none")]
    pub dev_rank: Option<i64>,

    pub name: String,

    #[serde(default = "default_version")]
    pub version: i64,

    pub created_at: DateTime<Utc>,

    pub modified_at: DateTime<Utc>,
}

impl OrderedNode {
    /// Create a root-level node with a generated UUID
    pub fn new(
        kind: NodeKind,
        scope_id: impl Into<String>,
        name: impl Into<String>,
        rank: i64,
    ) -> Self {
        Self::new_with_id(Uuid::new_v4().to_string(), kind, scope_id, name, rank)
    }

    /// Create a root-level node with an explicit id
    pub fn new_with_id(
        id: impl Into<String>,
        kind: NodeKind,
        scope_id: impl Into<String>,
        name: impl Into<String>,
        rank: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind,
            scope_id: scope_id.into(),
            parent_id: None,
            rank,
            dev_rank: None,
            name: name.into(),
            version: 1,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_dev_rank(mut self, dev_rank: i64) -> Self {
        self.dev_rank = Some(dev_rank);
        self
    }

    /// Validate node structure
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if:
    /// - `id` or `scope_id` is empty
    /// - Node references itself as parent
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::MissingField("id".to_string()));
        }

        if self.scope_id.trim().is_empty() {
            return Err(ValidationError::MissingField("scope_id".to_string()));
        }

        if let Some(parent_id) = &self.parent_id {
            if parent_id == &self.id {
                return Err(ValidationError::InvalidParent(
                    "Node cannot be its own parent".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// A single `(id, new_rank)` pair of a batch reorder
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RankUpdate {
    pub id: String,
    #[serde(rename = "order")]
    pub rank: i64,
}

impl RankUpdate {
    pub fn new(id: impl Into<String>, rank: i64) -> Self {
        Self {
            id: id.into(),
            rank,
        }
    }
}

/// Per-node rank change; at least one field must be set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankPatch {
    pub rank: Option<i64>,
    pub dev_rank: Option<i64>,
}

impl RankPatch {
    pub fn is_empty(&self) -> bool {
        self.rank.is_none() && self.dev_rank.is_none()
    }
}

/// A version-guarded row write applied inside one store transaction.
///
/// Only fields that are `Some` change. `parent_id: Some(None)` moves the node
/// to root level.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeWrite {
    pub id: String,
    pub expected_version: i64,
    pub rank: Option<i64>,
    pub dev_rank: Option<i64>,
    pub parent_id: Option<Option<String>>,
    /// Only assert `expected_version`; the row is neither changed nor returned
    pub check_only: bool,
}

impl NodeWrite {
    pub fn new(id: impl Into<String>, expected_version: i64) -> Self {
        Self {
            id: id.into(),
            expected_version,
            rank: None,
            dev_rank: None,
            parent_id: None,
            check_only: false,
        }
    }

    /// A write that fails the batch if the row moved past `expected_version`
    pub fn version_check(id: impl Into<String>, expected_version: i64) -> Self {
        Self {
            check_only: true,
            ..Self::new(id, expected_version)
        }
    }

    pub fn rank(mut self, rank: i64) -> Self {
        self.rank = Some(rank);
        self
    }

    pub fn dev_rank(mut self, dev_rank: i64) -> Self {
        self.dev_rank = Some(dev_rank);
        self
    }

    pub fn parent(mut self, parent_id: Option<String>) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Apply this write to an in-memory copy of the row
    pub fn apply_to(&self, node: &mut OrderedNode, now: DateTime<Utc>) {
        if self.check_only {
            return;
        }
        if let Some(rank) = self.rank {
            node.rank = rank;
        }
        if let Some(dev_rank) = self.dev_rank {
            node.dev_rank = Some(dev_rank);
        }
        if let Some(parent_id) = &self.parent_id {
            node.parent_id = parent_id.clone();
        }
        node.version += 1;
        node.modified_at = now;
    }
}

/// Parameters for creating a node
#[derive(Debug, Clone)]
pub struct CreateNodeParams {
    /// Optional ID for the node. If None, a UUID is generated
    pub id: Option<String>,
    pub scope_id: String,
    pub parent_id: Option<String>,
    pub name: String,
    /// Explicit rank; None appends after the last sibling
    pub rank: Option<i64>,
    pub dev_rank: Option<i64>,
}

impl CreateNodeParams {
    pub fn new(scope_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            scope_id: scope_id.into(),
            parent_id: None,
            name: name.into(),
            rank: None,
            dev_rank: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_rank(mut self, rank: i64) -> Self {
        self.rank = Some(rank);
        self
    }
}

/// Result of a committed reorder: the refreshed collection and how many rows changed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderOutcome {
    pub nodes: Vec<OrderedNode>,
    pub updated_count: usize,
}

/// A node together with its derived children, canonically ordered
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeNode {
    #[serde(flatten)]
    pub node: OrderedNode,
    pub children: Vec<TreeNode>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_kind_round_trips_through_storage_name() {
        for kind in NodeKind::ALL {
            assert_eq!(kind.as_str().parse::<NodeKind>().unwrap(), kind);
        }
        assert!(matches!(
            "sprint".parse::<NodeKind>(),
            Err(ValidationError::InvalidNodeKind(_))
        ));
    }

    #[test]
    fn test_validate_rejects_self_parent() {
        let node = OrderedNode::new_with_id("f1", NodeKind::Feature, "p1", "F1", 100)
            .with_parent("f1");
        assert_eq!(
            node.validate(),
            Err(ValidationError::InvalidParent(
                "Node cannot be its own parent".to_string()
            ))
        );
    }

    #[test]
    fn test_validate_rejects_blank_scope() {
        let node = OrderedNode::new(NodeKind::Comment, "  ", "c", 100);
        assert_eq!(
            node.validate(),
            Err(ValidationError::MissingField("scope_id".to_string()))
        );
    }

    #[test]
    fn test_serializes_wire_field_names() {
        let node = OrderedNode::new_with_id("f1", NodeKind::File, "p1", "brief.pdf", 200)
            .with_dev_rank(300);
        let value = serde_json::to_value(&node).unwrap();

        assert_eq!(value["order"], json!(200));
        assert_eq!(value["devorder"], json!(300));
        assert_eq!(value["scopeId"], json!("p1"));
        assert_eq!(value["kind"], json!("file"));
    }

    #[test]
    fn test_node_write_applies_only_set_fields() {
        let mut node = OrderedNode::new_with_id("a", NodeKind::Feature, "p1", "A", 100)
            .with_parent("root");
        let now = Utc::now();

        NodeWrite::new("a", 1).rank(300).apply_to(&mut node, now);
        assert_eq!(node.rank, 300);
        assert_eq!(node.parent_id.as_deref(), Some("root"));
        assert_eq!(node.version, 2);

        NodeWrite::new("a", 2).parent(None).apply_to(&mut node, now);
        assert_eq!(node.parent_id, None);
        assert_eq!(node.rank, 300);
        assert_eq!(node.version, 3);

        NodeWrite::version_check("a", 3).apply_to(&mut node, now);
        assert_eq!(node.version, 3);
    }
}
