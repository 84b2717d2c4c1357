//! Data Models
//!
//! This module contains the data structures used throughout Planboard's
//! ordering core:
//!
//! - `OrderedNode` - Ranked, self-referencing record shared by every entity kind
//! - `RankUpdate`, `RankPatch`, `NodeWrite` - Mutation inputs
//! - `requests` - Typed boundary schemas validated before reaching the core

mod node;
pub mod requests;

pub use node::{
    CreateNodeParams, NodeKind, NodeWrite, OrderedNode, RankPatch, RankUpdate, ReorderOutcome,
    TreeNode, ValidationError,
};
pub use requests::{
    BatchReorderRequest, BatchReorderResponse, CreateNodeRequest, RankPatchRequest,
    RankPatchResponse, ReparentRequest,
};
