//! Boundary Schemas
//!
//! One typed request per operation (create, batch reorder, per-node rank patch,
//! reparent). Each request is deserialized from the caller's JSON body and
//! validated exactly once, before the hierarchy service is invoked. Responses
//! keep the shapes existing clients already consume.

use crate::models::{CreateNodeParams, OrderedNode, RankPatch, RankUpdate, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// `{ projectId, updates: [{ id, order }, ...] }`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReorderRequest {
    pub project_id: String,
    pub updates: Vec<RankUpdate>,
}

impl BatchReorderRequest {
    /// Check the batch shape without touching the store.
    ///
    /// Rank collisions are not checked here; they are reported by the reorder
    /// transaction as a retryable conflict.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.project_id.trim().is_empty() {
            return Err(ValidationError::MissingField("projectId".to_string()));
        }

        if self.updates.is_empty() {
            return Err(ValidationError::InvalidBatch(
                "updates must contain at least one item".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for update in &self.updates {
            if update.id.trim().is_empty() {
                return Err(ValidationError::MissingField("updates[].id".to_string()));
            }
            if !seen.insert(update.id.as_str()) {
                return Err(ValidationError::InvalidBatch(format!(
                    "id '{}' appears more than once",
                    update.id
                )));
            }
        }

        Ok(())
    }
}

/// `{ success, data, updatedCount }`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReorderResponse {
    pub success: bool,
    pub data: Vec<OrderedNode>,
    pub updated_count: usize,
}

/// `{ order?, devorder? }`, at least one required
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RankPatchRequest {
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(default)]
    pub devorder: Option<i64>,
}

impl RankPatchRequest {
    pub fn validate(&self) -> Result<RankPatch, ValidationError> {
        let patch = RankPatch {
            rank: self.order,
            dev_rank: self.devorder,
        };
        if patch.is_empty() {
            return Err(ValidationError::MissingField(
                "order or devorder".to_string(),
            ));
        }
        Ok(patch)
    }
}

/// `{ success, file }`
#[derive(Debug, Clone, Serialize)]
pub struct RankPatchResponse {
    pub success: bool,
    pub file: OrderedNode,
}

/// `{ parentId }`; a missing or null parent moves the node to root level
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReparentRequest {
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl ReparentRequest {
    pub fn validate(&self) -> Result<Option<&str>, ValidationError> {
        match self.parent_id.as_deref() {
            Some(id) if id.trim().is_empty() => Err(ValidationError::InvalidParent(
                "parentId must not be blank".to_string(),
            )),
            other => Ok(other),
        }
    }
}

/// `{ scopeId, parentId?, name, order?, devorder? }`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNodeRequest {
    pub scope_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(default)]
    pub devorder: Option<i64>,
}

impl CreateNodeRequest {
    pub fn validate(self) -> Result<CreateNodeParams, ValidationError> {
        if self.scope_id.trim().is_empty() {
            return Err(ValidationError::MissingField("scopeId".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name".to_string()));
        }
        if matches!(self.parent_id.as_deref(), Some(p) if p.trim().is_empty()) {
            return Err(ValidationError::InvalidParent(
                "parentId must not be blank".to_string(),
            ));
        }

        Ok(CreateNodeParams {
            id: None,
            scope_id: self.scope_id,
            parent_id: self.parent_id,
            name: self.name,
            rank: self.order,
            dev_rank: self.devorder,
        })
    }
}
