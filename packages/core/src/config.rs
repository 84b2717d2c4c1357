//! Hierarchy configuration
//!
//! Tunables for one `HierarchyService`. Every field has a default, so a JSON
//! document only needs to name what it overrides:
//!
//! ```rust
//! use planboard_core::config::{HierarchyConfig, UniquenessScope};
//!
//! let config = HierarchyConfig::from_json_str(r#"{ "uniqueness": "siblings" }"#).unwrap();
//! assert_eq!(config.uniqueness, UniquenessScope::Siblings);
//! assert_eq!(config.rank_step, 100);
//! ```

use crate::models::NodeKind;
use crate::ordering::RANK_STEP;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding `rank_step`
pub const ENV_RANK_STEP: &str = "PLANBOARD_RANK_STEP";
/// Environment variable overriding `max_batch_size`
pub const ENV_MAX_BATCH_SIZE: &str = "PLANBOARD_MAX_BATCH_SIZE";
/// Environment variable overriding `store_timeout_ms`
pub const ENV_STORE_TIMEOUT_MS: &str = "PLANBOARD_STORE_TIMEOUT_MS";

/// Capacity of the audit event broadcast channel
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 128;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse hierarchy config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid hierarchy config: {0}")]
    Invalid(String),
}

/// Which nodes must hold mutually distinct ranks within a reorder batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniquenessScope {
    /// All submitted nodes of the scope
    #[default]
    Scope,
    /// Only nodes sharing a parent
    Siblings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyConfig {
    /// Increment used for appends and normalisation (default: 100)
    pub rank_step: i64,
    /// Rank uniqueness policy for batches (default: whole scope)
    pub uniqueness: UniquenessScope,
    /// Reject zero and negative ranks (default: false)
    pub require_positive_ranks: bool,
    /// Renumber the scope in the same transaction after each reorder (default: false)
    pub normalize_after_reorder: bool,
    /// Largest accepted reorder batch (default: 1000)
    pub max_batch_size: usize,
    /// Upper bound on a single store write; `None` waits indefinitely
    pub store_timeout_ms: Option<u64>,
    /// Audit channel capacity (default: 128)
    pub event_channel_capacity: usize,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            rank_step: RANK_STEP,
            uniqueness: UniquenessScope::Scope,
            require_positive_ranks: false,
            normalize_after_reorder: false,
            max_batch_size: 1000,
            store_timeout_ms: None,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl HierarchyConfig {
    /// Preset for an entity kind
    ///
    /// Files and schema fields are displayed by position number, so their
    /// ranks must stay positive.
    pub fn for_kind(kind: NodeKind) -> Self {
        match kind {
            NodeKind::File | NodeKind::SchemaField => Self {
                require_positive_ranks: true,
                ..Self::default()
            },
            NodeKind::Feature | NodeKind::Comment | NodeKind::RoadMapItem => Self::default(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PLANBOARD_*` environment overrides on top of this config
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_RANK_STEP) {
            self.rank_step = parse_env(ENV_RANK_STEP, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_BATCH_SIZE) {
            self.max_batch_size = parse_env(ENV_MAX_BATCH_SIZE, &value)?;
        }
        if let Some(value) = lookup(ENV_STORE_TIMEOUT_MS) {
            self.store_timeout_ms = Some(parse_env(ENV_STORE_TIMEOUT_MS, &value)?);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rank_step <= 0 {
            return Err(ConfigError::Invalid(format!(
                "rank_step must be positive, got {}",
                self.rank_step
            )));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.store_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "store_timeout_ms must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} has invalid value '{}'", key, value)))
}
