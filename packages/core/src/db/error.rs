//! Database Error Types
//!
//! This module defines error types for store operations, covering connection
//! and schema setup as well as the row-level failures the ordering core must
//! tell apart (missing rows and optimistic-concurrency conflicts).

use std::path::PathBuf;
use thiserror::Error;

/// Store operation errors
///
/// Connection and SQL failures are opaque to the service layer. Row-level
/// conflicts are mapped to retryable service errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish database connection
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Failed to initialize database schema
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// Permission denied when accessing database
    #[error("Permission denied for database path: {path}")]
    PermissionDenied { path: PathBuf },

    /// Failed to create parent directory
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// libsql operation error
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// Row could not be decoded into a node
    #[error("Corrupt row for node '{id}': {reason}")]
    CorruptRow { id: String, reason: String },

    /// Row addressed by a write does not exist
    #[error("Node not found: {id}")]
    NodeNotFound { id: String },

    /// Insert with an id that is already taken
    #[error("Node already exists: {id}")]
    DuplicateId { id: String },

    /// Delete of a row that other rows still name as their parent
    #[error("Node {id} still has {children} children")]
    HasChildren { id: String, children: usize },

    /// Row version changed between read and write
    #[error("Version conflict for node {id}: expected version {expected}, found {actual}")]
    VersionConflict {
        id: String,
        expected: i64,
        actual: i64,
    },
}

impl DatabaseError {
    /// Create a connection failed error
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a permission denied error
    pub fn permission_denied(path: PathBuf) -> Self {
        Self::PermissionDenied { path }
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    pub fn corrupt_row(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptRow {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::NodeNotFound { id: id.into() }
    }

    pub fn duplicate_id(id: impl Into<String>) -> Self {
        Self::DuplicateId { id: id.into() }
    }

    pub fn has_children(id: impl Into<String>, children: usize) -> Self {
        Self::HasChildren {
            id: id.into(),
            children,
        }
    }

    pub fn version_conflict(id: impl Into<String>, expected: i64, actual: i64) -> Self {
        Self::VersionConflict {
            id: id.into(),
            expected,
            actual,
        }
    }

    /// True for failures caused by a concurrent writer rather than by I/O
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::VersionConflict { .. } | Self::DuplicateId { .. }
        )
    }
}
