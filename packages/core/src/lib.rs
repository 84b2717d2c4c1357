//! Planboard Core: ordered hierarchy management
//!
//! This crate keeps the `order` / `devorder` ranks of Planboard's nested,
//! ordered records (features, files, schema fields, comments and road-map
//! items) consistent under reordering, batch updates and parent changes.
//!
//! # Architecture
//!
//! - **Adjacency model**: each record stores a `parent_id`; children are derived by lookup
//! - **Integer ranks with gaps**: appends use `max + 100`, renumbering restores the gaps
//! - **Atomic batches**: a reorder is validated as a set and written in one transaction
//! - **Optimistic concurrency**: every row write is guarded by the version it was read at
//!
//! # Modules
//!
//! - [`models`] - `OrderedNode`, mutation inputs and boundary request schemas
//! - [`ordering`] - rank allocator, cycle guard and move adapter
//! - [`db`] - `NodeStore` trait with libsql and in-memory implementations
//! - [`services`] - `HierarchyService`, `OrderingError`, `AuditLogger`
//! - [`config`] - `HierarchyConfig` per entity kind
//! - [`logging`] - tracing subscriber setup for binaries and tests

pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod ordering;
pub mod services;

// Re-export commonly used types
pub use config::{HierarchyConfig, UniquenessScope};
pub use db::{AuditEvent, DatabaseService, LibsqlStore, MemoryStore, NodeStore};
pub use models::*;
pub use services::*;
