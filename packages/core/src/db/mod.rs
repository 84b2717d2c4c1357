//! Database Layer
//!
//! This module handles persistence of ordered nodes:
//!
//! - `NodeStore` trait: the contract the ordering core depends on
//! - `LibsqlStore`: relational store on an embedded libsql database
//! - `MemoryStore`: arena keyed by id, for tests and embedding
//! - `AuditEvent`: change notifications broadcast after commit
//!
//! # Architecture
//!
//! Both stores apply a batch of `NodeWrite`s atomically and check each row's
//! `version` against the value the batch was computed from. Rank rules, batch
//! validation and cycle checks live above the store in `HierarchyService`.

mod database;
mod error;
pub mod events;
mod libsql_store;
mod memory_store;
mod node_store;

pub use database::DatabaseService;
pub use error::DatabaseError;
pub use events::{AuditEvent, RankChange};
pub use libsql_store::LibsqlStore;
pub use memory_store::MemoryStore;
pub use node_store::NodeStore;
