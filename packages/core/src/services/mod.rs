//! Business Services
//!
//! - `HierarchyService` - ranked hierarchy operations for one entity kind
//! - `AuditLogger` - background consumer writing audit events to `tracing`
//!
//! Services own the ordering rules and coordinate the store; the store only
//! guarantees atomic, version-checked batches.

pub mod audit_logger;
pub mod error;
pub mod hierarchy_service;

pub use audit_logger::{AuditLogger, AUDIT_TARGET};
pub use error::OrderingError;
pub use hierarchy_service::HierarchyService;
