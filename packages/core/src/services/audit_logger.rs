//! Audit Logger
//!
//! Consumes `AuditEvent`s from a `HierarchyService` and writes them as
//! structured `tracing` records under the `planboard::audit` target. Runs as
//! its own task so audit output never delays a commit.

use crate::db::AuditEvent;
use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Tracing target of audit records, for filtering with `RUST_LOG`
pub const AUDIT_TARGET: &str = "planboard::audit";

pub struct AuditLogger {
    rx: broadcast::Receiver<AuditEvent>,
}

impl AuditLogger {
    /// Pass the receiver from `HierarchyService::subscribe_to_audit_events()`
    pub fn new(rx: broadcast::Receiver<AuditEvent>) -> Self {
        Self { rx }
    }

    /// Record events until every sender is dropped
    ///
    /// Returns the number of events recorded. Events dropped because the
    /// logger fell behind are reported but not fatal.
    pub async fn run(mut self) -> Result<u64> {
        debug!("Starting audit logger");
        let mut recorded = 0u64;

        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    record(&event);
                    recorded += 1;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        target: AUDIT_TARGET,
                        skipped, "Audit logger lagged, {} events were not recorded", skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Audit channel closed after {} events", recorded);
                    return Ok(recorded);
                }
            }
        }
    }
}

fn record(event: &AuditEvent) {
    info!(
        target: AUDIT_TARGET,
        event_type = event.event_type(),
        actor_id = event.actor_id().unwrap_or("system"),
        "{}",
        event.description()
    );
}
