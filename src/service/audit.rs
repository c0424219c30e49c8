//! Audit recording for external calls.
//!
//! Every call arriving through an access surface leaves one audit entry:
//! who, what operation/resource, and how it came out. This is traceability
//! distinct from per-ticket revisions. Recording never fails the caller —
//! a failed write is logged and swallowed.

use super::Service;
use crate::models::AuditEntry;
use crate::{Error, Result};
use tracing::warn;

/// Outcome code recorded for a call, derived from its result.
pub fn outcome_of<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(Error::NotFound(_)) => "not_found",
        Err(Error::Validation(_)) => "validation",
        Err(Error::Duplicate(_)) => "duplicate",
        Err(_) => "error",
    }
}

impl Service {
    /// Record one external call. Never fails; errors are logged and dropped.
    pub fn record_audit(
        &mut self,
        actor: Option<i64>,
        operation: &str,
        resource: &str,
        outcome: &str,
        details: &str,
    ) {
        if let Err(e) = self
            .store
            .insert_audit(actor, operation, resource, outcome, details)
        {
            warn!(operation, error = %e, "failed to record audit entry");
        }
    }

    /// Most recent audit entries, newest first.
    pub fn recent_audit(&self, limit: i64) -> Result<Vec<AuditEntry>> {
        self.store.list_audit(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::storage::Store;
    use std::sync::Arc;

    #[test]
    fn test_audit_records_and_reads_back() {
        let store = Store::open_in_memory().unwrap();
        let mut svc = Service::new(store, Arc::new(EventBus::new()));
        let agent = svc.create_agent("bot1").unwrap();

        svc.record_audit(None, "ticket.create", "project/1", "validation", "blank title");
        svc.record_audit(Some(agent.id), "ticket.move", "project/1/ticket/2", "ok", "");

        let entries = svc.recent_audit(10).unwrap();
        assert_eq!(entries.len(), 2);
        // Newest first.
        assert_eq!(entries[0].operation, "ticket.move");
        assert_eq!(entries[0].actor_id, Some(agent.id));
        assert_eq!(entries[1].outcome, "validation");
        assert!(entries[1].actor_id.is_none());
    }

    #[test]
    fn test_failed_audit_write_is_swallowed() {
        let store = Store::open_in_memory().unwrap();
        let mut svc = Service::new(store, Arc::new(EventBus::new()));

        // Actor 999 violates the agents foreign key; the entry is dropped,
        // the caller never sees the failure.
        svc.record_audit(Some(999), "ticket.move", "project/1/ticket/2", "ok", "");
        assert!(svc.recent_audit(10).unwrap().is_empty());
    }

    #[test]
    fn test_outcome_codes() {
        assert_eq!(outcome_of(&Ok(())), "ok");
        assert_eq!(
            outcome_of::<()>(&Err(Error::NotFound("x".to_string()))),
            "not_found"
        );
        assert_eq!(
            outcome_of::<()>(&Err(Error::Validation("x".to_string()))),
            "validation"
        );
        assert_eq!(
            outcome_of::<()>(&Err(Error::Duplicate("x".to_string()))),
            "duplicate"
        );
        assert_eq!(
            outcome_of::<()>(&Err(Error::Other("x".to_string()))),
            "error"
        );
    }
}
