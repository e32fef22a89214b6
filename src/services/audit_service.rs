//! Best-effort audit trail.
//!
//! `AuditLogger::record` pushes onto a bounded channel and returns at once;
//! `AuditWorker` drains the channel in the background and writes through an
//! `AuditStorage`. A full queue or a failed write is logged and dropped, never
//! surfaced to the operation that produced the entry.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::model::audit_log::{AuditAction, AuditEntry, EntityType};
use crate::repository::AuditStorage;
use crate::utils::client_info::RequestOrigin;

#[derive(Clone)]
pub struct AuditLogger {
    tx: mpsc::Sender<AuditEntry>,
}

impl AuditLogger {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AuditEntry>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn record(
        &self,
        actor_id: Option<u64>,
        action: AuditAction,
        entity_type: EntityType,
        entity_id: Option<u64>,
        details: Value,
        origin: &RequestOrigin,
    ) {
        let entry = AuditEntry {
            actor_id,
            action,
            entity_type,
            entity_id,
            details,
            ip_address: origin.ip.clone(),
            user_agent: origin.user_agent.clone(),
            created_at: Utc::now(),
        };

        match self.tx.try_send(entry) {
            Ok(()) => {}
            Err(TrySendError::Full(entry)) => {
                tracing::warn!(action = %entry.action, entity_id = ?entry.entity_id, "Audit queue full, entry dropped");
            }
            Err(TrySendError::Closed(entry)) => {
                tracing::warn!(action = %entry.action, entity_id = ?entry.entity_id, "Audit worker gone, entry dropped");
            }
        }
    }
}

pub struct AuditWorker {
    storage: Arc<dyn AuditStorage>,
}

impl AuditWorker {
    pub fn new(storage: Arc<dyn AuditStorage>) -> Self {
        Self { storage }
    }

    /// Runs until every `AuditLogger` clone is dropped.
    pub async fn run(self, mut rx: mpsc::Receiver<AuditEntry>) {
        tracing::info!("Audit log worker started");

        while let Some(entry) = rx.recv().await {
            match self.storage.append(&entry).await {
                Ok(()) => {
                    tracing::debug!(action = %entry.action, entity = %entry.entity_type, "Audit entry recorded");
                }
                Err(e) => {
                    tracing::error!(error = %e, action = %entry.action, "Failed to write audit entry");
                }
            }
        }

        tracing::info!("Audit log channel closed, worker stopping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::MemoryStore;
    use serde_json::json;

    fn origin() -> RequestOrigin {
        RequestOrigin {
            ip: Some("10.0.0.9".into()),
            user_agent: Some("test-agent".into()),
        }
    }

    #[actix_web::test]
    async fn worker_persists_queued_entries() {
        let store = Arc::new(MemoryStore::new());
        let (logger, rx) = AuditLogger::channel(8);

        logger.record(Some(3), AuditAction::CheckIn, EntityType::Attendance, Some(11), json!({"status": "present"}), &origin());
        logger.record(Some(3), AuditAction::CheckOut, EntityType::Attendance, Some(11), json!({}), &origin());
        drop(logger);

        AuditWorker::new(store.clone()).run(rx).await;

        let audit = store.snapshot().audit;
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[0].action, AuditAction::CheckIn);
        assert_eq!(audit[0].ip_address.as_deref(), Some("10.0.0.9"));
        assert_eq!(audit[1].action, AuditAction::CheckOut);
    }

    #[actix_web::test]
    async fn worker_survives_storage_failures() {
        let store = Arc::new(MemoryStore::new());
        store.fail_audit_writes();
        let (logger, rx) = AuditLogger::channel(8);

        logger.record(None, AuditAction::Login, EntityType::Employee, Some(1), json!({}), &origin());
        drop(logger);

        // Returns once the channel closes despite the failed write.
        AuditWorker::new(store.clone()).run(rx).await;
        assert!(store.snapshot().audit.is_empty());
    }

    #[test]
    fn full_or_closed_queue_never_blocks_the_caller() {
        let (logger, rx) = AuditLogger::channel(1);
        logger.record(None, AuditAction::Login, EntityType::Employee, None, json!({}), &origin());
        logger.record(None, AuditAction::Login, EntityType::Employee, None, json!({}), &origin());

        drop(rx);
        logger.record(None, AuditAction::Login, EntityType::Employee, None, json!({}), &origin());
    }
}
