//! In-memory audit engine

use crate::audit::record::{AuditFilter, AuditPatch, AuditRecord, NewAuditRecord};
use crate::audit::{validate_new, AuditStore};
use crate::error::{GovernanceError, GovernanceResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Default)]
struct Ledger {
    records: HashMap<Uuid, AuditRecord>,
    /// Insertion order
    order: Vec<Uuid>,
}

/// Append-only audit trail held in process memory
pub struct MemoryAuditStore {
    ledger: Arc<RwLock<Ledger>>,
    retention_years: u32,
}

impl MemoryAuditStore {
    pub fn new(retention_years: u32) -> Self {
        Self {
            ledger: Arc::new(RwLock::new(Ledger::default())),
            retention_years,
        }
    }

    /// Shared guard for update and delete: refuse existing rows, 404 the rest
    async fn refuse_mutation(&self, id: Uuid, operation: &'static str) -> GovernanceError {
        let ledger = self.ledger.read().await;
        if ledger.records.contains_key(&id) {
            warn!("🛡️  Refused to {} audit record {}", operation, id);
            GovernanceError::ImmutabilityViolation {
                record_id: id,
                operation: if operation == "update" { "updated" } else { "deleted" },
            }
        } else {
            GovernanceError::NotFound(format!("audit record {}", id))
        }
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    fn engine(&self) -> &'static str {
        "memory"
    }

    async fn append(&self, record: NewAuditRecord) -> GovernanceResult<AuditRecord> {
        validate_new(&record)?;
        let record = AuditRecord::from_new(record, self.retention_years);

        let mut ledger = self.ledger.write().await;
        ledger.order.push(record.id);
        ledger.records.insert(record.id, record.clone());
        debug!(
            "Audit {} on {}/{} by {}",
            record.action, record.table_name, record.record_id, record.actor_id
        );
        Ok(record)
    }

    async fn append_batch(&self, records: Vec<NewAuditRecord>) -> GovernanceResult<Vec<AuditRecord>> {
        for record in &records {
            validate_new(record)?;
        }
        let records: Vec<AuditRecord> = records
            .into_iter()
            .map(|record| AuditRecord::from_new(record, self.retention_years))
            .collect();

        let mut ledger = self.ledger.write().await;
        for record in &records {
            ledger.order.push(record.id);
            ledger.records.insert(record.id, record.clone());
        }
        debug!("Audit batch of {} record(s) appended", records.len());
        Ok(records)
    }

    async fn get(&self, id: Uuid) -> GovernanceResult<AuditRecord> {
        let ledger = self.ledger.read().await;
        ledger
            .records
            .get(&id)
            .cloned()
            .ok_or_else(|| GovernanceError::NotFound(format!("audit record {}", id)))
    }

    async fn list(&self, filter: &AuditFilter) -> GovernanceResult<Vec<AuditRecord>> {
        let ledger = self.ledger.read().await;
        let records = ledger
            .order
            .iter()
            .filter_map(|id| ledger.records.get(id))
            .filter(|record| filter.matches(record))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(records)
    }

    async fn update(&self, id: Uuid, _patch: AuditPatch) -> GovernanceResult<AuditRecord> {
        Err(self.refuse_mutation(id, "update").await)
    }

    async fn delete(&self, id: Uuid) -> GovernanceResult<()> {
        Err(self.refuse_mutation(id, "delete").await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditAction;
    use pretty_assertions::assert_eq;

    fn new_record(table: &str, record_id: &str) -> NewAuditRecord {
        NewAuditRecord {
            action: AuditAction::Create,
            table_name: table.to_string(),
            record_id: record_id.to_string(),
            actor_id: "registrar".to_string(),
            details: None,
        }
    }

    #[tokio::test]
    async fn test_existing_record_cannot_be_changed_or_removed() {
        let store = MemoryAuditStore::new(7);
        let record = store.append(new_record("students", "1")).await.unwrap();

        let update = store
            .update(
                record.id,
                AuditPatch {
                    actor_id: Some("intruder".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(update, Err(GovernanceError::ImmutabilityViolation { .. })));

        let delete = store.delete(record.id).await;
        assert!(matches!(delete, Err(GovernanceError::ImmutabilityViolation { .. })));

        // nothing changed, and later inserts still succeed
        assert_eq!(store.get(record.id).await.unwrap(), record);
        assert!(store.append(new_record("grants", "9")).await.is_ok());
        assert_eq!(store.list(&AuditFilter::default()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_record_is_not_found() {
        let store = MemoryAuditStore::new(7);
        let missing = Uuid::new_v4();

        assert!(matches!(store.get(missing).await, Err(GovernanceError::NotFound(_))));
        assert!(matches!(store.delete(missing).await, Err(GovernanceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_invalid_record_is_rejected() {
        let store = MemoryAuditStore::new(7);
        let err = store.append(new_record("", "1")).await.unwrap_err();

        assert!(matches!(err, GovernanceError::Validation(_)));
        assert!(store.list(&AuditFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_filters_in_insertion_order() {
        let store = MemoryAuditStore::new(7);
        for id in ["1", "2", "3"] {
            store.append(new_record("students", id)).await.unwrap();
        }
        store.append(new_record("grants", "1")).await.unwrap();

        let filter = AuditFilter {
            table_name: Some("students".to_string()),
            limit: Some(2),
            ..Default::default()
        };
        let ids: Vec<String> = store
            .list(&filter)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.record_id)
            .collect();
        assert_eq!(ids, vec!["1".to_string(), "2".to_string()]);
    }

    #[tokio::test]
    async fn test_batch_with_invalid_row_appends_nothing() {
        let store = MemoryAuditStore::new(7);
        let batch = vec![
            new_record("students", "1"),
            new_record("students", ""),
            new_record("students", "3"),
        ];

        let err = store.append_batch(batch).await.unwrap_err();
        assert!(matches!(err, GovernanceError::Validation(_)));
        assert!(store.list(&AuditFilter::default()).await.unwrap().is_empty());

        let landed = store
            .append_batch(vec![new_record("grants", "1"), new_record("grants", "2")])
            .await
            .unwrap();
        let listed = store.list(&AuditFilter::default()).await.unwrap();
        assert_eq!(listed, landed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_all_land() {
        let store = Arc::new(MemoryAuditStore::new(7));

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.append(new_record("cohorts", &i.to_string())).await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.list(&AuditFilter::default()).await.unwrap().len(), 32);
    }
}
