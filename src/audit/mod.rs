//! Audit Immutability Guard
//!
//! The audit trail is append-only at the storage boundary. Every engine
//! rejects modification or removal of an existing record with
//! `ImmutabilityViolation` before the write lands; inserts always proceed
//! subject to validation, and reads are unrestricted.

pub mod memory;
pub mod postgres;
pub mod record;

pub use memory::MemoryAuditStore;
pub use postgres::PgAuditStore;
pub use record::{AuditAction, AuditFilter, AuditPatch, AuditRecord, NewAuditRecord};

use crate::error::{GovernanceError, GovernanceResult};
use async_trait::async_trait;
use uuid::Uuid;
use validator::Validate;

/// Storage engine for the audit trail
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Short engine name for logs and health output
    fn engine(&self) -> &'static str;

    async fn append(&self, record: NewAuditRecord) -> GovernanceResult<AuditRecord>;

    /// All records land or none do
    async fn append_batch(&self, records: Vec<NewAuditRecord>) -> GovernanceResult<Vec<AuditRecord>>;

    async fn get(&self, id: Uuid) -> GovernanceResult<AuditRecord>;

    /// Records in insertion order
    async fn list(&self, filter: &AuditFilter) -> GovernanceResult<Vec<AuditRecord>>;

    /// Never succeeds for an existing record
    async fn update(&self, id: Uuid, patch: AuditPatch) -> GovernanceResult<AuditRecord>;

    /// Never succeeds for an existing record
    async fn delete(&self, id: Uuid) -> GovernanceResult<()>;
}

/// Constraint checks shared by every engine
pub(crate) fn validate_new(record: &NewAuditRecord) -> GovernanceResult<()> {
    record
        .validate()
        .map_err(|e| GovernanceError::Validation(e.to_string()))
}
