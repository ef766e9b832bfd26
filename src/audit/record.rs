//! Audit record types

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Kind of mutation an audit record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    /// A governance gate decision
    Decision,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::Decision => "decision",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(AuditAction::Create),
            "update" => Ok(AuditAction::Update),
            "delete" => Ok(AuditAction::Delete),
            "decision" => Ok(AuditAction::Decision),
            other => Err(format!("unknown audit action '{}'", other)),
        }
    }
}

/// Request to append one audit record
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewAuditRecord {
    pub action: AuditAction,
    #[validate(length(min = 1, max = 128, message = "table_name must be 1-128 characters"))]
    pub table_name: String,
    #[validate(length(min = 1, max = 128, message = "record_id must be 1-128 characters"))]
    pub record_id: String,
    #[validate(length(min = 1, max = 128, message = "actor_id must be 1-128 characters"))]
    pub actor_id: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

/// One immutable audit trail entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub action: AuditAction,
    pub table_name: String,
    pub record_id: String,
    pub actor_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub retained_until: DateTime<Utc>,
}

impl AuditRecord {
    /// Stamp a validated request with an id and retention window
    pub fn from_new(new: NewAuditRecord, retention_years: u32) -> Self {
        let created_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            action: new.action,
            table_name: new.table_name,
            record_id: new.record_id,
            actor_id: new.actor_id,
            details: new.details,
            created_at,
            retained_until: retention_deadline(created_at, retention_years),
        }
    }
}

pub fn retention_deadline(created_at: DateTime<Utc>, retention_years: u32) -> DateTime<Utc> {
    created_at
        .checked_add_months(Months::new(retention_years.saturating_mul(12)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Requested change to an existing record; always refused by the guard
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditPatch {
    pub action: Option<AuditAction>,
    pub table_name: Option<String>,
    pub record_id: Option<String>,
    pub actor_id: Option<String>,
}

/// Query filter for listing records
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
    pub table_name: Option<String>,
    pub record_id: Option<String>,
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub fn matches(&self, record: &AuditRecord) -> bool {
        self.table_name.as_deref().map_or(true, |t| t == record.table_name)
            && self.record_id.as_deref().map_or(true, |r| r == record.record_id)
    }
}
