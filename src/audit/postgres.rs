//! PostgreSQL audit engine
//!
//! Immutability is enforced by the database itself: row triggers reject
//! UPDATE and DELETE, a statement trigger rejects TRUNCATE, and both raise
//! SQLSTATE `AUD01`. Application code that bypasses this module and writes to
//! `audit_log` directly hits the same triggers.

use crate::audit::record::{retention_deadline, AuditFilter, AuditPatch, AuditRecord, NewAuditRecord};
use crate::audit::{validate_new, AuditStore};
use crate::error::{GovernanceError, GovernanceResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;
use tracing::{info, warn};
use uuid::Uuid;

/// SQLSTATE raised by the immutability triggers
pub const IMMUTABLE_SQLSTATE: &str = "AUD01";

/// Table, trigger function and triggers; safe to run repeatedly
pub const GUARD_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS audit_log (
    seq            BIGSERIAL UNIQUE,
    id             UUID PRIMARY KEY,
    action         TEXT NOT NULL,
    table_name     TEXT NOT NULL CHECK (length(table_name) BETWEEN 1 AND 128),
    record_id      TEXT NOT NULL CHECK (length(record_id) BETWEEN 1 AND 128),
    actor_id       TEXT NOT NULL CHECK (length(actor_id) BETWEEN 1 AND 128),
    details        JSONB,
    created_at     TIMESTAMPTZ NOT NULL,
    retained_until TIMESTAMPTZ NOT NULL
);

CREATE OR REPLACE FUNCTION audit_log_reject_mutation() RETURNS trigger AS $$
BEGIN
    RAISE EXCEPTION 'audit_log is append-only: % rejected', TG_OP
        USING ERRCODE = 'AUD01';
END;
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS audit_log_no_update_delete ON audit_log;
CREATE TRIGGER audit_log_no_update_delete
    BEFORE UPDATE OR DELETE ON audit_log
    FOR EACH ROW EXECUTE FUNCTION audit_log_reject_mutation();

DROP TRIGGER IF EXISTS audit_log_no_truncate ON audit_log;
CREATE TRIGGER audit_log_no_truncate
    BEFORE TRUNCATE ON audit_log
    FOR EACH STATEMENT EXECUTE FUNCTION audit_log_reject_mutation();
"#;

const SELECT_COLUMNS: &str =
    "id, action, table_name, record_id, actor_id, details, created_at, retained_until";

/// Build a connection pool; TLS via rustls when the URL asks for `sslmode=require`
pub async fn connect_pool(database_url: &str, max_size: usize) -> GovernanceResult<Pool> {
    let parsed = database_url
        .parse::<tokio_postgres::Config>()
        .map_err(|e| GovernanceError::Config(format!("Failed to parse AUDIT_DATABASE_URL: {}", e)))?;

    let host = match parsed.get_hosts().first() {
        Some(tokio_postgres::config::Host::Tcp(host)) => host.clone(),
        Some(_) => {
            return Err(GovernanceError::Config(
                "Unix socket connections are not supported".to_string(),
            ))
        }
        None => return Err(GovernanceError::Config("No host in AUDIT_DATABASE_URL".to_string())),
    };

    let mut cfg = Config::new();
    cfg.host = Some(host);
    cfg.port = Some(parsed.get_ports().first().copied().unwrap_or(5432));
    cfg.user = parsed.get_user().map(str::to_string);
    cfg.password = parsed
        .get_password()
        .map(|p| String::from_utf8_lossy(p).to_string());
    cfg.dbname = parsed.get_dbname().map(str::to_string);
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig::new(max_size));

    let use_tls = database_url.contains("sslmode=require");
    let pool = if use_tls {
        let certs = rustls_native_certs::load_native_certs();
        let mut root_store = rustls::RootCertStore::empty();
        for cert in certs.certs {
            root_store.add(cert).ok();
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

        cfg.create_pool(Some(Runtime::Tokio1), tls)
            .map_err(|e| GovernanceError::Config(format!("Failed to create TLS pool: {}", e)))?
    } else {
        cfg.create_pool(Some(Runtime::Tokio1), tokio_postgres::NoTls)
            .map_err(|e| GovernanceError::Config(format!("Failed to create pool: {}", e)))?
    };

    // Fail fast on bad credentials
    let client = pool.get().await?;
    client.simple_query("SELECT 1").await?;
    info!("🐘 Audit database pool ready (max {} connections, tls={})", max_size, use_tls);

    Ok(pool)
}

fn insert_query() -> String {
    format!(
        "INSERT INTO audit_log ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
        SELECT_COLUMNS, SELECT_COLUMNS
    )
}

/// Owned bind values for one INSERT; ids and timestamps are assigned here
struct InsertParams<'a> {
    id: Uuid,
    action: &'static str,
    record: &'a NewAuditRecord,
    created_at: DateTime<Utc>,
    retained_until: DateTime<Utc>,
}

impl InsertParams<'_> {
    fn as_refs(&self) -> [&(dyn ToSql + Sync); 8] {
        [
            &self.id,
            &self.action,
            &self.record.table_name,
            &self.record.record_id,
            &self.record.actor_id,
            &self.record.details,
            &self.created_at,
            &self.retained_until,
        ]
    }
}

fn insert_params(record: &NewAuditRecord, retention_years: u32) -> InsertParams<'_> {
    let created_at = Utc::now();
    InsertParams {
        id: Uuid::new_v4(),
        action: record.action.as_str(),
        record,
        created_at,
        retained_until: retention_deadline(created_at, retention_years),
    }
}

fn is_guard_rejection(code: Option<&SqlState>) -> bool {
    code.map(|c| c.code() == IMMUTABLE_SQLSTATE).unwrap_or(false)
}

fn row_to_record(row: &Row) -> GovernanceResult<AuditRecord> {
    let action: String = row.try_get("action")?;
    Ok(AuditRecord {
        id: row.try_get("id")?,
        action: action
            .parse()
            .map_err(|e: String| GovernanceError::Validation(format!("corrupt audit row: {}", e)))?,
        table_name: row.try_get("table_name")?,
        record_id: row.try_get("record_id")?,
        actor_id: row.try_get("actor_id")?,
        details: row.try_get("details")?,
        created_at: row.try_get("created_at")?,
        retained_until: row.try_get("retained_until")?,
    })
}

/// Audit trail stored in PostgreSQL behind immutability triggers
pub struct PgAuditStore {
    pool: Pool,
    retention_years: u32,
}

impl PgAuditStore {
    pub fn new(pool: Pool, retention_years: u32) -> Self {
        Self {
            pool,
            retention_years,
        }
    }

    /// Create the audit table and its triggers
    pub async fn install_guard(&self) -> GovernanceResult<()> {
        let client = self.pool.get().await?;
        client.batch_execute(GUARD_DDL).await?;
        info!("🛡️  Audit immutability triggers installed");
        Ok(())
    }

    fn map_mutation_error(id: Uuid, operation: &'static str, err: tokio_postgres::Error) -> GovernanceError {
        if is_guard_rejection(err.code()) {
            warn!("🛡️  Database refused to {} audit record {}", operation, id);
            GovernanceError::ImmutabilityViolation {
                record_id: id,
                operation: if operation == "update" { "updated" } else { "deleted" },
            }
        } else {
            GovernanceError::Database(err)
        }
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    fn engine(&self) -> &'static str {
        "postgres"
    }

    async fn append(&self, record: NewAuditRecord) -> GovernanceResult<AuditRecord> {
        validate_new(&record)?;
        let client = self.pool.get().await?;
        let row = client
            .query_one(&insert_query(), &insert_params(&record, self.retention_years).as_refs())
            .await?;

        row_to_record(&row)
    }

    async fn append_batch(&self, records: Vec<NewAuditRecord>) -> GovernanceResult<Vec<AuditRecord>> {
        for record in &records {
            validate_new(record)?;
        }

        let mut client = self.pool.get().await?;
        let transaction = client.transaction().await?;
        let statement = transaction.prepare(&insert_query()).await?;

        let mut appended = Vec::with_capacity(records.len());
        for record in &records {
            // an error drops the transaction, which rolls back every earlier insert
            let row = transaction
                .query_one(&statement, &insert_params(record, self.retention_years).as_refs())
                .await?;
            appended.push(row_to_record(&row)?);
        }
        transaction.commit().await?;

        info!("📝 Audit batch of {} record(s) committed", appended.len());
        Ok(appended)
    }

    async fn get(&self, id: Uuid) -> GovernanceResult<AuditRecord> {
        let client = self.pool.get().await?;
        let query = format!("SELECT {} FROM audit_log WHERE id = $1", SELECT_COLUMNS);
        let row = client
            .query_opt(&query, &[&id])
            .await?
            .ok_or_else(|| GovernanceError::NotFound(format!("audit record {}", id)))?;

        row_to_record(&row)
    }

    async fn list(&self, filter: &AuditFilter) -> GovernanceResult<Vec<AuditRecord>> {
        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {} FROM audit_log \
             WHERE ($1::text IS NULL OR table_name = $1) \
               AND ($2::text IS NULL OR record_id = $2) \
             ORDER BY seq LIMIT $3",
            SELECT_COLUMNS
        );
        let limit = filter.limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX));
        let rows = client
            .query(&query, &[&filter.table_name, &filter.record_id, &limit])
            .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn update(&self, id: Uuid, patch: AuditPatch) -> GovernanceResult<AuditRecord> {
        // Issued as a real UPDATE so the trigger, not this code, decides
        let client = self.pool.get().await?;
        let query = format!(
            "UPDATE audit_log SET \
                action = COALESCE($2, action), \
                table_name = COALESCE($3, table_name), \
                record_id = COALESCE($4, record_id), \
                actor_id = COALESCE($5, actor_id) \
             WHERE id = $1 RETURNING {}",
            SELECT_COLUMNS
        );
        let action = patch.action.map(|a| a.as_str());
        let row = client
            .query_opt(
                &query,
                &[&id, &action, &patch.table_name, &patch.record_id, &patch.actor_id],
            )
            .await
            .map_err(|e| Self::map_mutation_error(id, "update", e))?
            .ok_or_else(|| GovernanceError::NotFound(format!("audit record {}", id)))?;

        row_to_record(&row)
    }

    async fn delete(&self, id: Uuid) -> GovernanceResult<()> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute("DELETE FROM audit_log WHERE id = $1", &[&id])
            .await
            .map_err(|e| Self::map_mutation_error(id, "delete", e))?;

        if deleted == 0 {
            return Err(GovernanceError::NotFound(format!("audit record {}", id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_ddl_covers_every_mutation_path() {
        assert!(GUARD_DDL.contains("BEFORE UPDATE OR DELETE ON audit_log"));
        assert!(GUARD_DDL.contains("FOR EACH ROW"));
        assert!(GUARD_DDL.contains("BEFORE TRUNCATE ON audit_log"));
        assert!(GUARD_DDL.contains(&format!("ERRCODE = '{}'", IMMUTABLE_SQLSTATE)));
    }

    #[test]
    fn test_only_guard_sqlstate_is_a_violation() {
        let guard = SqlState::from_code(IMMUTABLE_SQLSTATE);
        assert!(is_guard_rejection(Some(&guard)));
        assert!(!is_guard_rejection(Some(&SqlState::UNIQUE_VIOLATION)));
        assert!(!is_guard_rejection(None));
    }

    #[tokio::test]
    async fn test_socket_urls_are_rejected() {
        let err = connect_pool("host=/var/run/postgresql dbname=records", 4)
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::Config(_)));
    }
}
