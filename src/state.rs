//! Application state management
//!
//! Shared state for the HTTP surface. Governance runs read a snapshot of the
//! history taken under the read lock, so chain reloads never reach an
//! in-flight run.

use crate::audit::{AuditStore, MemoryAuditStore, PgAuditStore};
use crate::config::{PolicyConfig, Settings};
use crate::drift::SchemaModel;
use crate::error::GovernanceResult;
use crate::history::{MigrationHistory, RevisionStore};
use crate::pipeline::GovernanceRun;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Application state shared across all handlers
pub struct AppState {
    /// Category tables, weights and production tiers
    pub policy: PolicyConfig,

    /// Source of the revision chain
    pub revisions: RevisionStore,

    /// Loaded chain; replaced wholesale on reload
    pub history: RwLock<MigrationHistory>,

    /// Declared data model used by the drift endpoint
    pub declared: Option<SchemaModel>,

    /// Append-only audit trail
    pub audit: Arc<dyn AuditStore>,

    /// Most recent completed run, served to dashboard queries
    pub latest_run: RwLock<Option<GovernanceRun>>,
}

impl AppState {
    pub fn new(
        settings: &Settings,
        policy: PolicyConfig,
        history: MigrationHistory,
        declared: Option<SchemaModel>,
        audit: Arc<dyn AuditStore>,
    ) -> Self {
        let revisions = RevisionStore::new(settings.paths.revisions_dir.clone());
        Self {
            policy,
            revisions,
            history: RwLock::new(history),
            declared,
            audit,
            latest_run: RwLock::new(None),
        }
    }

    /// Build state from settings: policy file, revision store, declared model, audit engine
    pub async fn bootstrap(settings: &Settings) -> GovernanceResult<Self> {
        let policy = PolicyConfig::load(&settings.paths.policy_file)
            .map_err(|e| crate::error::GovernanceError::Config(e.to_string()))?;
        let history = RevisionStore::new(settings.paths.revisions_dir.clone()).load()?;
        if history.is_empty() {
            warn!(
                "⚠️  No revisions found in {}, governance runs will be empty",
                settings.paths.revisions_dir.display()
            );
        }

        let declared = match &settings.paths.declared_model {
            Some(path) => Some(SchemaModel::load(path)?),
            None => {
                warn!("⚠️  DECLARED_MODEL not set, drift endpoint disabled");
                None
            }
        };

        let audit: Arc<dyn AuditStore> = match &settings.audit.database_url {
            Some(url) => {
                let pool = crate::audit::postgres::connect_pool(url, settings.audit.max_pool_size).await?;
                let store = PgAuditStore::new(pool, settings.audit.retention_years);
                store.install_guard().await?;
                Arc::new(store)
            }
            None => {
                warn!("⚠️  AUDIT_DATABASE_URL not set, audit trail kept in memory only");
                Arc::new(MemoryAuditStore::new(settings.audit.retention_years))
            }
        };
        info!("🛡️  Audit engine: {}", audit.engine());

        Ok(Self::new(settings, policy, history, declared, audit))
    }

    /// Immutable copy of the chain for one run
    pub async fn snapshot(&self) -> MigrationHistory {
        self.history.read().await.clone()
    }

    /// Re-read the revision store, keeping the old chain on error
    pub async fn reload_history(&self) -> GovernanceResult<usize> {
        let reloaded = self.revisions.load()?;
        let count = reloaded.len();
        *self.history.write().await = reloaded;
        Ok(count)
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
