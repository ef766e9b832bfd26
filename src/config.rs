//! Application configuration module
//!
//! Runtime settings come from environment variables. Governance policy (the
//! category tables, score weights and production tiers) comes from an optional
//! policy file with `GOVERNANCE__*` overrides, falling back to built-in defaults.

use crate::history::OperationKind;
use crate::pipeline::{ChangeCategory, RiskLevel};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::ParseError(e.to_string())
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0),
            port: 3000,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3001".to_string()],
        }
    }
}

/// Audit trail storage configuration
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// PostgreSQL URL; the in-memory engine is used when absent
    pub database_url: Option<String>,
    pub max_pool_size: usize,
    pub retention_years: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_pool_size: 10,
            retention_years: 7,
        }
    }
}

/// Where governance inputs live
#[derive(Debug, Clone)]
pub struct GovernancePaths {
    pub revisions_dir: PathBuf,
    pub declared_model: Option<PathBuf>,
    pub policy_file: PathBuf,
}

impl Default for GovernancePaths {
    fn default() -> Self {
        Self {
            revisions_dir: PathBuf::from("migrations/revisions"),
            declared_model: None,
            policy_file: PathBuf::from("governance.toml"),
        }
    }
}

/// Complete application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub audit: AuditConfig,
    pub paths: GovernancePaths,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();

        let server = ServerConfig {
            host: std::env::var("HOST")
                .ok()
                .and_then(|h| h.parse().ok())
                .unwrap_or_else(|| ServerConfig::default().host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or_else(|| ServerConfig::default().port),
        };

        let cors = CorsConfig {
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|| CorsConfig::default().allowed_origins),
        };

        let database_url = match std::env::var("AUDIT_DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => Some(Self::validate_database_url(url.trim())?),
            _ => None,
        };

        let audit = AuditConfig {
            database_url,
            max_pool_size: std::env::var("AUDIT_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            retention_years: std::env::var("AUDIT_RETENTION_YEARS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(7),
        };

        let defaults = GovernancePaths::default();
        let paths = GovernancePaths {
            revisions_dir: std::env::var("REVISIONS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.revisions_dir),
            declared_model: std::env::var("DECLARED_MODEL").ok().map(PathBuf::from),
            policy_file: std::env::var("POLICY_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.policy_file),
        };

        Ok(Self {
            server,
            cors,
            audit,
            paths,
        })
    }

    /// Check a DATABASE_URL-style connection string (postgresql://...)
    fn validate_database_url(raw: &str) -> Result<String, ConfigError> {
        let parsed = url::Url::parse(raw).map_err(|_| {
            ConfigError::InvalidValue(
                "Invalid AUDIT_DATABASE_URL format (expected postgresql://...)".to_string(),
            )
        })?;

        if !matches!(parsed.scheme(), "postgres" | "postgresql") {
            return Err(ConfigError::InvalidValue(format!(
                "Unsupported AUDIT_DATABASE_URL scheme: {}",
                parsed.scheme()
            )));
        }
        if parsed.host_str().is_none() {
            return Err(ConfigError::InvalidValue(
                "Missing host in AUDIT_DATABASE_URL".to_string(),
            ));
        }
        if parsed.path().trim_start_matches('/').is_empty() {
            return Err(ConfigError::InvalidValue(
                "Missing database name in AUDIT_DATABASE_URL".to_string(),
            ));
        }

        Ok(raw.to_string())
    }
}

/// Governance policy tables
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Operation kind -> categories it carries
    pub operation_categories: BTreeMap<OperationKind, BTreeSet<ChangeCategory>>,
    /// Category -> risk tier before escalation
    pub category_risk: BTreeMap<ChangeCategory, RiskLevel>,
    /// Category -> stability score weight
    pub category_weights: BTreeMap<ChangeCategory, u32>,
    /// Score added per HIGH decision
    pub high_risk_penalty: u32,
    /// Environments treated as production tier (case-insensitive)
    pub production_envs: Vec<String>,
    /// Revisions before this one in chain order are grandfathered as legacy
    pub legacy_before: Option<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        use ChangeCategory::*;
        use OperationKind as Op;

        let categories = |cats: &[ChangeCategory]| cats.iter().copied().collect::<BTreeSet<_>>();
        let operation_categories = [
            (Op::CreateTable, categories(&[Structural])),
            (Op::DropTable, categories(&[Structural])),
            (Op::AddColumn, categories(&[Structural])),
            (Op::DropColumn, categories(&[Structural])),
            (Op::AlterColumnType, categories(&[Structural])),
            (Op::AlterNullable, categories(&[Structural])),
            (Op::AddIndex, categories(&[Structural])),
            (Op::DropIndex, categories(&[Structural])),
            (Op::AddForeignKey, categories(&[Relational])),
            (Op::DropForeignKey, categories(&[Relational])),
            (Op::CreateEnum, categories(&[Topological])),
            (Op::AlterEnum, categories(&[Topological])),
            (Op::DropEnum, categories(&[Topological])),
            (Op::CreateTrigger, categories(&[Topological])),
            (Op::DropTrigger, categories(&[Topological])),
            (Op::AlterDefault, categories(&[Data])),
            (Op::Backfill, categories(&[Data])),
        ]
        .into_iter()
        .collect();

        Self {
            operation_categories,
            category_risk: [
                (Data, RiskLevel::Low),
                (Structural, RiskLevel::Low),
                (Relational, RiskLevel::Medium),
                (Topological, RiskLevel::Medium),
            ]
            .into_iter()
            .collect(),
            category_weights: [(Data, 1), (Structural, 3), (Relational, 5), (Topological, 8)]
                .into_iter()
                .collect(),
            high_risk_penalty: 10,
            production_envs: vec!["production".to_string(), "prod".to_string()],
            legacy_before: None,
        }
    }
}

impl PolicyConfig {
    /// Load from an optional policy file plus `GOVERNANCE__*` environment overrides
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("GOVERNANCE")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("production_envs")
                    .try_parsing(true),
            )
            .build()?;

        let policy: PolicyConfig = settings.try_deserialize()?;
        policy.validate()?;
        Ok(policy)
    }

    /// Every operation kind maps somewhere and every category has a risk and weight
    pub fn validate(&self) -> Result<(), ConfigError> {
        for kind in OperationKind::ALL {
            match self.operation_categories.get(&kind) {
                Some(categories) if !categories.is_empty() => {}
                _ => {
                    return Err(ConfigError::InvalidValue(format!(
                        "operation '{}' has no category mapping",
                        kind
                    )))
                }
            }
        }

        for category in ChangeCategory::ALL {
            if !self.category_risk.contains_key(&category) {
                return Err(ConfigError::InvalidValue(format!(
                    "category {} has no risk tier",
                    category
                )));
            }
            if !self.category_weights.contains_key(&category) {
                return Err(ConfigError::InvalidValue(format!(
                    "category {} has no score weight",
                    category
                )));
            }
        }

        if self.production_envs.is_empty() {
            return Err(ConfigError::InvalidValue(
                "production_envs must name at least one environment".to_string(),
            ));
        }

        Ok(())
    }

    pub fn is_production(&self, policy_env: &str) -> bool {
        self.production_envs
            .iter()
            .any(|env| env.eq_ignore_ascii_case(policy_env.trim()))
    }
}
