//! Types for the governance pipeline
//!
//! `GovernanceRun` is the hand-off document between the policy gate and every
//! reporting consumer.

use crate::error::{GovernanceError, GovernanceResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// Nature of a schema change, in ascending severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeCategory {
    #[serde(alias = "data")]
    Data,
    #[serde(alias = "structural")]
    Structural,
    #[serde(alias = "relational")]
    Relational,
    #[serde(alias = "topological")]
    Topological,
}

impl ChangeCategory {
    pub const ALL: [ChangeCategory; 4] = [
        ChangeCategory::Data,
        ChangeCategory::Structural,
        ChangeCategory::Relational,
        ChangeCategory::Topological,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeCategory::Data => "DATA",
            ChangeCategory::Structural => "STRUCTURAL",
            ChangeCategory::Relational => "RELATIONAL",
            ChangeCategory::Topological => "TOPOLOGICAL",
        }
    }
}

impl fmt::Display for ChangeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk tier, totally ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    #[serde(alias = "low")]
    Low,
    #[serde(alias = "medium")]
    Medium,
    #[serde(alias = "high")]
    High,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 3] = [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }

    /// One tier up, saturating at HIGH
    pub fn escalate(self) -> Self {
        match self {
            RiskLevel::Low => RiskLevel::Medium,
            RiskLevel::Medium | RiskLevel::High => RiskLevel::High,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier output for one revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub categories: BTreeSet<ChangeCategory>,
    pub base_risk: RiskLevel,
    pub irreversible: bool,
}

/// A classified revision together with its chain-derived flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedRevision {
    pub id: String,
    pub classification: Classification,
    pub legacy: bool,
    /// Author-declared breaking-change permission
    pub breaking_ok: bool,
}

/// Deployment context for one governance run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunContext {
    pub branch: String,
    pub policy_env: String,
    #[serde(default = "default_enforce")]
    pub enforce: bool,
    /// Revision ids with an operator override for breaking changes
    #[serde(default)]
    pub overrides: BTreeSet<String>,
    /// Exclusive lower bound of the pending range
    #[serde(default)]
    pub from: Option<String>,
    /// Inclusive upper bound of the pending range
    #[serde(default)]
    pub to: Option<String>,
    /// Applied marker used to resolve `current` references
    #[serde(default)]
    pub current: Option<String>,
}

fn default_enforce() -> bool {
    true
}

impl RunContext {
    pub fn new(branch: impl Into<String>, policy_env: impl Into<String>, enforce: bool) -> Self {
        Self {
            branch: branch.into(),
            policy_env: policy_env.into(),
            enforce,
            ..Default::default()
        }
    }
}

/// Policy gate verdict for one revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub migration: String,
    pub risk_level: RiskLevel,
    pub categories: BTreeSet<ChangeCategory>,
    pub legacy: bool,
    pub breaking_ok: bool,
    pub allowed: bool,
    /// MEDIUM in a production-tier environment
    #[serde(default)]
    pub review_required: bool,
    #[serde(default)]
    pub irreversible: bool,
}

/// Output of one governance evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceRun {
    pub branch: String,
    pub policy_env: String,
    pub enforce: bool,
    pub decisions: Vec<Decision>,
    /// Revision ids the run was asked to decide, in chain order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope: Vec<String>,
}

impl GovernanceRun {
    pub fn blocked_count(&self) -> usize {
        self.decisions.iter().filter(|d| !d.allowed).count()
    }

    pub fn review_count(&self) -> usize {
        self.decisions.iter().filter(|d| d.review_required).count()
    }

    /// Enforced runs fail on any block; advisory runs never fail
    pub fn fails(&self) -> bool {
        self.enforce && self.blocked_count() > 0
    }

    /// Every scoped revision reached a decision, exactly once
    pub fn ensure_complete(&self) -> GovernanceResult<()> {
        let mut seen = HashSet::new();
        for decision in &self.decisions {
            if !seen.insert(decision.migration.as_str()) {
                return Err(GovernanceError::IncompleteRun(format!(
                    "revision {} decided more than once",
                    decision.migration
                )));
            }
            if decision.categories.is_empty() {
                return Err(GovernanceError::IncompleteRun(format!(
                    "revision {} was never classified",
                    decision.migration
                )));
            }
        }

        if !self.scope.is_empty() {
            let decided: Vec<&str> = self.decisions.iter().map(|d| d.migration.as_str()).collect();
            let scoped: Vec<&str> = self.scope.iter().map(String::as_str).collect();
            if decided != scoped {
                let missing: Vec<&str> = scoped.iter().copied().filter(|id| !seen.contains(id)).collect();
                return Err(GovernanceError::IncompleteRun(if missing.is_empty() {
                    "decisions do not follow chain order".to_string()
                } else {
                    format!("no decision for {}", missing.join(", "))
                }));
            }
        }

        Ok(())
    }
}
