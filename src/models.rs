//! HTTP request and response bodies

use crate::history::Revision;
use crate::pipeline::{GovernanceRun, RunContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Standard success envelope
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn with_data(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

/// One row of the revision listing
#[derive(Debug, Serialize)]
pub struct RevisionSummary {
    pub id: String,
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub operations: Vec<String>,
    pub legacy: bool,
    pub breaking_ok: bool,
    pub irreversible: bool,
}

impl From<&Revision> for RevisionSummary {
    fn from(revision: &Revision) -> Self {
        Self {
            id: revision.id.clone(),
            parent_id: revision.parent_id.clone(),
            message: revision.message.clone(),
            operations: revision.upgrade.iter().map(|op| op.description()).collect(),
            legacy: revision.legacy,
            breaking_ok: revision.breaking_ok,
            irreversible: revision.is_irreversible(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RevisionListResponse {
    pub tip: Option<String>,
    pub revisions: Vec<RevisionSummary>,
}

/// Body of `POST /api/governance/runs`
#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub branch: String,
    pub policy_env: String,
    #[serde(default = "default_enforce")]
    pub enforce: bool,
    #[serde(default)]
    pub overrides: BTreeSet<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub current: Option<String>,
    /// Append every decision to the audit trail under this actor
    #[serde(default)]
    pub record_as: Option<String>,
}

fn default_enforce() -> bool {
    true
}

impl RunRequest {
    pub fn context(&self) -> RunContext {
        RunContext {
            branch: self.branch.clone(),
            policy_env: self.policy_env.clone(),
            enforce: self.enforce,
            overrides: self.overrides.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            current: self.current.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub run: GovernanceRun,
    pub blocked: usize,
    pub review_required: usize,
    pub fails: bool,
    pub recorded: usize,
}

#[derive(Debug, Serialize)]
pub struct ScoreResponse {
    pub score: u64,
    pub decisions: usize,
}

#[derive(Debug, Deserialize)]
pub struct DriftQuery {
    /// Applied marker; defaults to the chain tip
    pub current: Option<String>,
}
