//! Compliance Reporting Module
//!
//! Read-only consumers of a `GovernanceRun`: a Markdown dashboard, a numeric
//! stability score and a plain-text summary for compliance reviewers.
//! Every renderer refuses a run that did not decide every revision in scope.

pub mod dashboard;
pub mod score;
pub mod summary;

pub use dashboard::render_dashboard;
pub use score::StabilityScorer;
pub use summary::render_summary;

use crate::pipeline::{ChangeCategory, GovernanceRun, RiskLevel};
use std::collections::BTreeMap;

/// Per-tier and per-category counts, with every key present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTally {
    pub by_risk: BTreeMap<RiskLevel, usize>,
    pub by_category: BTreeMap<ChangeCategory, usize>,
}

impl RunTally {
    pub fn from_run(run: &GovernanceRun) -> Self {
        let mut by_risk: BTreeMap<RiskLevel, usize> = RiskLevel::ALL.iter().map(|r| (*r, 0)).collect();
        let mut by_category: BTreeMap<ChangeCategory, usize> =
            ChangeCategory::ALL.iter().map(|c| (*c, 0)).collect();

        for decision in &run.decisions {
            *by_risk.entry(decision.risk_level).or_default() += 1;
            for category in &decision.categories {
                *by_category.entry(*category).or_default() += 1;
            }
        }

        Self { by_risk, by_category }
    }
}

/// Verdict label shown next to each decision
pub(crate) fn verdict(run: &GovernanceRun, allowed: bool, review_required: bool) -> &'static str {
    match (allowed, review_required, run.enforce) {
        (true, true, _) => "ALLOWED (review)",
        (true, false, _) => "ALLOWED",
        (false, _, true) => "BLOCKED",
        (false, _, false) => "BLOCKED (advisory)",
    }
}
