//! Stability Score
//!
//! Sum of category weights over every decision plus a flat penalty per HIGH
//! decision. Weights come from the policy configuration.

use crate::config::PolicyConfig;
use crate::error::GovernanceResult;
use crate::pipeline::{ChangeCategory, Decision, GovernanceRun, RiskLevel};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct StabilityScorer {
    weights: BTreeMap<ChangeCategory, u32>,
    high_risk_penalty: u32,
}

impl StabilityScorer {
    pub fn new(policy: &PolicyConfig) -> Self {
        Self {
            weights: policy.category_weights.clone(),
            high_risk_penalty: policy.high_risk_penalty,
        }
    }

    pub fn score_decisions(&self, decisions: &[Decision]) -> u64 {
        decisions.iter().map(|decision| self.score_one(decision)).sum()
    }

    /// Score of a complete run
    pub fn score(&self, run: &GovernanceRun) -> GovernanceResult<u64> {
        run.ensure_complete()?;
        Ok(self.score_decisions(&run.decisions))
    }

    fn score_one(&self, decision: &Decision) -> u64 {
        let weights: u64 = decision
            .categories
            .iter()
            .map(|c| u64::from(self.weights.get(c).copied().unwrap_or(0)))
            .sum();
        let penalty = if decision.risk_level == RiskLevel::High {
            u64::from(self.high_risk_penalty)
        } else {
            0
        };
        weights + penalty
    }
}
