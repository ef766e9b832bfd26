//! Policy Gate
//!
//! Turns classified revisions plus deployment context into per-revision
//! admission decisions. Pure: the same inputs always give the same run.

use crate::config::PolicyConfig;
use crate::pipeline::types::{ClassifiedRevision, Decision, GovernanceRun, RiskLevel, RunContext};
use tracing::{debug, warn};

pub struct PolicyGate<'a> {
    policy: &'a PolicyConfig,
}

impl<'a> PolicyGate<'a> {
    pub fn new(policy: &'a PolicyConfig) -> Self {
        Self { policy }
    }

    /// Decide every revision in chain order
    pub fn decide(&self, context: &RunContext, revisions: &[ClassifiedRevision]) -> GovernanceRun {
        let production = self.policy.is_production(&context.policy_env);
        let decisions = revisions
            .iter()
            .map(|revision| self.decide_one(context, production, revision))
            .collect();

        GovernanceRun {
            branch: context.branch.clone(),
            policy_env: context.policy_env.clone(),
            enforce: context.enforce,
            decisions,
            scope: revisions.iter().map(|r| r.id.clone()).collect(),
        }
    }

    fn decide_one(&self, context: &RunContext, production: bool, revision: &ClassifiedRevision) -> Decision {
        let risk_level = revision.classification.base_risk;
        let breaking_ok = revision.breaking_ok || context.overrides.contains(&revision.id);

        let (allowed, review_required) = if revision.legacy && !context.enforce {
            // grandfathered while enforcement is advisory
            (true, false)
        } else if !production {
            (true, false)
        } else {
            match risk_level {
                RiskLevel::High => (breaking_ok, false),
                RiskLevel::Medium => (true, true),
                RiskLevel::Low => (true, false),
            }
        };

        if !allowed {
            if context.enforce {
                warn!("⛔ Revision {} blocked: {} risk in {}", revision.id, risk_level, context.policy_env);
            } else {
                warn!(
                    "⚠️  Revision {} would be blocked ({} risk in {}); advisory run",
                    revision.id, risk_level, context.policy_env
                );
            }
        } else {
            debug!(
                "Revision {} allowed (risk={}, review={}, override={})",
                revision.id, risk_level, review_required, breaking_ok
            );
        }

        Decision {
            migration: revision.id.clone(),
            risk_level,
            categories: revision.classification.categories.clone(),
            legacy: revision.legacy,
            breaking_ok,
            allowed,
            review_required,
            irreversible: revision.classification.irreversible,
        }
    }
}
