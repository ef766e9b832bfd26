//! Change Classifier
//!
//! Labels a revision with the categories of change it makes and derives its
//! base risk from the configured category tables.

use crate::config::PolicyConfig;
use crate::error::{GovernanceError, GovernanceResult};
use crate::history::{Operation, Revision};
use crate::pipeline::types::{ChangeCategory, Classification, RiskLevel};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Classifier over explicit category tables
pub struct ChangeClassifier<'a> {
    operation_categories: &'a BTreeMap<crate::history::OperationKind, BTreeSet<ChangeCategory>>,
    category_risk: &'a BTreeMap<ChangeCategory, RiskLevel>,
}

impl<'a> ChangeClassifier<'a> {
    pub fn new(policy: &'a PolicyConfig) -> Self {
        Self {
            operation_categories: &policy.operation_categories,
            category_risk: &policy.category_risk,
        }
    }

    pub fn classify(&self, revision: &Revision) -> GovernanceResult<Classification> {
        let mut categories = BTreeSet::new();

        for operation in &revision.upgrade {
            let kind = operation.kind();
            let mapped = self
                .operation_categories
                .get(&kind)
                .filter(|mapped| !mapped.is_empty())
                .ok_or_else(|| GovernanceError::ClassificationGap {
                    revision: revision.id.clone(),
                    operation: kind,
                })?;
            categories.extend(mapped.iter().copied());
            categories.extend(Self::intrinsic_categories(operation));
        }

        // A revision with no operations still has to land in a category
        if categories.is_empty() {
            categories.insert(ChangeCategory::Data);
        }

        let irreversible = revision.is_irreversible();
        let mut base_risk = self.risk_of(&categories);
        if irreversible {
            base_risk = base_risk.escalate();
        }

        debug!(
            "Classified {}: {:?} risk={} irreversible={}",
            revision.id, categories, base_risk, irreversible
        );

        Ok(Classification {
            categories,
            base_risk,
            irreversible,
        })
    }

    /// Highest configured tier among the categories; unmapped categories count as HIGH
    pub fn risk_of(&self, categories: &BTreeSet<ChangeCategory>) -> RiskLevel {
        categories
            .iter()
            .map(|c| self.category_risk.get(c).copied().unwrap_or(RiskLevel::High))
            .max()
            .unwrap_or(RiskLevel::Low)
    }

    /// Categories implied by the operation's own shape
    fn intrinsic_categories(operation: &Operation) -> Option<ChangeCategory> {
        match operation {
            // relationship-bearing or join table
            Operation::CreateTable { foreign_keys, .. } if !foreign_keys.is_empty() => {
                Some(ChangeCategory::Relational)
            }
            Operation::CreateTrigger { table, references, .. }
                if references.iter().any(|r| r != table) =>
            {
                Some(ChangeCategory::Topological)
            }
            _ => None,
        }
    }
}
