//! Governance Orchestrator
//!
//! Drives one governance run over a snapshot of the migration history:
//! select the pending range, classify every revision, hand the classified
//! chain to the policy gate and verify the run reached a decision for each
//! revision in scope. Any failure aborts the run with no partial output.

use crate::audit::{AuditAction, AuditRecord, AuditStore, NewAuditRecord};
use crate::config::PolicyConfig;
use crate::error::{GovernanceError, GovernanceResult};
use crate::history::graph::HEAD;
use crate::history::{MigrationHistory, Revision};
use crate::pipeline::classifier::ChangeClassifier;
use crate::pipeline::gate::PolicyGate;
use crate::pipeline::types::{ClassifiedRevision, GovernanceRun, RunContext};
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, info};

/// Audit table name used for persisted gate decisions
pub const DECISION_TABLE: &str = "schema_revisions";

/// Per-revision progress through a run
#[derive(Debug)]
enum RevisionState {
    Unclassified,
    Classified(ClassifiedRevision),
    Decided,
}

pub struct GovernancePipeline<'a> {
    policy: &'a PolicyConfig,
}

impl<'a> GovernancePipeline<'a> {
    pub fn new(policy: &'a PolicyConfig) -> Self {
        Self { policy }
    }

    /// Evaluate the pending range of `snapshot` under `context`
    pub fn run(&self, snapshot: &MigrationHistory, context: &RunContext) -> GovernanceResult<GovernanceRun> {
        // Work on a private copy so concurrent appends never reach this run
        let mut history = snapshot.clone();
        if let Some(current) = &context.current {
            history.set_current(current)?;
        }

        let chain = history.linearize()?;
        let positions: HashMap<&str, usize> = chain
            .iter()
            .enumerate()
            .map(|(index, revision)| (revision.id.as_str(), index))
            .collect();

        let pending = Self::select_range(&history, &chain, &positions, context)?;
        let legacy_cutoff = match &self.policy.legacy_before {
            Some(reference) => {
                let id = history.resolve(reference)?;
                positions.get(id.as_str()).copied()
            }
            None => None,
        };

        info!(
            "🧭 Governance run on {} ({}): {} of {} revision(s) in scope, enforce={}",
            context.branch,
            context.policy_env,
            pending.len(),
            chain.len(),
            context.enforce
        );

        let classifier = ChangeClassifier::new(self.policy);
        let mut states: Vec<(&Revision, RevisionState)> = pending
            .iter()
            .map(|revision| (*revision, RevisionState::Unclassified))
            .collect();

        for (revision, state) in states.iter_mut() {
            let classification = classifier.classify(revision)?;
            let before_cutoff = match (legacy_cutoff, positions.get(revision.id.as_str())) {
                (Some(cutoff), Some(position)) => *position < cutoff,
                _ => false,
            };
            *state = RevisionState::Classified(ClassifiedRevision {
                id: revision.id.clone(),
                classification,
                legacy: revision.legacy || before_cutoff,
                breaking_ok: revision.breaking_ok,
            });
        }

        let classified: Vec<ClassifiedRevision> = states
            .iter()
            .filter_map(|(_, state)| match state {
                RevisionState::Classified(c) => Some(c.clone()),
                _ => None,
            })
            .collect();

        let run = PolicyGate::new(self.policy).decide(context, &classified);

        for decision in &run.decisions {
            let entry = states
                .iter_mut()
                .find(|(revision, _)| revision.id == decision.migration)
                .ok_or_else(|| {
                    GovernanceError::IncompleteRun(format!(
                        "decision for {} outside the run scope",
                        decision.migration
                    ))
                })?;
            match std::mem::replace(&mut entry.1, RevisionState::Decided) {
                RevisionState::Classified(_) => {}
                RevisionState::Decided => {
                    return Err(GovernanceError::IncompleteRun(format!(
                        "revision {} decided twice",
                        decision.migration
                    )))
                }
                RevisionState::Unclassified => {
                    return Err(GovernanceError::IncompleteRun(format!(
                        "revision {} decided before classification",
                        decision.migration
                    )))
                }
            }
        }

        if let Some((revision, _)) = states
            .iter()
            .find(|(_, state)| !matches!(state, RevisionState::Decided))
        {
            return Err(GovernanceError::IncompleteRun(format!(
                "revision {} never reached a decision",
                revision.id
            )));
        }
        run.ensure_complete()?;

        info!(
            "✅ Governance run finished: {} decided, {} blocked, {} for review",
            run.decisions.len(),
            run.blocked_count(),
            run.review_count()
        );

        Ok(run)
    }

    /// Revisions after `from` (exclusive) up to `to` (inclusive, default head)
    fn select_range<'c>(
        history: &MigrationHistory,
        chain: &[&'c Revision],
        positions: &HashMap<&str, usize>,
        context: &RunContext,
    ) -> GovernanceResult<Vec<&'c Revision>> {
        if chain.is_empty() {
            return Ok(Vec::new());
        }

        let position_of = |reference: &str| -> GovernanceResult<usize> {
            let id = history.resolve(reference)?;
            positions
                .get(id.as_str())
                .copied()
                .ok_or(GovernanceError::UnknownRevision(id))
        };

        let start = match &context.from {
            Some(reference) => position_of(reference)? + 1,
            None => 0,
        };
        let end = position_of(context.to.as_deref().unwrap_or(HEAD))?;

        if start > end + 1 {
            return Err(GovernanceError::Validation(format!(
                "run range is reversed: from {:?} is after to {:?}",
                context.from, context.to
            )));
        }

        debug!("Run range covers chain positions {}..={}", start, end);
        Ok(chain[start..=end].to_vec())
    }
}

/// Append one audit record per decision of a completed run, as a single batch
pub async fn record_decisions(
    store: &dyn AuditStore,
    run: &GovernanceRun,
    actor_id: &str,
) -> GovernanceResult<Vec<AuditRecord>> {
    run.ensure_complete()?;

    let batch = run
        .decisions
        .iter()
        .map(|decision| NewAuditRecord {
            action: AuditAction::Decision,
            table_name: DECISION_TABLE.to_string(),
            record_id: decision.migration.clone(),
            actor_id: actor_id.to_string(),
            details: Some(json!({
                "branch": run.branch,
                "policy_env": run.policy_env,
                "enforce": run.enforce,
                "risk_level": decision.risk_level,
                "categories": decision.categories,
                "allowed": decision.allowed,
            })),
        })
        .collect();
    let records = store.append_batch(batch).await?;

    info!("📝 Recorded {} governance decision(s) in the audit trail", records.len());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::memory::MemoryAuditStore;
    use crate::audit::{AuditFilter, AuditPatch};
    use crate::history::{ColumnSpec, Operation, OperationKind};
    use crate::pipeline::types::{ChangeCategory, RiskLevel};
    use pretty_assertions::assert_eq;

    fn add_column(table: &str, column: &str) -> Operation {
        Operation::AddColumn {
            table: table.to_string(),
            column: ColumnSpec::new(column, "text"),
        }
    }

    fn drop_column(table: &str, column: &str) -> Operation {
        Operation::DropColumn {
            table: table.to_string(),
            column: column.to_string(),
            backup: None,
        }
    }

    /// root creates students, then one additive, one destructive enum revision
    fn sample_history() -> MigrationHistory {
        let mut history = MigrationHistory::new();
        history
            .append(
                Revision::new(
                    "a1",
                    None,
                    vec![Operation::CreateTable {
                        table: "students".to_string(),
                        columns: vec![ColumnSpec::new("id", "integer").not_null()],
                        foreign_keys: vec![],
                    }],
                )
                .with_downgrade(vec![Operation::DropTable {
                    table: "students".to_string(),
                    backup: None,
                }]),
            )
            .unwrap();
        history
            .append(
                Revision::new("b2", Some("a1"), vec![add_column("students", "email")])
                    .with_downgrade(vec![drop_column("students", "email")]),
            )
            .unwrap();
        history
            .append(Revision::new(
                "c3",
                Some("b2"),
                vec![Operation::DropEnum {
                    name: "grant_status".to_string(),
                }],
            ))
            .unwrap();
        history
    }

    #[test]
    fn test_run_decides_every_revision_in_chain_order() {
        let policy = PolicyConfig::default();
        let context = RunContext::new("main", "production", true);
        let run = GovernancePipeline::new(&policy).run(&sample_history(), &context).unwrap();

        let ids: Vec<&str> = run.decisions.iter().map(|d| d.migration.as_str()).collect();
        assert_eq!(ids, vec!["a1", "b2", "c3"]);
        assert_eq!(run.scope, vec!["a1", "b2", "c3"]);

        assert!(run.decisions[1].allowed);
        assert_eq!(run.decisions[1].risk_level, RiskLevel::Low);

        let dropped = &run.decisions[2];
        assert_eq!(dropped.categories, [ChangeCategory::Topological].into_iter().collect());
        assert_eq!(dropped.risk_level, RiskLevel::High);
        assert!(dropped.irreversible);
        assert!(!dropped.allowed);
        assert!(run.fails());
    }

    #[test]
    fn test_override_and_range_selection() {
        let policy = PolicyConfig::default();
        let mut context = RunContext::new("main", "production", true);
        context.from = Some("a1".to_string());
        context.overrides.insert("c3".to_string());

        let run = GovernancePipeline::new(&policy).run(&sample_history(), &context).unwrap();
        let ids: Vec<&str> = run.decisions.iter().map(|d| d.migration.as_str()).collect();
        assert_eq!(ids, vec!["b2", "c3"]);
        assert!(run.decisions[1].allowed);
        assert!(run.decisions[1].breaking_ok);
        assert!(!run.fails());
    }

    #[test]
    fn test_current_marker_resolves_relative_range() {
        let policy = PolicyConfig::default();
        let mut context = RunContext::new("main", "staging", true);
        context.current = Some("a1".to_string());
        context.from = Some("current".to_string());
        context.to = Some("current+1".to_string());

        let run = GovernancePipeline::new(&policy).run(&sample_history(), &context).unwrap();
        assert_eq!(run.scope, vec!["b2"]);
    }

    #[test]
    fn test_reversed_range_is_rejected() {
        let policy = PolicyConfig::default();
        let mut context = RunContext::new("main", "production", true);
        context.from = Some("c3".to_string());
        context.to = Some("a1".to_string());

        let err = GovernancePipeline::new(&policy).run(&sample_history(), &context).unwrap_err();
        assert!(matches!(err, GovernanceError::Validation(_)));
    }

    #[test]
    fn test_legacy_cutoff_grandfathers_advisory_runs() {
        let policy = PolicyConfig {
            legacy_before: Some("head".to_string()),
            ..PolicyConfig::default()
        };
        let context = RunContext::new("main", "production", false);
        let run = GovernancePipeline::new(&policy).run(&sample_history(), &context).unwrap();

        assert!(run.decisions[0].legacy);
        assert!(run.decisions[1].legacy);
        assert!(!run.decisions[2].legacy);
        // c3 is not legacy, so advisory mode only downgrades it to a warning
        assert_eq!(run.blocked_count(), 1);
        assert!(!run.fails());
    }

    #[test]
    fn test_classification_gap_aborts_whole_run() {
        let mut policy = PolicyConfig::default();
        policy.operation_categories.remove(&OperationKind::DropEnum);
        let context = RunContext::new("main", "production", true);

        let err = GovernancePipeline::new(&policy).run(&sample_history(), &context).unwrap_err();
        match err {
            GovernanceError::ClassificationGap { revision, operation } => {
                assert_eq!(revision, "c3");
                assert_eq!(operation, OperationKind::DropEnum);
            }
            other => panic!("expected classification gap, got {}", other),
        }
    }

    #[test]
    fn test_run_ignores_appends_after_snapshot() {
        let policy = PolicyConfig::default();
        let context = RunContext::new("main", "staging", true);
        let mut live = sample_history();
        let snapshot = live.clone();

        live.append(Revision::new("d4", Some("c3"), vec![add_column("students", "phone")]))
            .unwrap();

        let run = GovernancePipeline::new(&policy).run(&snapshot, &context).unwrap();
        assert_eq!(run.decisions.len(), 3);
    }

    #[test]
    fn test_empty_history_yields_empty_run() {
        let policy = PolicyConfig::default();
        let context = RunContext::new("main", "production", true);
        let run = GovernancePipeline::new(&policy)
            .run(&MigrationHistory::new(), &context)
            .unwrap();

        assert!(run.decisions.is_empty());
        assert!(!run.fails());
    }

    #[tokio::test]
    async fn test_record_decisions_appends_one_row_per_decision() {
        let policy = PolicyConfig::default();
        let context = RunContext::new("main", "production", true);
        let run = GovernancePipeline::new(&policy).run(&sample_history(), &context).unwrap();
        let store = MemoryAuditStore::new(7);

        let records = record_decisions(&store, &run, "release-bot").await.unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.action == AuditAction::Decision));
        assert_eq!(records[2].record_id, "c3");
        assert_eq!(records[2].table_name, DECISION_TABLE);
    }

    /// Memory ledger whose batches fail once they reach a given row
    struct FailingAtRow {
        inner: MemoryAuditStore,
        fail_at: usize,
    }

    #[async_trait::async_trait]
    impl AuditStore for FailingAtRow {
        fn engine(&self) -> &'static str {
            "failing"
        }

        async fn append(&self, record: NewAuditRecord) -> GovernanceResult<AuditRecord> {
            self.inner.append(record).await
        }

        async fn append_batch(
            &self,
            records: Vec<NewAuditRecord>,
        ) -> GovernanceResult<Vec<AuditRecord>> {
            if records.len() > self.fail_at {
                return Err(GovernanceError::Validation(format!(
                    "row {} rejected",
                    self.fail_at
                )));
            }
            self.inner.append_batch(records).await
        }

        async fn get(&self, id: uuid::Uuid) -> GovernanceResult<AuditRecord> {
            self.inner.get(id).await
        }

        async fn list(&self, filter: &AuditFilter) -> GovernanceResult<Vec<AuditRecord>> {
            self.inner.list(filter).await
        }

        async fn update(&self, id: uuid::Uuid, patch: AuditPatch) -> GovernanceResult<AuditRecord> {
            self.inner.update(id, patch).await
        }

        async fn delete(&self, id: uuid::Uuid) -> GovernanceResult<()> {
            self.inner.delete(id).await
        }
    }

    #[tokio::test]
    async fn test_failed_recording_leaves_no_partial_decisions() {
        let policy = PolicyConfig::default();
        let context = RunContext::new("main", "production", true);
        let run = GovernancePipeline::new(&policy).run(&sample_history(), &context).unwrap();
        let store = FailingAtRow {
            inner: MemoryAuditStore::new(7),
            fail_at: 1,
        };

        assert!(record_decisions(&store, &run, "release-bot").await.is_err());
        assert!(store.list(&AuditFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_actor_records_no_decisions() {
        let policy = PolicyConfig::default();
        let context = RunContext::new("main", "production", true);
        let run = GovernancePipeline::new(&policy).run(&sample_history(), &context).unwrap();
        let store = MemoryAuditStore::new(7);

        let err = record_decisions(&store, &run, "").await.unwrap_err();
        assert!(matches!(err, GovernanceError::Validation(_)));
        assert!(store.list(&AuditFilter::default()).await.unwrap().is_empty());
    }
}
