//! Schema Drift Detector
//!
//! Compares the declared data model against the schema implied by the applied
//! revision chain. Reports only; never reconciles.

use crate::drift::schema::{normalize_type, ColumnModel, SchemaModel};
use crate::error::GovernanceResult;
use crate::history::Revision;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Kind of mismatch, ordered for stable report output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftKind {
    /// Declared, but no revision creates it
    MissingTable,
    /// Created by revisions, but not declared
    UnexpectedTable,
    MissingColumn,
    UnexpectedColumn,
    TypeMismatch,
    NullabilityMismatch,
    DefaultMismatch,
}

/// A single structural difference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDrift {
    pub kind: DriftKind,
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// Value in the declared model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared: Option<String>,
    /// Value implied by the applied revisions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<String>,
}

impl fmt::Display for SchemaDrift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match &self.column {
            Some(column) => format!("{}.{}", self.table, column),
            None => self.table.clone(),
        };
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "<none>".to_string());

        match self.kind {
            DriftKind::MissingTable => {
                write!(f, "[missing_table] {}: declared but no revision creates it", target)
            }
            DriftKind::UnexpectedTable => {
                write!(f, "[unexpected_table] {}: created by revisions but not declared", target)
            }
            DriftKind::MissingColumn => {
                write!(f, "[missing_column] {}: declared but no revision adds it", target)
            }
            DriftKind::UnexpectedColumn => {
                write!(f, "[unexpected_column] {}: added by revisions but not declared", target)
            }
            DriftKind::TypeMismatch => write!(
                f,
                "[type_mismatch] {}: declared {} but revisions produce {}",
                target,
                show(&self.declared),
                show(&self.applied)
            ),
            DriftKind::NullabilityMismatch => write!(
                f,
                "[nullability_mismatch] {}: declared {} but revisions produce {}",
                target,
                show(&self.declared),
                show(&self.applied)
            ),
            DriftKind::DefaultMismatch => write!(
                f,
                "[default_mismatch] {}: declared default {} but revisions produce {}",
                target,
                show(&self.declared),
                show(&self.applied)
            ),
        }
    }
}

/// Drift check result with the checksums of both sides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    pub declared_checksum: String,
    pub applied_checksum: String,
    pub diffs: Vec<SchemaDrift>,
}

impl DriftReport {
    pub fn has_drift(&self) -> bool {
        !self.diffs.is_empty()
    }

    /// Stable textual rendering for release logs
    pub fn render(&self) -> String {
        let mut out = format!(
            "declared schema: {}\napplied schema:  {}\n",
            self.declared_checksum, self.applied_checksum
        );
        if self.diffs.is_empty() {
            out.push_str("no drift detected\n");
            return out;
        }
        for diff in &self.diffs {
            out.push_str(&format!("{}\n", diff));
        }
        out.push_str(&format!(
            "{} difference(s); generate a new revision to reconcile the declared model\n",
            self.diffs.len()
        ));
        out
    }
}

/// The drift detector
pub struct DriftDetector;

impl DriftDetector {
    /// Replay `applied_chain` from the root and diff it against `declared`
    pub fn detect(
        declared: &SchemaModel,
        applied_chain: &[&Revision],
    ) -> GovernanceResult<Vec<SchemaDrift>> {
        Ok(Self::report(declared, applied_chain)?.diffs)
    }

    /// `detect` plus the checksums of both sides
    pub fn report(
        declared: &SchemaModel,
        applied_chain: &[&Revision],
    ) -> GovernanceResult<DriftReport> {
        let applied = SchemaModel::replay(applied_chain.iter().copied())?;
        Ok(DriftReport {
            declared_checksum: declared.checksum(),
            applied_checksum: applied.checksum(),
            diffs: Self::compare(declared, &applied),
        })
    }

    /// Structural comparison, order-insensitive over table and column sets
    pub fn compare(declared: &SchemaModel, applied: &SchemaModel) -> Vec<SchemaDrift> {
        let mut diffs = Vec::new();

        let declared_tables: BTreeSet<&String> = declared.tables.keys().collect();
        let applied_tables: BTreeSet<&String> = applied.tables.keys().collect();

        for table in declared_tables.difference(&applied_tables) {
            diffs.push(table_drift(DriftKind::MissingTable, table));
        }
        for table in applied_tables.difference(&declared_tables) {
            diffs.push(table_drift(DriftKind::UnexpectedTable, table));
        }

        for table in declared_tables.intersection(&applied_tables) {
            let want = &declared.tables[*table].columns;
            let have = &applied.tables[*table].columns;

            for (name, column) in want {
                match have.get(name) {
                    Some(actual) => diffs.extend(compare_columns(table, name, column, actual)),
                    None => {
                        diffs.push(column_drift(DriftKind::MissingColumn, table, name, None, None))
                    }
                }
            }
            for name in have.keys().filter(|name| !want.contains_key(*name)) {
                diffs.push(column_drift(DriftKind::UnexpectedColumn, table, name, None, None));
            }
        }

        diffs.sort_by(|a, b| (&a.table, &a.column, a.kind).cmp(&(&b.table, &b.column, b.kind)));
        diffs
    }
}

fn table_drift(kind: DriftKind, table: &str) -> SchemaDrift {
    SchemaDrift {
        kind,
        table: table.to_string(),
        column: None,
        declared: None,
        applied: None,
    }
}

fn column_drift(
    kind: DriftKind,
    table: &str,
    column: &str,
    declared: Option<String>,
    applied: Option<String>,
) -> SchemaDrift {
    SchemaDrift {
        kind,
        table: table.to_string(),
        column: Some(column.to_string()),
        declared,
        applied,
    }
}

fn compare_columns(
    table: &str,
    name: &str,
    declared: &ColumnModel,
    applied: &ColumnModel,
) -> Vec<SchemaDrift> {
    let mut diffs = Vec::new();

    if normalize_type(&declared.data_type) != normalize_type(&applied.data_type) {
        diffs.push(column_drift(
            DriftKind::TypeMismatch,
            table,
            name,
            Some(declared.data_type.clone()),
            Some(applied.data_type.clone()),
        ));
    }

    if declared.nullable != applied.nullable {
        let label = |nullable: bool| if nullable { "NULL" } else { "NOT NULL" }.to_string();
        diffs.push(column_drift(
            DriftKind::NullabilityMismatch,
            table,
            name,
            Some(label(declared.nullable)),
            Some(label(applied.nullable)),
        ));
    }

    let trimmed = |v: &Option<String>| v.as_deref().map(str::trim).map(str::to_string);
    if trimmed(&declared.server_default) != trimmed(&applied.server_default) {
        diffs.push(column_drift(
            DriftKind::DefaultMismatch,
            table,
            name,
            declared.server_default.clone(),
            applied.server_default.clone(),
        ));
    }

    diffs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{ColumnSpec, MigrationHistory, Operation};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn history() -> MigrationHistory {
        let mut history = MigrationHistory::new();
        history
            .append(Revision::new(
                "a1",
                None,
                vec![Operation::CreateTable {
                    table: "grants".to_string(),
                    columns: vec![
                        ColumnSpec::new("id", "integer").not_null(),
                        ColumnSpec::new("amount", "numeric(12,2)"),
                    ],
                    foreign_keys: vec![],
                }],
            ))
            .unwrap();
        history
            .append(Revision::new(
                "b2",
                Some("a1"),
                vec![Operation::AlterDefault {
                    table: "grants".to_string(),
                    column: "amount".to_string(),
                    server_default: Some("0".to_string()),
                }],
            ))
            .unwrap();
        history
    }

    #[test]
    fn test_matching_model_has_no_drift() {
        let history = history();
        let chain = history.linearize().unwrap();
        let declared = SchemaModel::replay(chain.iter().copied()).unwrap();

        assert!(DriftDetector::detect(&declared, &chain).unwrap().is_empty());
    }

    #[test]
    fn test_type_and_nullability_are_distinct_kinds() {
        let history = history();
        let chain = history.linearize().unwrap();
        let mut declared = SchemaModel::replay(chain.iter().copied()).unwrap();
        let amount = declared
            .tables
            .get_mut("grants")
            .unwrap()
            .columns
            .get_mut("amount")
            .unwrap();
        amount.data_type = "numeric(14,2)".to_string();
        amount.nullable = false;

        let kinds: Vec<_> = DriftDetector::detect(&declared, &chain)
            .unwrap()
            .into_iter()
            .map(|d| d.kind)
            .collect();
        assert_eq!(kinds, vec![DriftKind::TypeMismatch, DriftKind::NullabilityMismatch]);
    }

    #[test]
    fn test_missing_and_unexpected_objects() {
        let history = history();
        let chain = history.linearize().unwrap();
        let mut declared = SchemaModel::replay(chain.iter().copied()).unwrap();
        declared.tables.insert("cohorts".to_string(), Default::default());
        let grants = declared.tables.get_mut("grants").unwrap();
        grants.columns.remove("amount");
        grants.columns.insert(
            "awarded_on".to_string(),
            ColumnModel {
                data_type: "date".to_string(),
                nullable: true,
                server_default: None,
            },
        );

        let diffs = DriftDetector::detect(&declared, &chain).unwrap();
        let rendered: Vec<String> = diffs.iter().map(|d| d.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "[missing_table] cohorts: declared but no revision creates it".to_string(),
                "[unexpected_column] grants.amount: added by revisions but not declared"
                    .to_string(),
                "[missing_column] grants.awarded_on: declared but no revision adds it".to_string(),
            ]
        );
    }

    #[test]
    fn test_default_change_is_its_own_kind() {
        let history = history();
        let chain = history.linearize().unwrap();
        let mut declared = SchemaModel::replay(chain.iter().copied()).unwrap();
        let amount = declared
            .tables
            .get_mut("grants")
            .unwrap()
            .columns
            .get_mut("amount")
            .unwrap();
        amount.server_default = Some("100".to_string());

        let diffs = DriftDetector::detect(&declared, &chain).unwrap();
        assert_eq!(
            diffs,
            vec![SchemaDrift {
                kind: DriftKind::DefaultMismatch,
                table: "grants".to_string(),
                column: Some("amount".to_string()),
                declared: Some("100".to_string()),
                applied: Some("0".to_string()),
            }]
        );
        assert_eq!(
            diffs[0].to_string(),
            "[default_mismatch] grants.amount: declared default 100 but revisions produce 0"
        );

        // surrounding whitespace is not drift
        let grants = declared.tables.get_mut("grants").unwrap();
        grants.columns.get_mut("amount").unwrap().server_default = Some(" 0 ".to_string());
        assert!(DriftDetector::detect(&declared, &chain).unwrap().is_empty());
    }

    #[test]
    fn test_report_renders_instruction() {
        let history = history();
        let chain = history.linearize().unwrap();
        let report = DriftDetector::report(&SchemaModel::new(), &chain).unwrap();

        assert!(report.has_drift());
        let text = report.render();
        assert!(text.contains("[unexpected_table] grants"));
        assert!(text.contains("generate a new revision"));
    }

    proptest! {
        #[test]
        fn prop_drift_is_reflexive(
            tables in prop::collection::btree_map(
                "[a-z]{1,8}",
                prop::collection::btree_map(
                    "[a-z]{1,8}",
                    (prop::sample::select(vec!["integer", "text", "date"]), any::<bool>()),
                    1..5,
                ),
                0..5,
            )
        ) {
            let mut history = MigrationHistory::new();
            let mut parent: Option<String> = None;
            for (index, (table, columns)) in tables.iter().enumerate() {
                let id = format!("r{}", index);
                let specs = columns
                    .iter()
                    .map(|(name, (data_type, nullable))| ColumnSpec {
                        name: name.clone(),
                        data_type: data_type.to_string(),
                        nullable: *nullable,
                        server_default: None,
                    })
                    .collect();
                let revision = Revision::new(
                    id.clone(),
                    parent.as_deref(),
                    vec![Operation::CreateTable {
                        table: table.clone(),
                        columns: specs,
                        foreign_keys: vec![],
                    }],
                );
                history.append(revision).unwrap();
                parent = Some(id);
            }

            let chain = history.linearize().unwrap();
            let implied = SchemaModel::replay(chain.iter().copied()).unwrap();
            prop_assert!(DriftDetector::detect(&implied, &chain).unwrap().is_empty());
        }
    }
}
