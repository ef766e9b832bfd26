//! Revision and operation types
//!
//! A revision is one recorded schema change: an ordered list of upgrade
//! operations, the downgrade that reverses them, and a pointer to its parent.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One recorded schema change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub id: String,
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Recorded before governance enforcement was introduced
    #[serde(default)]
    pub legacy: bool,
    /// Author-declared permission to ship a breaking change
    #[serde(default)]
    pub breaking_ok: bool,
    #[serde(default, alias = "operations")]
    pub upgrade: Vec<Operation>,
    #[serde(default)]
    pub downgrade: Vec<Operation>,
}

impl Revision {
    pub fn new(id: impl Into<String>, parent_id: Option<&str>, upgrade: Vec<Operation>) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.map(str::to_string),
            message: None,
            legacy: false,
            breaking_ok: false,
            upgrade,
            downgrade: Vec::new(),
        }
    }

    pub fn with_downgrade(mut self, downgrade: Vec<Operation>) -> Self {
        self.downgrade = downgrade;
        self
    }

    /// True when the downgrade cannot restore the state the upgrade destroys
    pub fn is_irreversible(&self) -> bool {
        if self.upgrade.iter().any(Operation::destroys_data) {
            return true;
        }
        self.downgrade.is_empty() && self.upgrade.iter().any(Operation::changes_structure)
    }
}

/// Column as declared by a migration operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_default: Option<String>,
}

fn default_nullable() -> bool {
    true
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            server_default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Foreign key declared inline by `create_table`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeySpec {
    pub name: String,
    pub columns: Vec<String>,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
}

/// Atomic schema edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    CreateTable {
        table: String,
        columns: Vec<ColumnSpec>,
        #[serde(default)]
        foreign_keys: Vec<ForeignKeySpec>,
    },
    DropTable {
        table: String,
        /// Table the rows were copied into before the drop
        #[serde(default)]
        backup: Option<String>,
    },
    AddColumn {
        table: String,
        column: ColumnSpec,
    },
    DropColumn {
        table: String,
        column: String,
        #[serde(default)]
        backup: Option<String>,
    },
    AlterColumnType {
        table: String,
        column: String,
        new_type: String,
    },
    AlterNullable {
        table: String,
        column: String,
        nullable: bool,
    },
    AlterDefault {
        table: String,
        column: String,
        #[serde(default)]
        server_default: Option<String>,
    },
    AddIndex {
        table: String,
        name: String,
        columns: Vec<String>,
        #[serde(default)]
        unique: bool,
    },
    DropIndex {
        table: String,
        name: String,
    },
    AddForeignKey {
        table: String,
        name: String,
        columns: Vec<String>,
        ref_table: String,
        ref_columns: Vec<String>,
    },
    DropForeignKey {
        table: String,
        name: String,
    },
    CreateEnum {
        name: String,
        values: Vec<String>,
    },
    AlterEnum {
        name: String,
        #[serde(default)]
        add: Vec<String>,
        #[serde(default)]
        remove: Vec<String>,
    },
    DropEnum {
        name: String,
    },
    CreateTrigger {
        table: String,
        name: String,
        function: String,
        /// Other tables the trigger body reads or writes
        #[serde(default)]
        references: Vec<String>,
    },
    DropTrigger {
        table: String,
        name: String,
    },
    Backfill {
        table: String,
        description: String,
    },
}

/// Discriminant of [`Operation`], used as the key of the category table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    CreateTable,
    DropTable,
    AddColumn,
    DropColumn,
    AlterColumnType,
    AlterNullable,
    AlterDefault,
    AddIndex,
    DropIndex,
    AddForeignKey,
    DropForeignKey,
    CreateEnum,
    AlterEnum,
    DropEnum,
    CreateTrigger,
    DropTrigger,
    Backfill,
}

impl OperationKind {
    pub const ALL: [OperationKind; 17] = [
        OperationKind::CreateTable,
        OperationKind::DropTable,
        OperationKind::AddColumn,
        OperationKind::DropColumn,
        OperationKind::AlterColumnType,
        OperationKind::AlterNullable,
        OperationKind::AlterDefault,
        OperationKind::AddIndex,
        OperationKind::DropIndex,
        OperationKind::AddForeignKey,
        OperationKind::DropForeignKey,
        OperationKind::CreateEnum,
        OperationKind::AlterEnum,
        OperationKind::DropEnum,
        OperationKind::CreateTrigger,
        OperationKind::DropTrigger,
        OperationKind::Backfill,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::CreateTable => "create_table",
            OperationKind::DropTable => "drop_table",
            OperationKind::AddColumn => "add_column",
            OperationKind::DropColumn => "drop_column",
            OperationKind::AlterColumnType => "alter_column_type",
            OperationKind::AlterNullable => "alter_nullable",
            OperationKind::AlterDefault => "alter_default",
            OperationKind::AddIndex => "add_index",
            OperationKind::DropIndex => "drop_index",
            OperationKind::AddForeignKey => "add_foreign_key",
            OperationKind::DropForeignKey => "drop_foreign_key",
            OperationKind::CreateEnum => "create_enum",
            OperationKind::AlterEnum => "alter_enum",
            OperationKind::DropEnum => "drop_enum",
            OperationKind::CreateTrigger => "create_trigger",
            OperationKind::DropTrigger => "drop_trigger",
            OperationKind::Backfill => "backfill",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::CreateTable { .. } => OperationKind::CreateTable,
            Operation::DropTable { .. } => OperationKind::DropTable,
            Operation::AddColumn { .. } => OperationKind::AddColumn,
            Operation::DropColumn { .. } => OperationKind::DropColumn,
            Operation::AlterColumnType { .. } => OperationKind::AlterColumnType,
            Operation::AlterNullable { .. } => OperationKind::AlterNullable,
            Operation::AlterDefault { .. } => OperationKind::AlterDefault,
            Operation::AddIndex { .. } => OperationKind::AddIndex,
            Operation::DropIndex { .. } => OperationKind::DropIndex,
            Operation::AddForeignKey { .. } => OperationKind::AddForeignKey,
            Operation::DropForeignKey { .. } => OperationKind::DropForeignKey,
            Operation::CreateEnum { .. } => OperationKind::CreateEnum,
            Operation::AlterEnum { .. } => OperationKind::AlterEnum,
            Operation::DropEnum { .. } => OperationKind::DropEnum,
            Operation::CreateTrigger { .. } => OperationKind::CreateTrigger,
            Operation::DropTrigger { .. } => OperationKind::DropTrigger,
            Operation::Backfill { .. } => OperationKind::Backfill,
        }
    }

    /// Drops rows or enum labels with nowhere to restore them from
    pub fn destroys_data(&self) -> bool {
        match self {
            Operation::DropTable { backup, .. } | Operation::DropColumn { backup, .. } => {
                backup.is_none()
            }
            Operation::AlterEnum { remove, .. } => !remove.is_empty(),
            Operation::DropEnum { .. } => true,
            _ => false,
        }
    }

    /// Anything except a content-only backfill
    pub fn changes_structure(&self) -> bool {
        !matches!(self, Operation::Backfill { .. })
    }

    /// Human-readable description of the change
    pub fn description(&self) -> String {
        match self {
            Operation::CreateTable { table, columns, .. } => {
                format!("Create table {} ({} columns)", table, columns.len())
            }
            Operation::DropTable { table, .. } => format!("Drop table {}", table),
            Operation::AddColumn { table, column } => {
                format!("Add column {}.{} ({})", table, column.name, column.data_type)
            }
            Operation::DropColumn { table, column, .. } => {
                format!("Drop column {}.{}", table, column)
            }
            Operation::AlterColumnType { table, column, new_type } => {
                format!("Change type of {}.{} to {}", table, column, new_type)
            }
            Operation::AlterNullable { table, column, nullable } => format!(
                "Make {}.{} {}",
                table,
                column,
                if *nullable { "nullable" } else { "NOT NULL" }
            ),
            Operation::AlterDefault { table, column, server_default } => match server_default {
                Some(default) => format!("Set default of {}.{} to {}", table, column, default),
                None => format!("Drop default of {}.{}", table, column),
            },
            Operation::AddIndex { table, name, unique, .. } => format!(
                "Add {}index {} on {}",
                if *unique { "unique " } else { "" },
                name,
                table
            ),
            Operation::DropIndex { table, name } => format!("Drop index {} from {}", name, table),
            Operation::AddForeignKey { table, name, ref_table, .. } => {
                format!("Add foreign key {} from {} to {}", name, table, ref_table)
            }
            Operation::DropForeignKey { table, name } => {
                format!("Drop foreign key {} from {}", name, table)
            }
            Operation::CreateEnum { name, values } => {
                format!("Create enum {} ({} values)", name, values.len())
            }
            Operation::AlterEnum { name, add, remove } => format!(
                "Alter enum {} (+{} / -{})",
                name,
                add.len(),
                remove.len()
            ),
            Operation::DropEnum { name } => format!("Drop enum {}", name),
            Operation::CreateTrigger { table, name, .. } => {
                format!("Create trigger {} on {}", name, table)
            }
            Operation::DropTrigger { table, name } => {
                format!("Drop trigger {} from {}", name, table)
            }
            Operation::Backfill { table, description } => {
                format!("Backfill {}: {}", table, description)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_json_shape() {
        let json = r#"{
            "id": "3f2a9c01",
            "parent_id": null,
            "operations": [
                {"op": "create_table", "table": "students", "columns": [
                    {"name": "id", "type": "integer", "nullable": false},
                    {"name": "email", "type": "varchar(255)"}
                ]},
                {"op": "drop_column", "table": "grants", "column": "legacy_code"}
            ]
        }"#;

        let revision: Revision = serde_json::from_str(json).unwrap();
        assert_eq!(revision.upgrade.len(), 2);
        assert_eq!(revision.upgrade[0].kind(), OperationKind::CreateTable);
        assert!(revision.downgrade.is_empty());
        assert!(!revision.legacy);

        match &revision.upgrade[0] {
            Operation::CreateTable { columns, .. } => {
                assert!(!columns[0].nullable);
                assert!(columns[1].nullable);
            }
            other => panic!("unexpected operation {:?}", other),
        }
    }

    #[test]
    fn test_drop_without_backup_is_irreversible() {
        let revision = Revision::new(
            "b1",
            Some("a1"),
            vec![Operation::DropColumn {
                table: "dues".to_string(),
                column: "notes".to_string(),
                backup: None,
            }],
        )
        .with_downgrade(vec![Operation::AddColumn {
            table: "dues".to_string(),
            column: ColumnSpec::new("notes", "text"),
        }]);

        assert!(revision.is_irreversible());
    }

    #[test]
    fn test_drop_with_backup_and_downgrade_is_reversible() {
        let revision = Revision::new(
            "b1",
            Some("a1"),
            vec![Operation::DropColumn {
                table: "dues".to_string(),
                column: "notes".to_string(),
                backup: Some("dues_notes_backup".to_string()),
            }],
        )
        .with_downgrade(vec![Operation::AddColumn {
            table: "dues".to_string(),
            column: ColumnSpec::new("notes", "text"),
        }]);

        assert!(!revision.is_irreversible());
    }

    #[test]
    fn test_empty_downgrade_on_structural_change_is_irreversible() {
        let revision = Revision::new(
            "c1",
            None,
            vec![Operation::AddIndex {
                table: "cohorts".to_string(),
                name: "ix_cohorts_year".to_string(),
                columns: vec!["year".to_string()],
                unique: false,
            }],
        );
        assert!(revision.is_irreversible());

        let backfill_only = Revision::new(
            "c2",
            Some("c1"),
            vec![Operation::Backfill {
                table: "cohorts".to_string(),
                description: "populate year".to_string(),
            }],
        );
        assert!(!backfill_only.is_irreversible());
    }

    #[test]
    fn test_kind_table_covers_every_variant() {
        let mut kinds: Vec<_> = OperationKind::ALL.iter().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), OperationKind::ALL.len());
    }
}
