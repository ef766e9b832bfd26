//! Schema model
//!
//! The structural shape of a database as either declared by the application
//! or implied by replaying revisions from the root.

use crate::error::{GovernanceError, GovernanceResult};
use crate::history::{ColumnSpec, ForeignKeySpec, Operation, Revision};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Complete schema keyed by table name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaModel {
    #[serde(default)]
    pub tables: BTreeMap<String, TableModel>,
    #[serde(default)]
    pub enums: BTreeMap<String, Vec<String>>,
}

/// Table representation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableModel {
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnModel>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub indexes: BTreeMap<String, IndexModel>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub foreign_keys: BTreeMap<String, ForeignKeyModel>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub triggers: BTreeSet<String>,
}

/// Column representation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnModel {
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

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexModel {
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyModel {
    pub columns: Vec<String>,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
}

impl From<&ColumnSpec> for ColumnModel {
    fn from(spec: &ColumnSpec) -> Self {
        Self {
            data_type: spec.data_type.clone(),
            nullable: spec.nullable,
            server_default: spec.server_default.clone(),
        }
    }
}

impl From<&ForeignKeySpec> for ForeignKeyModel {
    fn from(spec: &ForeignKeySpec) -> Self {
        Self {
            columns: spec.columns.clone(),
            ref_table: spec.ref_table.clone(),
            ref_columns: spec.ref_columns.clone(),
        }
    }
}

impl SchemaModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a declared model from a JSON document
    pub fn load(path: &Path) -> GovernanceResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Replay revisions root-first into a fresh model
    pub fn replay<'a, I>(revisions: I) -> GovernanceResult<Self>
    where
        I: IntoIterator<Item = &'a Revision>,
    {
        let mut model = Self::new();
        for revision in revisions {
            for operation in &revision.upgrade {
                model.apply(&revision.id, operation)?;
            }
        }
        Ok(model)
    }

    /// Apply one operation; `revision` names the culprit in errors
    pub fn apply(&mut self, revision: &str, operation: &Operation) -> GovernanceResult<()> {
        let fail = |reason: String| GovernanceError::chain(revision, reason);

        match operation {
            Operation::CreateTable { table, columns, foreign_keys } => {
                if self.tables.contains_key(table) {
                    return Err(fail(format!("table {} already exists", table)));
                }
                let mut model = TableModel::default();
                for column in columns {
                    if model.columns.insert(column.name.clone(), column.into()).is_some() {
                        return Err(fail(format!("column {}.{} declared twice", table, column.name)));
                    }
                }
                for fk in foreign_keys {
                    model.foreign_keys.insert(fk.name.clone(), fk.into());
                }
                self.tables.insert(table.clone(), model);
            }
            Operation::DropTable { table, .. } => {
                self.tables
                    .remove(table)
                    .ok_or_else(|| fail(format!("table {} does not exist", table)))?;
            }
            Operation::AddColumn { table, column } => {
                let model = self.table_mut(table).ok_or_else(|| missing_table(revision, table))?;
                if model.columns.contains_key(&column.name) {
                    return Err(fail(format!("column {}.{} already exists", table, column.name)));
                }
                model.columns.insert(column.name.clone(), column.into());
            }
            Operation::DropColumn { table, column, .. } => {
                let model = self.table_mut(table).ok_or_else(|| missing_table(revision, table))?;
                model
                    .columns
                    .remove(column)
                    .ok_or_else(|| fail(format!("column {}.{} does not exist", table, column)))?;
            }
            Operation::AlterColumnType { table, column, new_type } => {
                self.column_mut(revision, table, column)?.data_type = new_type.clone();
            }
            Operation::AlterNullable { table, column, nullable } => {
                self.column_mut(revision, table, column)?.nullable = *nullable;
            }
            Operation::AlterDefault { table, column, server_default } => {
                self.column_mut(revision, table, column)?.server_default = server_default.clone();
            }
            Operation::AddIndex { table, name, columns, unique } => {
                let model = self.table_mut(table).ok_or_else(|| missing_table(revision, table))?;
                let index = IndexModel {
                    columns: columns.clone(),
                    unique: *unique,
                };
                if model.indexes.insert(name.clone(), index).is_some() {
                    return Err(fail(format!("index {} already exists on {}", name, table)));
                }
            }
            Operation::DropIndex { table, name } => {
                let model = self.table_mut(table).ok_or_else(|| missing_table(revision, table))?;
                model
                    .indexes
                    .remove(name)
                    .ok_or_else(|| fail(format!("index {} does not exist on {}", name, table)))?;
            }
            Operation::AddForeignKey { table, name, columns, ref_table, ref_columns } => {
                let model = self.table_mut(table).ok_or_else(|| missing_table(revision, table))?;
                let fk = ForeignKeyModel {
                    columns: columns.clone(),
                    ref_table: ref_table.clone(),
                    ref_columns: ref_columns.clone(),
                };
                if model.foreign_keys.insert(name.clone(), fk).is_some() {
                    return Err(fail(format!("foreign key {} already exists on {}", name, table)));
                }
            }
            Operation::DropForeignKey { table, name } => {
                let model = self.table_mut(table).ok_or_else(|| missing_table(revision, table))?;
                model.foreign_keys.remove(name).ok_or_else(|| {
                    fail(format!("foreign key {} does not exist on {}", name, table))
                })?;
            }
            Operation::CreateEnum { name, values } => {
                if self.enums.insert(name.clone(), values.clone()).is_some() {
                    return Err(fail(format!("enum {} already exists", name)));
                }
            }
            Operation::AlterEnum { name, add, remove } => {
                let values = self
                    .enums
                    .get_mut(name)
                    .ok_or_else(|| fail(format!("enum {} does not exist", name)))?;
                values.retain(|v| !remove.contains(v));
                for value in add {
                    if !values.contains(value) {
                        values.push(value.clone());
                    }
                }
            }
            Operation::DropEnum { name } => {
                self.enums
                    .remove(name)
                    .ok_or_else(|| fail(format!("enum {} does not exist", name)))?;
            }
            Operation::CreateTrigger { table, name, .. } => {
                let model = self.table_mut(table).ok_or_else(|| missing_table(revision, table))?;
                if !model.triggers.insert(name.clone()) {
                    return Err(fail(format!("trigger {} already exists on {}", name, table)));
                }
            }
            Operation::DropTrigger { table, name } => {
                let model = self.table_mut(table).ok_or_else(|| missing_table(revision, table))?;
                if !model.triggers.remove(name) {
                    return Err(fail(format!("trigger {} does not exist on {}", name, table)));
                }
            }
            Operation::Backfill { table, .. } => {
                if !self.tables.contains_key(table) {
                    return Err(missing_table(revision, table));
                }
            }
        }

        Ok(())
    }

    fn table_mut(&mut self, table: &str) -> Option<&mut TableModel> {
        self.tables.get_mut(table)
    }

    fn column_mut(
        &mut self,
        revision: &str,
        table: &str,
        column: &str,
    ) -> GovernanceResult<&mut ColumnModel> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| missing_table(revision, table))?
            .columns
            .get_mut(column)
            .ok_or_else(|| {
                GovernanceError::chain(revision, format!("column {}.{} does not exist", table, column))
            })
    }

    /// SHA-256 over the compared surface: tables, columns, types, nullability, defaults
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();

        // BTreeMap iteration is already sorted
        for (table_name, table) in &self.tables {
            hasher.update(format!("T:{}\n", table_name).as_bytes());
            for (column_name, column) in &table.columns {
                hasher.update(
                    format!(
                        "C:{}.{}:{}:{}:{}\n",
                        table_name,
                        column_name,
                        normalize_type(&column.data_type),
                        column.nullable,
                        column.server_default.as_deref().unwrap_or("")
                    )
                    .as_bytes(),
                );
            }
        }

        format!("{:x}", hasher.finalize())
    }
}

fn missing_table(revision: &str, table: &str) -> GovernanceError {
    GovernanceError::chain(revision, format!("table {} does not exist", table))
}

/// Lowercase with runs of whitespace collapsed
pub fn normalize_type(data_type: &str) -> String {
    data_type
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
