//! Migration History Module
//!
//! Revisions, the operations they carry, the ordered chain they form and the
//! directory store they are loaded from.

pub mod graph;
pub mod revision;
pub mod store;

pub use graph::MigrationHistory;
pub use revision::{ColumnSpec, ForeignKeySpec, Operation, OperationKind, Revision};
pub use store::RevisionStore;
