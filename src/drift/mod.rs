//! Schema Drift Module
//!
//! Replays the applied revision chain into a schema model and diffs it against
//! the declared data model. A non-empty diff fails any release.

pub mod detector;
pub mod schema;

pub use detector::{DriftDetector, DriftReport};
pub use schema::SchemaModel;
