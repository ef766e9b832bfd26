//! Governance Pipeline Module
//!
//! Classifies every pending revision, gates it against the deployment context
//! and produces the `GovernanceRun` consumed by reporting:
//!
//! 1. **Classifier**: operation kinds to change categories and a base risk tier
//! 2. **Gate**: per-revision admission decision for the target environment
//! 3. **Orchestrator**: range selection, run state machine and audit hand-off

pub mod classifier;
pub mod gate;
pub mod orchestrator;
pub mod types;

pub use orchestrator::{record_decisions, GovernancePipeline};
pub use types::{ChangeCategory, Decision, GovernanceRun, RiskLevel, RunContext};
