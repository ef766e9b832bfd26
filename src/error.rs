//! Error handling module
//!
//! One error type for the whole governance subsystem. Chain and classification
//! errors abort a run; `ImmutabilityViolation` aborts only the offending write.

use crate::history::OperationKind;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

/// Governance-wide error type
#[derive(Error, Debug)]
pub enum GovernanceError {
    #[error("Chain error at revision {revision}: {reason}")]
    ChainError { revision: String, reason: String },

    #[error("Unknown revision: {0}")]
    UnknownRevision(String),

    #[error("Cycle detected in revision history after {visited} steps")]
    CycleDetected { visited: usize },

    #[error("Classification gap: operation '{operation}' in revision {revision} has no category mapping")]
    ClassificationGap {
        revision: String,
        operation: OperationKind,
    },

    #[error("Immutability violation: audit record {record_id} cannot be {operation}")]
    ImmutabilityViolation {
        record_id: Uuid,
        operation: &'static str,
    },

    #[error("Incomplete governance run: {0}")]
    IncompleteRun(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GovernanceError {
    pub fn chain(revision: impl Into<String>, reason: impl Into<String>) -> Self {
        GovernanceError::ChainError {
            revision: revision.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code used in JSON error bodies
    pub fn code(&self) -> &'static str {
        match self {
            GovernanceError::ChainError { .. } => "CHAIN_ERROR",
            GovernanceError::UnknownRevision(_) => "UNKNOWN_REVISION",
            GovernanceError::CycleDetected { .. } => "CYCLE_DETECTED",
            GovernanceError::ClassificationGap { .. } => "CLASSIFICATION_GAP",
            GovernanceError::ImmutabilityViolation { .. } => "IMMUTABILITY_VIOLATION",
            GovernanceError::IncompleteRun(_) => "INCOMPLETE_RUN",
            GovernanceError::NotFound(_) => "NOT_FOUND",
            GovernanceError::Validation(_) => "VALIDATION_ERROR",
            GovernanceError::Io(_) => "IO_ERROR",
            GovernanceError::Serialization(_) => "SERIALIZATION_ERROR",
            GovernanceError::Database(_) => "DATABASE_ERROR",
            GovernanceError::Pool(_) => "POOL_EXHAUSTED",
            GovernanceError::Config(_) => "CONFIG_ERROR",
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl IntoResponse for GovernanceError {
    fn into_response(self) -> Response {
        let (status, message, details) = match &self {
            GovernanceError::ChainError { .. } | GovernanceError::CycleDetected { .. } => {
                error!("Corrupted revision history: {}", self);
                (StatusCode::CONFLICT, self.to_string(), None)
            }
            GovernanceError::ClassificationGap { .. } => {
                error!("Governance run aborted: {}", self);
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string(), None)
            }
            GovernanceError::ImmutabilityViolation { .. } => {
                (StatusCode::CONFLICT, self.to_string(), None)
            }
            GovernanceError::UnknownRevision(_) | GovernanceError::NotFound(_) => {
                (StatusCode::NOT_FOUND, self.to_string(), None)
            }
            GovernanceError::IncompleteRun(_) | GovernanceError::Validation(_) => {
                (StatusCode::BAD_REQUEST, self.to_string(), None)
            }
            GovernanceError::Database(e) => {
                error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A database error occurred".to_string(),
                    Some(e.to_string()),
                )
            }
            GovernanceError::Pool(e) => {
                error!("Pool error: {:?}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Audit database connection pool exhausted".to_string(),
                    Some(e.to_string()),
                )
            }
            GovernanceError::Io(_)
            | GovernanceError::Serialization(_)
            | GovernanceError::Config(_) => {
                error!("Internal error: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                    Some(self.to_string()),
                )
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            message,
            error: details,
            code: Some(self.code().to_string()),
        });

        (status, body).into_response()
    }
}

/// Result type alias used throughout the crate
pub type GovernanceResult<T> = Result<T, GovernanceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immutability_violation_maps_to_conflict() {
        let err = GovernanceError::ImmutabilityViolation {
            record_id: Uuid::new_v4(),
            operation: "updated",
        };
        assert_eq!(err.code(), "IMMUTABILITY_VIOLATION");
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_classification_gap_names_revision() {
        let err = GovernanceError::ClassificationGap {
            revision: "a1b2c3".to_string(),
            operation: OperationKind::Backfill,
        };
        let message = err.to_string();
        assert!(message.contains("a1b2c3"));
        assert!(message.contains("backfill"));
    }
}
