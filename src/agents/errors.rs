use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::domain::work_item::InvalidTransition;

/// Errors that can occur in the coordination layer
#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("Adding work item {work_item_id} would create a dependency cycle through {dependency}")]
    CyclicDependency {
        work_item_id: String,
        dependency: String,
    },

    #[error("Work item id already exists: {0}")]
    DuplicateId(String),

    #[error("Unknown work item: {0}")]
    UnknownWorkItem(String),

    #[error("Work item {0} is awaiting gate evaluation")]
    AwaitingGate(String),

    #[error("Work item {work_item_id} is blocked by failed dependency {failed_dependency}")]
    BlockedByFailedDependency {
        work_item_id: String,
        failed_dependency: String,
    },

    #[error("Approval for gate '{gate_name}' on {work_item_id} timed out after {timeout:?}")]
    ApprovalTimeout {
        work_item_id: String,
        gate_name: String,
        timeout: Duration,
    },

    #[error("Gate '{gate_name}' rejected {work_item_id}: {}", errors.join("; "))]
    GateValidation {
        work_item_id: String,
        gate_name: String,
        errors: Vec<String>,
    },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Communication error: {0}")]
    Communication(String),

    #[error(transparent)]
    InvalidStateTransition(#[from] InvalidTransition),

    #[error("Unknown approval request: {0}")]
    UnknownApproval(Uuid),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CoordinationError {
    /// Structural errors are rejected before any state is touched
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::CyclicDependency { .. } | Self::DuplicateId(_) | Self::UnknownWorkItem(_)
        )
    }
}

pub type CoordinationResult<T> = Result<T, CoordinationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_validation_joins_errors() {
        let err = CoordinationError::GateValidation {
            work_item_id: "a".into(),
            gate_name: "lint".into(),
            errors: vec!["one".into(), "two".into()],
        };

        assert_eq!(err.to_string(), "Gate 'lint' rejected a: one; two");
    }

    #[test]
    fn structural_classification() {
        assert!(CoordinationError::DuplicateId("a".into()).is_structural());
        assert!(!CoordinationError::Provider("down".into()).is_structural());
    }
}
