use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unique identifier for a work item.
pub type WorkItemId = String;

/// Identifier of the agent a work item is assigned to.
pub type AgentId = String;

/// Represents the lifecycle status of a work item
///
/// # Status Transitions
/// ```text
/// Pending -> InProgress -> Completed
///                 └------> Failed
/// ```
///
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    /// Admitted and waiting for its dependencies / a poll from its agent
    Pending,
    /// Dispatched to exactly one agent
    InProgress,
    /// Finished and honored by every mandatory gate
    Completed,
    /// Finished unsuccessfully
    Failed,
}

impl WorkStatus {
    /// Checks if a transition from current status to next status is valid
    ///
    /// # Valid Transitions
    /// - Pending -> InProgress
    /// - InProgress -> Completed
    /// - InProgress -> Failed
    ///
    /// # Example
    /// ```
    /// use pipeline_coordinator::domain::work_item::WorkStatus;
    ///
    /// assert!(WorkStatus::Pending.can_transition_to(WorkStatus::InProgress));
    /// assert!(!WorkStatus::Pending.can_transition_to(WorkStatus::Completed));
    /// ```
    pub fn can_transition_to(&self, next: WorkStatus) -> bool {
        use WorkStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress) | (InProgress, Completed) | (InProgress, Failed)
        )
    }

    /// Returns true for `Completed` and `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkStatus::Completed | WorkStatus::Failed)
    }
}

impl std::fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkStatus::Pending => write!(f, "pending"),
            WorkStatus::InProgress => write!(f, "in_progress"),
            WorkStatus::Completed => write!(f, "completed"),
            WorkStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Rejected status change on a work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid work item transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: WorkStatus,
    pub to: WorkStatus,
}

/// Priority tag carried on agent requests.
///
/// Informational only: dispatch order is strict FIFO among eligible items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}
