use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of action captured in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    WorkAdded,
    WorkDispatched,
    WorkCompleted,
    WorkFailed,
    GateEvaluated,
    ApprovalRequested,
    ApprovalGranted,
    ApprovalDenied,
    ApprovalTimedOut,
    MessageSent,
    MessagesDrained,
    Handoff,
    EventDispatched,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::WorkAdded => "work_added",
            AuditAction::WorkDispatched => "work_dispatched",
            AuditAction::WorkCompleted => "work_completed",
            AuditAction::WorkFailed => "work_failed",
            AuditAction::GateEvaluated => "gate_evaluated",
            AuditAction::ApprovalRequested => "approval_requested",
            AuditAction::ApprovalGranted => "approval_granted",
            AuditAction::ApprovalDenied => "approval_denied",
            AuditAction::ApprovalTimedOut => "approval_timed_out",
            AuditAction::MessageSent => "message_sent",
            AuditAction::MessagesDrained => "messages_drained",
            AuditAction::Handoff => "handoff",
            AuditAction::EventDispatched => "event_dispatched",
        }
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("Unknown audit action: {}", s))
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only audit record
///
/// `sequence` is strictly increasing across the lifetime of a recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: AuditAction,
    pub summary: String,
}
