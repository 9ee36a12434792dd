// Workflow state snapshots
//
// Read-only summaries of the work queue for inspection and the HTTP adapter.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::work_item::{WorkItem, WorkStatus};

/// Point-in-time view of one agent's queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentQueueState {
    /// Items still queued for the agent (not yet dispatched)
    pub queued: usize,
    /// Queued items that `next_work` would hand out right now
    pub eligible: usize,
    /// Dispatched items the agent currently holds
    pub in_progress: usize,
}

/// Point-in-time view of the whole work queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub awaiting_gate: usize,
    pub completed: usize,
    pub failed: usize,
    /// Pending items that can never run because an upstream item failed
    pub blocked: usize,
    pub agents: BTreeMap<String, AgentQueueState>,
}

impl WorkflowSnapshot {
    pub(crate) fn count(&mut self, item: &WorkItem) {
        self.total += 1;
        let agent = self.agents.entry(item.agent_id().to_string()).or_default();
        match item.status() {
            WorkStatus::Pending => self.pending += 1,
            WorkStatus::InProgress => {
                self.in_progress += 1;
                agent.in_progress += 1;
                if item.is_awaiting_gate() {
                    self.awaiting_gate += 1;
                }
            }
            WorkStatus::Completed => self.completed += 1,
            WorkStatus::Failed => self.failed += 1,
        }
    }

    /// True once no admitted item can make further progress
    pub fn is_settled(&self) -> bool {
        self.pending == self.blocked && self.in_progress == 0
    }
}
