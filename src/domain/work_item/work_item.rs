use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value_objects::{AgentId, InvalidTransition, Priority, WorkItemId, WorkStatus};
use crate::domain::gate::GateDecision;

/// A schedulable unit of an agent's work with declared dependencies
///
/// Status and result are only mutated through the transition methods below,
/// which the work queue drives. Items are never deleted, only marked
/// terminal, so they stay available for audit.
///
/// # Invariants
/// - Dependencies are an ordered set (no duplicates)
/// - Status transitions follow `Pending -> InProgress -> {Completed|Failed}`
/// - `awaiting_gate` can only be set while `InProgress`
///
/// # Example
/// ```
/// use pipeline_coordinator::domain::work_item::{WorkItem, WorkStatus};
///
/// let item = WorkItem::new(
///     "draft",
///     "writer",
///     "outline",
///     serde_json::json!({"topic": "rust"}),
///     vec!["research".to_string()],
/// );
///
/// assert_eq!(item.status(), WorkStatus::Pending);
/// assert_eq!(item.dependencies(), ["research".to_string()]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    id: WorkItemId,
    agent_id: AgentId,
    work_type: String,
    input: serde_json::Value,
    priority: Priority,
    status: WorkStatus,
    result: Option<serde_json::Value>,
    dependencies: Vec<WorkItemId>,
    awaiting_gate: bool,
    gate_decisions: Vec<GateDecision>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    /// Creates a new pending work item
    ///
    /// # Arguments
    /// * `id` - Caller-chosen unique id
    /// * `agent_id` - Agent the item is assigned to
    /// * `work_type` - Free-form tag describing the kind of work
    /// * `input` - Opaque input payload
    /// * `dependencies` - Ids that must complete first; repeats are collapsed
    pub fn new(
        id: impl Into<WorkItemId>,
        agent_id: impl Into<AgentId>,
        work_type: impl Into<String>,
        input: serde_json::Value,
        dependencies: Vec<WorkItemId>,
    ) -> Self {
        let mut ordered: Vec<WorkItemId> = Vec::with_capacity(dependencies.len());
        for dep in dependencies {
            if !ordered.contains(&dep) {
                ordered.push(dep);
            }
        }

        Self {
            id: id.into(),
            agent_id: agent_id.into(),
            work_type: work_type.into(),
            input,
            priority: Priority::default(),
            status: WorkStatus::Pending,
            result: None,
            dependencies: ordered,
            awaiting_gate: false,
            gate_decisions: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Creates a new pending work item with a generated id
    pub fn with_generated_id(
        agent_id: impl Into<AgentId>,
        work_type: impl Into<String>,
        input: serde_json::Value,
        dependencies: Vec<WorkItemId>,
    ) -> Self {
        Self::new(
            Uuid::new_v4().to_string(),
            agent_id,
            work_type,
            input,
            dependencies,
        )
    }

    /// Builds the replacement for a failed item: same agent, type, input
    /// and dependencies under a new id. The failed item is left untouched.
    pub fn retry_as(&self, new_id: impl Into<WorkItemId>) -> Self {
        Self::new(
            new_id,
            self.agent_id.clone(),
            self.work_type.clone(),
            self.input.clone(),
            self.dependencies.clone(),
        )
        .with_priority(self.priority)
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    // ===== Transitions =====

    /// Pending -> InProgress
    pub fn start(&mut self) -> Result<(), InvalidTransition> {
        self.transition(WorkStatus::InProgress)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// InProgress -> Completed, storing the result
    ///
    /// Refused while any recorded gate decision is blocking.
    pub fn complete(&mut self, result: serde_json::Value) -> Result<(), InvalidTransition> {
        if self.blocking_decision().is_some() {
            return Err(InvalidTransition {
                from: self.status,
                to: WorkStatus::Completed,
            });
        }
        self.transition(WorkStatus::Completed)?;
        self.result = Some(result);
        self.awaiting_gate = false;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// InProgress -> Failed, storing the reason as the result payload
    pub fn fail(&mut self, reason: &str) -> Result<(), InvalidTransition> {
        self.transition(WorkStatus::Failed)?;
        self.result = Some(serde_json::json!({ "error": reason }));
        self.awaiting_gate = false;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    fn transition(&mut self, next: WorkStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    // ===== Gate annotations =====

    /// Holds an in-progress item in the awaiting-gate sub-state.
    ///
    /// Each hold starts a fresh round: decisions from an earlier submission
    /// are discarded.
    pub fn hold_for_gates(&mut self) -> Result<(), InvalidTransition> {
        if self.status != WorkStatus::InProgress {
            return Err(InvalidTransition {
                from: self.status,
                to: WorkStatus::InProgress,
            });
        }
        self.awaiting_gate = true;
        self.gate_decisions.clear();
        Ok(())
    }

    /// Records a gate decision, replacing any earlier decision of the same gate
    pub fn record_gate_decision(&mut self, decision: GateDecision) {
        self.gate_decisions
            .retain(|existing| existing.gate_name != decision.gate_name);
        self.gate_decisions.push(decision);
    }

    // ===== Getters =====

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn work_type(&self) -> &str {
        &self.work_type
    }

    pub fn input(&self) -> &serde_json::Value {
        &self.input
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn status(&self) -> WorkStatus {
        self.status
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        self.result.as_ref()
    }

    pub fn dependencies(&self) -> &[WorkItemId] {
        &self.dependencies
    }

    /// True while the item is in progress and held by its gates
    pub fn is_awaiting_gate(&self) -> bool {
        self.awaiting_gate
    }

    /// First recorded decision that prevents completion
    pub fn blocking_decision(&self) -> Option<&GateDecision> {
        self.gate_decisions.iter().find(|d| d.is_blocking())
    }

    pub fn gate_decisions(&self) -> &[GateDecision] {
        &self.gate_decisions
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }
}
