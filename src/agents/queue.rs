// Dependency-aware work queue
//
// Tracks work items per assigned agent and releases an item only once every
// declared dependency has completed. All state sits behind one queue-level
// lock, so a given item is dispatched to at most one poller.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::audit::AuditRecorder;
use super::errors::{CoordinationError, CoordinationResult};
use super::state::WorkflowSnapshot;
use crate::domain::audit::AuditAction;
use crate::domain::gate::GateDecision;
use crate::domain::work_item::{InvalidTransition, WorkItem, WorkItemId, WorkStatus};

const QUEUE_ACTOR: &str = "work_queue";

/// Answer to "could this item run?"
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Eligibility {
    /// Pending with every dependency completed
    Eligible,
    /// Pending; these dependencies have not completed yet
    Waiting { pending: Vec<WorkItemId> },
    /// Already handed to its agent
    Dispatched { awaiting_gate: bool },
    /// Reached a terminal status
    Finished { status: WorkStatus },
}

#[derive(Default)]
struct QueueState {
    items: HashMap<WorkItemId, WorkItem>,
    /// Reverse dependency edges: id -> items that depend on it
    dependents: HashMap<WorkItemId, Vec<WorkItemId>>,
    /// Undispatched item ids per agent, in arrival order
    agent_queues: HashMap<String, VecDeque<WorkItemId>>,
}

impl QueueState {
    /// Returns the dependency through which `item` would close a cycle
    fn find_cycle(&self, item: &WorkItem) -> Option<WorkItemId> {
        for dep in item.dependencies() {
            let mut visited: HashSet<&str> = HashSet::new();
            let mut stack: Vec<&str> = vec![dep.as_str()];

            while let Some(current) = stack.pop() {
                if current == item.id() {
                    return Some(dep.clone());
                }
                if !visited.insert(current) {
                    continue;
                }
                if let Some(existing) = self.items.get(current) {
                    stack.extend(existing.dependencies().iter().map(String::as_str));
                }
            }
        }
        None
    }

    fn dependencies_completed(items: &HashMap<WorkItemId, WorkItem>, item: &WorkItem) -> bool {
        item.dependencies().iter().all(|dep| {
            items
                .get(dep)
                .is_some_and(|d| d.status() == WorkStatus::Completed)
        })
    }

    fn is_eligible(&self, item: &WorkItem) -> bool {
        item.status() == WorkStatus::Pending && Self::dependencies_completed(&self.items, item)
    }

    /// First failed item reachable through the dependency graph of `id`
    fn failed_upstream(&self, id: &str) -> Option<WorkItemId> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = self
            .items
            .get(id)
            .map(|item| item.dependencies().iter().map(String::as_str).collect())
            .unwrap_or_default();

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(item) = self.items.get(current) {
                if item.status() == WorkStatus::Failed {
                    return Some(item.id().to_string());
                }
                stack.extend(item.dependencies().iter().map(String::as_str));
            }
        }
        None
    }

    fn in_progress_mut(&mut self, id: &str) -> CoordinationResult<&mut WorkItem> {
        self.items
            .get_mut(id)
            .filter(|item| item.status() == WorkStatus::InProgress)
            .ok_or_else(|| CoordinationError::UnknownWorkItem(id.to_string()))
    }
}

pub struct WorkQueue {
    state: Mutex<QueueState>,
    audit: Arc<AuditRecorder>,
}

impl WorkQueue {
    pub fn new(audit: Arc<AuditRecorder>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            audit,
        }
    }

    /// Admits a pending work item.
    ///
    /// Rejected without touching the graph when the id is taken or when the
    /// item's dependencies would close a cycle (a self-dependency included).
    pub async fn add_work(&self, item: WorkItem) -> CoordinationResult<()> {
        let mut state = self.state.lock().await;

        if state.items.contains_key(item.id()) {
            return Err(CoordinationError::DuplicateId(item.id().to_string()));
        }
        if item.status() != WorkStatus::Pending {
            return Err(InvalidTransition {
                from: item.status(),
                to: WorkStatus::Pending,
            }
            .into());
        }
        if let Some(dependency) = state.find_cycle(&item) {
            return Err(CoordinationError::CyclicDependency {
                work_item_id: item.id().to_string(),
                dependency,
            });
        }

        let id = item.id().to_string();
        let agent_id = item.agent_id().to_string();
        for dep in item.dependencies() {
            state
                .dependents
                .entry(dep.clone())
                .or_default()
                .push(id.clone());
        }
        state
            .agent_queues
            .entry(agent_id.clone())
            .or_default()
            .push_back(id.clone());
        let summary = format!(
            "admitted {} ({}) depending on [{}]",
            id,
            item.work_type(),
            item.dependencies().join(", ")
        );
        state.items.insert(id.clone(), item);
        drop(state);

        info!(work_item_id = %id, agent_id = %agent_id, "Work item admitted");
        self.audit.record(QUEUE_ACTOR, AuditAction::WorkAdded, summary);
        Ok(())
    }

    /// Hands the agent its first eligible item in arrival order, moving it to
    /// `InProgress`. `None` means nothing is ready; that is not an error.
    pub async fn next_work(&self, agent_id: &str) -> CoordinationResult<Option<WorkItem>> {
        let mut state = self.state.lock().await;
        let QueueState {
            items,
            agent_queues,
            ..
        } = &mut *state;

        let Some(queue) = agent_queues.get_mut(agent_id) else {
            return Ok(None);
        };

        let position = queue.iter().position(|id| {
            items.get(id).is_some_and(|item| {
                item.status() == WorkStatus::Pending
                    && QueueState::dependencies_completed(items, item)
            })
        });
        let Some(id) = position.and_then(|pos| queue.remove(pos)) else {
            return Ok(None);
        };
        let item = items
            .get_mut(&id)
            .ok_or_else(|| CoordinationError::UnknownWorkItem(id.clone()))?;
        item.start()?;
        let dispatched = item.clone();
        drop(state);

        debug!(work_item_id = %id, agent_id, "Work item dispatched");
        self.audit
            .record(agent_id, AuditAction::WorkDispatched, format!("dispatched {}", id));
        Ok(Some(dispatched))
    }

    /// Marks an in-progress item completed and returns the dependents that
    /// just became eligible. Their status is left untouched.
    ///
    /// An item held for gate evaluation can only be released by the
    /// coordinator once its gate round has passed.
    pub async fn complete_work(
        &self,
        id: &str,
        result: serde_json::Value,
    ) -> CoordinationResult<Vec<WorkItemId>> {
        self.finish(id, result, false).await
    }

    /// Completes an item whose gate round has been recorded
    pub(crate) async fn release_gated(
        &self,
        id: &str,
        result: serde_json::Value,
    ) -> CoordinationResult<Vec<WorkItemId>> {
        self.finish(id, result, true).await
    }

    async fn finish(
        &self,
        id: &str,
        result: serde_json::Value,
        gated: bool,
    ) -> CoordinationResult<Vec<WorkItemId>> {
        let mut state = self.state.lock().await;
        let item = state.in_progress_mut(id)?;
        if item.is_awaiting_gate() && !gated {
            return Err(CoordinationError::AwaitingGate(id.to_string()));
        }
        if let Some(decision) = item.blocking_decision() {
            let errors = if decision.is_valid {
                vec!["human approval not granted".to_string()]
            } else {
                decision.errors.clone()
            };
            return Err(CoordinationError::GateValidation {
                work_item_id: id.to_string(),
                gate_name: decision.gate_name.clone(),
                errors,
            });
        }
        item.complete(result)?;
        let agent_id = item.agent_id().to_string();

        let newly_eligible: Vec<WorkItemId> = state
            .dependents
            .get(id)
            .map(|dependents| {
                dependents
                    .iter()
                    .filter(|dep| state.items.get(*dep).is_some_and(|d| state.is_eligible(d)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(state);

        info!(work_item_id = %id, agent_id = %agent_id, unblocked = newly_eligible.len(), "Work item completed");
        self.audit.record(
            &agent_id,
            AuditAction::WorkCompleted,
            format!("completed {}; now eligible [{}]", id, newly_eligible.join(", ")),
        );
        Ok(newly_eligible)
    }

    /// Marks an in-progress item failed and returns every pending item that
    /// is now permanently blocked by it (direct and transitive dependents).
    pub async fn fail_work(&self, id: &str, reason: &str) -> CoordinationResult<Vec<WorkItemId>> {
        let mut state = self.state.lock().await;
        let item = state.in_progress_mut(id)?;
        item.fail(reason)?;
        let agent_id = item.agent_id().to_string();

        let mut blocked = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut frontier: VecDeque<&str> = VecDeque::from([id]);
        while let Some(current) = frontier.pop_front() {
            for dependent in state.dependents.get(current).into_iter().flatten() {
                if !seen.insert(dependent.as_str()) {
                    continue;
                }
                if state
                    .items
                    .get(dependent)
                    .is_some_and(|d| d.status() == WorkStatus::Pending)
                {
                    blocked.push(dependent.clone());
                }
                frontier.push_back(dependent.as_str());
            }
        }
        drop(state);

        info!(work_item_id = %id, agent_id = %agent_id, blocked = blocked.len(), reason, "Work item failed");
        self.audit.record(
            &agent_id,
            AuditAction::WorkFailed,
            format!("failed {}: {}; blocked [{}]", id, reason, blocked.join(", ")),
        );
        Ok(blocked)
    }

    /// Puts an in-progress item in the awaiting-gate sub-state
    pub async fn hold_for_gates(&self, id: &str) -> CoordinationResult<()> {
        let mut state = self.state.lock().await;
        state.in_progress_mut(id)?.hold_for_gates()?;
        Ok(())
    }

    /// Annotates an in-progress item with a gate outcome
    pub async fn record_gate_decision(
        &self,
        id: &str,
        decision: GateDecision,
    ) -> CoordinationResult<()> {
        let mut state = self.state.lock().await;
        state.in_progress_mut(id)?.record_gate_decision(decision);
        Ok(())
    }

    /// Returns a copy of the item
    pub async fn get(&self, id: &str) -> CoordinationResult<WorkItem> {
        self.state
            .lock()
            .await
            .items
            .get(id)
            .cloned()
            .ok_or_else(|| CoordinationError::UnknownWorkItem(id.to_string()))
    }

    /// Reports whether the item could be dispatched, and why not.
    ///
    /// A pending item with a failed upstream dependency yields
    /// `BlockedByFailedDependency`: `next_work` will never return it.
    pub async fn check_eligibility(&self, id: &str) -> CoordinationResult<Eligibility> {
        let state = self.state.lock().await;
        let item = state
            .items
            .get(id)
            .ok_or_else(|| CoordinationError::UnknownWorkItem(id.to_string()))?;

        match item.status() {
            WorkStatus::InProgress => Ok(Eligibility::Dispatched {
                awaiting_gate: item.is_awaiting_gate(),
            }),
            status @ (WorkStatus::Completed | WorkStatus::Failed) => {
                Ok(Eligibility::Finished { status })
            }
            WorkStatus::Pending => {
                if let Some(failed_dependency) = state.failed_upstream(id) {
                    return Err(CoordinationError::BlockedByFailedDependency {
                        work_item_id: id.to_string(),
                        failed_dependency,
                    });
                }
                let pending: Vec<WorkItemId> = item
                    .dependencies()
                    .iter()
                    .filter(|dep| {
                        state
                            .items
                            .get(*dep)
                            .map_or(true, |d| d.status() != WorkStatus::Completed)
                    })
                    .cloned()
                    .collect();
                if pending.is_empty() {
                    Ok(Eligibility::Eligible)
                } else {
                    Ok(Eligibility::Waiting { pending })
                }
            }
        }
    }

    /// First failed item upstream of `id`, if any
    pub async fn failed_upstream(&self, id: &str) -> CoordinationResult<Option<WorkItemId>> {
        let state = self.state.lock().await;
        if !state.items.contains_key(id) {
            return Err(CoordinationError::UnknownWorkItem(id.to_string()));
        }
        Ok(state.failed_upstream(id))
    }

    pub async fn snapshot(&self) -> WorkflowSnapshot {
        let state = self.state.lock().await;
        let mut snapshot = WorkflowSnapshot::default();

        for item in state.items.values() {
            snapshot.count(item);
            if item.status() == WorkStatus::Pending && state.failed_upstream(item.id()).is_some() {
                snapshot.blocked += 1;
            }
        }
        for (agent_id, queue) in &state.agent_queues {
            let agent = snapshot.agents.entry(agent_id.clone()).or_default();
            agent.queued = queue.len();
            agent.eligible = queue
                .iter()
                .filter(|id| state.items.get(*id).is_some_and(|item| state.is_eligible(item)))
                .count();
        }
        snapshot
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
