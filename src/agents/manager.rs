use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::approvals::ApprovalSource;
use super::audit::AuditRecorder;
use super::errors::{CoordinationError, CoordinationResult};
use super::events::{AgentEvent, AgentEventKind, EventBus, PublishReport};
use super::gates::GateController;
use super::messages::{AgentMessage, AgentMessenger};
use super::queue::{Eligibility, WorkQueue};
use super::state::WorkflowSnapshot;
use super::types::COORDINATOR_ID;
use super::worker::DEFAULT_POLL_INTERVAL;
use crate::config::CoordinatorConfig;
use crate::domain::gate::GateDecision;
use crate::domain::work_item::{WorkItem, WorkItemId};

/// What happened when an agent reported a result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompletionOutcome {
    /// Every gate passed; the item is completed
    Completed {
        newly_eligible: Vec<WorkItemId>,
        decisions: Vec<GateDecision>,
    },
    /// At least one gate blocked; the item stays in progress, awaiting gate
    Held { decisions: Vec<GateDecision> },
}

impl CompletionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, CompletionOutcome::Completed { .. })
    }

    pub fn decisions(&self) -> &[GateDecision] {
        match self {
            CompletionOutcome::Completed { decisions, .. } | CompletionOutcome::Held { decisions } => {
                decisions
            }
        }
    }

    /// One `GateValidation` error per blocking decision
    pub fn rejections(&self) -> Vec<CoordinationError> {
        self.decisions()
            .iter()
            .filter(|d| d.is_blocking())
            .map(|d| {
                let errors = if d.is_valid {
                    let reason = if d.is_awaiting_approval() {
                        "human approval pending"
                    } else {
                        "human approval denied"
                    };
                    vec![reason.to_string()]
                } else {
                    d.errors.clone()
                };
                CoordinationError::GateValidation {
                    work_item_id: d.work_item_id.clone(),
                    gate_name: d.gate_name.clone(),
                    errors,
                }
            })
            .collect()
    }
}

/// Composes the queue, bus, messenger, gates and audit log into one
/// workflow. Each component keeps its own lock; the coordinator never holds
/// two at once.
pub struct WorkflowCoordinator {
    queue: Arc<WorkQueue>,
    bus: Arc<EventBus>,
    messenger: Arc<AgentMessenger>,
    gates: Arc<GateController>,
    audit: Arc<AuditRecorder>,
    poll_interval: Duration,
}

impl WorkflowCoordinator {
    pub fn new(
        queue: Arc<WorkQueue>,
        bus: Arc<EventBus>,
        messenger: Arc<AgentMessenger>,
        gates: Arc<GateController>,
        audit: Arc<AuditRecorder>,
    ) -> Self {
        Self {
            queue,
            bus,
            messenger,
            gates,
            audit,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Idle delay handed to worker agents built over this coordinator
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Builds every component around a shared audit recorder
    pub fn from_config(
        config: &CoordinatorConfig,
        approvals: Arc<dyn ApprovalSource>,
        audit: Arc<AuditRecorder>,
    ) -> Self {
        Self::new(
            Arc::new(WorkQueue::new(Arc::clone(&audit))),
            Arc::new(EventBus::new(Arc::clone(&audit))),
            Arc::new(AgentMessenger::new(
                Arc::clone(&audit),
                config.mailbox_warn_threshold,
            )),
            Arc::new(GateController::new(
                approvals,
                config.approval_timeout,
                Arc::clone(&audit),
            )),
            audit,
        )
        .with_poll_interval(config.poll_interval)
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn messenger(&self) -> &Arc<AgentMessenger> {
        &self.messenger
    }

    pub fn gates(&self) -> &Arc<GateController> {
        &self.gates
    }

    pub fn audit(&self) -> &Arc<AuditRecorder> {
        &self.audit
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub async fn add_work(&self, item: WorkItem) -> CoordinationResult<()> {
        self.queue.add_work(item).await
    }

    pub async fn next_work(&self, agent_id: &str) -> CoordinationResult<Option<WorkItem>> {
        self.queue.next_work(agent_id).await
    }

    pub async fn get(&self, id: &str) -> CoordinationResult<WorkItem> {
        self.queue.get(id).await
    }

    pub async fn check_eligibility(&self, id: &str) -> CoordinationResult<Eligibility> {
        self.queue.check_eligibility(id).await
    }

    pub async fn snapshot(&self) -> WorkflowSnapshot {
        self.queue.snapshot().await
    }

    /// Runs the agent's mandatory gates, then completes the item if none
    /// of them blocks.
    ///
    /// # Arguments
    /// * `id` - An in-progress work item
    /// * `result` - The agent's work product
    /// * `gate_data` - What the gates inspect (usually the agent's own
    ///   `ValidationResult`)
    pub async fn complete(
        &self,
        id: &str,
        result: serde_json::Value,
        gate_data: serde_json::Value,
    ) -> CoordinationResult<CompletionOutcome> {
        self.complete_with_gates(id, result, gate_data, &[]).await
    }

    /// Like [`complete`](Self::complete), also evaluating `extra_gates`.
    /// Extra names with no registered gate pass through with a warning.
    pub async fn complete_with_gates(
        &self,
        id: &str,
        result: serde_json::Value,
        gate_data: serde_json::Value,
        extra_gates: &[&str],
    ) -> CoordinationResult<CompletionOutcome> {
        self.queue.hold_for_gates(id).await?;
        let item = self.queue.get(id).await?;

        let mut gate_names = self.gates.mandatory_gates(item.agent_id()).await;
        for extra in extra_gates {
            if !gate_names.iter().any(|name| name == extra) {
                gate_names.push(extra.to_string());
            }
        }

        let mut decisions = Vec::with_capacity(gate_names.len());
        for gate_name in &gate_names {
            let mut decision = self.gates.evaluate_gate(gate_name, &item, &gate_data).await;

            // Invalid output is never put in front of a human
            if decision.is_valid && decision.requires_human_approval {
                let context = format!("{} ({}) from {}", item.id(), item.work_type(), item.agent_id());
                if let Err(e) = self.gates.request_approval(&mut decision, &context).await {
                    warn!(work_item_id = %id, error = %e, "Approval not obtained");
                }
            }

            self.queue.record_gate_decision(id, decision.clone()).await?;
            let kind = if decision.is_blocking() {
                AgentEventKind::GateFailed
            } else {
                AgentEventKind::GatePassed
            };
            self.publish(AgentEvent::new(kind, item.agent_id(), serde_json::to_value(&decision)?))
                .await;
            decisions.push(decision);
        }

        if decisions.iter().any(GateDecision::is_blocking) {
            let outcome = CompletionOutcome::Held { decisions };
            for rejection in outcome.rejections() {
                warn!(work_item_id = %id, "{}", rejection);
            }
            return Ok(outcome);
        }

        let newly_eligible = self.queue.release_gated(id, result.clone()).await?;
        self.publish(AgentEvent::new(
            AgentEventKind::WorkCompleted,
            item.agent_id(),
            json!({
                "work_item_id": id,
                "work_type": item.work_type(),
                "result": result,
                "newly_eligible": newly_eligible,
            }),
        ))
        .await;

        Ok(CompletionOutcome::Completed {
            newly_eligible,
            decisions,
        })
    }

    /// Fails an in-progress item and announces which pending items it
    /// blocks for good.
    pub async fn fail(&self, id: &str, reason: &str) -> CoordinationResult<Vec<WorkItemId>> {
        let item = self.queue.get(id).await?;
        let blocked = self.queue.fail_work(id, reason).await?;
        self.publish(AgentEvent::new(
            AgentEventKind::Error,
            item.agent_id(),
            json!({
                "work_item_id": id,
                "error": reason,
                "blocked": blocked,
            }),
        ))
        .await;
        Ok(blocked)
    }

    /// Passes a work product to the next phase's agent and announces the
    /// phase transition.
    pub async fn handoff(
        &self,
        from_agent: &str,
        to_agent: &str,
        work_product: serde_json::Value,
    ) -> CoordinationResult<AgentMessage> {
        let message = self.messenger.handoff(from_agent, to_agent, work_product).await?;
        info!(from = from_agent, to = to_agent, correlation_id = %message.correlation_id, "Phase handoff");
        self.publish(AgentEvent::new(
            AgentEventKind::PhaseTransition,
            from_agent,
            json!({
                "from": from_agent,
                "to": to_agent,
                "correlation_id": message.correlation_id,
            }),
        ))
        .await;
        Ok(message)
    }

    async fn publish(&self, event: AgentEvent) -> PublishReport {
        let report = self.bus.publish(event).await;
        if !report.is_clean() {
            warn!(
                actor = COORDINATOR_ID,
                failed = report.failures.len(),
                "Some event handlers failed"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::approvals::{AutoApprove, PendingApprovals};
    use crate::agents::gates::{FnGate, GateScope, ValidationGate};
    use crate::domain::audit::AuditAction;
    use crate::domain::gate::{ApprovalOutcome, ValidationResult};
    use crate::domain::work_item::WorkStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn coordinator() -> WorkflowCoordinator {
        let config = CoordinatorConfig {
            approval_timeout: Duration::from_millis(50),
            ..CoordinatorConfig::default()
        };
        WorkflowCoordinator::from_config(
            &config,
            Arc::new(AutoApprove),
            Arc::new(AuditRecorder::default()),
        )
    }

    fn item(id: &str, agent: &str, deps: &[&str]) -> WorkItem {
        WorkItem::new(
            id,
            agent,
            "task",
            json!({}),
            deps.iter().map(|d| d.to_string()).collect(),
        )
    }

    #[tokio::test]
    async fn complete_without_gates_unblocks_dependents() {
        let coordinator = coordinator();
        coordinator.add_work(item("a", "agent1", &[])).await.unwrap();
        coordinator.add_work(item("b", "agent2", &["a"])).await.unwrap();
        coordinator.next_work("agent1").await.unwrap().unwrap();

        let outcome = coordinator
            .complete("a", json!({"out": 1}), json!({}))
            .await
            .unwrap();

        match outcome {
            CompletionOutcome::Completed { newly_eligible, decisions } => {
                assert_eq!(newly_eligible, vec!["b".to_string()]);
                assert!(decisions.is_empty());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(coordinator.get("a").await.unwrap().status(), WorkStatus::Completed);
    }

    #[tokio::test]
    async fn failing_gate_holds_item_and_keeps_dependents_waiting() {
        let coordinator = coordinator();
        coordinator
            .gates()
            .register(
                GateScope::Agent("agent1".into()),
                Arc::new(ValidationGate::new("schema", 0.7)),
            )
            .await;
        coordinator.add_work(item("a", "agent1", &[])).await.unwrap();
        coordinator.add_work(item("b", "agent2", &["a"])).await.unwrap();
        coordinator.next_work("agent1").await.unwrap();

        let gate_data = serde_json::to_value(ValidationResult::valid(0.2)).unwrap();
        let outcome = coordinator.complete("a", json!({}), gate_data).await.unwrap();

        assert!(!outcome.is_completed());
        assert_eq!(outcome.rejections().len(), 1);
        let held = coordinator.get("a").await.unwrap();
        assert_eq!(held.status(), WorkStatus::InProgress);
        assert!(held.is_awaiting_gate());
        assert_eq!(held.gate_decisions().len(), 1);
        assert!(coordinator.next_work("agent2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn held_item_can_be_resubmitted() {
        let coordinator = coordinator();
        coordinator
            .gates()
            .register(GateScope::AllAgents, Arc::new(ValidationGate::new("schema", 0.7)))
            .await;
        coordinator.add_work(item("a", "agent1", &[])).await.unwrap();
        coordinator.next_work("agent1").await.unwrap();

        let low = serde_json::to_value(ValidationResult::valid(0.1)).unwrap();
        let high = serde_json::to_value(ValidationResult::valid(0.9)).unwrap();
        assert!(!coordinator.complete("a", json!({}), low).await.unwrap().is_completed());
        assert!(coordinator.complete("a", json!({}), high).await.unwrap().is_completed());

        let done = coordinator.get("a").await.unwrap();
        assert_eq!(done.gate_decisions().len(), 1);
        assert!(done.gate_decisions()[0].is_valid);
    }

    #[tokio::test]
    async fn held_item_cannot_bypass_gates_through_queue() {
        let coordinator = coordinator();
        coordinator
            .gates()
            .register(GateScope::AllAgents, Arc::new(ValidationGate::new("schema", 0.7)))
            .await;
        coordinator.add_work(item("a", "agent1", &[])).await.unwrap();
        coordinator.add_work(item("b", "agent2", &["a"])).await.unwrap();
        coordinator.next_work("agent1").await.unwrap();

        let low = serde_json::to_value(ValidationResult::valid(0.1)).unwrap();
        assert!(!coordinator.complete("a", json!({}), low).await.unwrap().is_completed());

        let err = coordinator
            .queue()
            .complete_work("a", json!({"forced": true}))
            .await
            .unwrap_err();

        assert!(matches!(err, CoordinationError::AwaitingGate(_)));
        let held = coordinator.get("a").await.unwrap();
        assert_eq!(held.status(), WorkStatus::InProgress);
        assert!(held.is_awaiting_gate());
        assert!(held.result().is_none());
        assert!(coordinator.next_work("agent2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unanswered_approval_times_out_and_holds_item() {
        let audit = Arc::new(AuditRecorder::default());
        let config = CoordinatorConfig {
            approval_timeout: Duration::from_millis(20),
            ..CoordinatorConfig::default()
        };
        let coordinator = WorkflowCoordinator::from_config(
            &config,
            Arc::new(PendingApprovals::new()),
            Arc::clone(&audit),
        );
        coordinator
            .gates()
            .register(
                GateScope::AllAgents,
                Arc::new(FnGate::new("sign_off", |_, _| ValidationResult::valid(1.0)).with_approval()),
            )
            .await;
        coordinator.add_work(item("a", "agent1", &[])).await.unwrap();
        coordinator.add_work(item("b", "agent2", &["a"])).await.unwrap();
        coordinator.next_work("agent1").await.unwrap();

        let outcome = coordinator.complete("a", json!({}), json!({})).await.unwrap();

        match &outcome {
            CompletionOutcome::Held { decisions } => {
                assert_eq!(decisions[0].approval, Some(ApprovalOutcome::Denied));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        let rejections = outcome.rejections();
        assert_eq!(rejections.len(), 1);
        assert!(rejections[0].to_string().contains("human approval denied"));

        let held = coordinator.get("a").await.unwrap();
        assert_eq!(held.status(), WorkStatus::InProgress);
        assert!(held.is_awaiting_gate());
        assert!(coordinator.next_work("agent2").await.unwrap().is_none());

        let timeouts = audit
            .recent(100)
            .into_iter()
            .filter(|entry| entry.action == AuditAction::ApprovalTimedOut)
            .count();
        assert_eq!(timeouts, 1);
    }

    #[test]
    fn poll_interval_comes_from_config() {
        let config = CoordinatorConfig {
            poll_interval: Duration::from_millis(5),
            ..CoordinatorConfig::default()
        };
        let coordinator = WorkflowCoordinator::from_config(
            &config,
            Arc::new(AutoApprove),
            Arc::new(AuditRecorder::default()),
        );

        assert_eq!(coordinator.poll_interval(), Duration::from_millis(5));
    }

    #[tokio::test]
    async fn extra_unconfigured_gate_passes_through() {
        let coordinator = coordinator();
        coordinator.add_work(item("a", "agent1", &[])).await.unwrap();
        coordinator.next_work("agent1").await.unwrap();

        let outcome = coordinator
            .complete_with_gates("a", json!({}), json!({}), &["coverage_check"])
            .await
            .unwrap();

        assert!(outcome.is_completed());
        assert_eq!(outcome.decisions()[0].warnings.len(), 1);
    }

    #[tokio::test]
    async fn approved_gate_completes_item() {
        let coordinator = coordinator();
        coordinator
            .gates()
            .register(
                GateScope::AllAgents,
                Arc::new(FnGate::new("review", |_, _| ValidationResult::valid(1.0)).with_approval()),
            )
            .await;
        coordinator.add_work(item("a", "agent1", &[])).await.unwrap();
        coordinator.next_work("agent1").await.unwrap();

        let outcome = coordinator.complete("a", json!({}), json!({})).await.unwrap();

        assert!(outcome.is_completed());
        assert_eq!(outcome.decisions()[0].approval, Some(ApprovalOutcome::Granted));
    }

    #[tokio::test]
    async fn events_are_published_for_gates_and_completion() {
        let coordinator = coordinator();
        let passed = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        {
            let passed = Arc::clone(&passed);
            coordinator
                .bus()
                .subscribe_fn(AgentEventKind::GatePassed, move |_| {
                    let passed = Arc::clone(&passed);
                    async move {
                        passed.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                })
                .await;
        }
        {
            let completed = Arc::clone(&completed);
            coordinator
                .bus()
                .subscribe_fn(AgentEventKind::WorkCompleted, move |event| {
                    let completed = Arc::clone(&completed);
                    let id = event.data["work_item_id"].clone();
                    async move {
                        assert_eq!(id, "a");
                        completed.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                })
                .await;
        }
        coordinator.add_work(item("a", "agent1", &[])).await.unwrap();
        coordinator.next_work("agent1").await.unwrap();

        coordinator
            .complete_with_gates("a", json!({}), json!({}), &["lint"])
            .await
            .unwrap();

        assert_eq!(passed.load(Ordering::SeqCst), 1);
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fail_reports_blocked_dependents() {
        let coordinator = coordinator();
        coordinator.add_work(item("a", "agent1", &[])).await.unwrap();
        coordinator.add_work(item("b", "agent2", &["a"])).await.unwrap();
        coordinator.add_work(item("c", "agent3", &["b"])).await.unwrap();
        coordinator.next_work("agent1").await.unwrap();

        let blocked = coordinator.fail("a", "boom").await.unwrap();

        assert_eq!(blocked, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(coordinator.get("a").await.unwrap().status(), WorkStatus::Failed);
        assert!(matches!(
            coordinator.check_eligibility("c").await,
            Err(CoordinationError::BlockedByFailedDependency { .. })
        ));
    }

    #[tokio::test]
    async fn complete_of_pending_item_is_rejected() {
        let coordinator = coordinator();
        coordinator.add_work(item("a", "agent1", &[])).await.unwrap();

        assert!(coordinator.complete("a", json!({}), json!({})).await.is_err());
        assert!(matches!(
            coordinator.complete("zzz", json!({}), json!({})).await,
            Err(CoordinationError::UnknownWorkItem(_))
        ));
    }

    #[tokio::test]
    async fn handoff_delivers_message_and_publishes_transition() {
        let coordinator = coordinator();
        let transitions = Arc::new(AtomicUsize::new(0));
        {
            let transitions = Arc::clone(&transitions);
            coordinator
                .bus()
                .subscribe_fn(AgentEventKind::PhaseTransition, move |_| {
                    let transitions = Arc::clone(&transitions);
                    async move {
                        transitions.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                })
                .await;
        }

        let message = coordinator
            .handoff("research", "writer", json!({"notes": "n"}))
            .await
            .unwrap();

        assert!(message.phase_transition);
        assert_eq!(coordinator.messenger().receive("writer").await.len(), 1);
        assert_eq!(transitions.load(Ordering::SeqCst), 1);
    }
}
