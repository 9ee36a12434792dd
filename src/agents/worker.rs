use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

use super::errors::CoordinationResult;
use super::events::{AgentEvent, AgentEventKind, EventHandler};
use super::manager::{CompletionOutcome, WorkflowCoordinator};
use super::types::{AgentRequest, AgentResponse, ValidationResult};
use crate::domain::work_item::WorkItemId;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A unit of domain logic the coordinator can dispatch work to
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> &str;

    /// Does the work described by `request`. Any error fails the work item.
    async fn process_request(&self, request: AgentRequest) -> CoordinationResult<AgentResponse>;

    /// Self-assessment of a work product, handed to the quality gates
    async fn validate_output(&self, output: &serde_json::Value) -> ValidationResult;
}

/// Result of one dispatch attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Nothing was eligible for this agent
    Idle,
    Completed {
        work_item_id: WorkItemId,
        newly_eligible: Vec<WorkItemId>,
    },
    /// A gate blocked the result; the item waits in progress
    Held {
        work_item_id: WorkItemId,
        rejections: Vec<String>,
    },
    Failed {
        work_item_id: WorkItemId,
        reason: String,
        blocked: Vec<WorkItemId>,
    },
}

/// Drives an [`Agent`]: pulls its next eligible item, runs it, and reports
/// the outcome back to the coordinator.
pub struct WorkerAgent {
    agent: Arc<dyn Agent>,
    coordinator: Arc<WorkflowCoordinator>,
    poll_interval: Duration,
}

impl WorkerAgent {
    /// Polls at the coordinator's configured interval
    pub fn new(agent: Arc<dyn Agent>, coordinator: Arc<WorkflowCoordinator>) -> Self {
        let poll_interval = coordinator.poll_interval();
        Self {
            agent,
            coordinator,
            poll_interval,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn agent_id(&self) -> &str {
        self.agent.id()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Processes at most one work item
    pub async fn run_once(&self) -> CoordinationResult<StepOutcome> {
        let agent_id = self.agent.id();
        let Some(item) = self.coordinator.next_work(agent_id).await? else {
            return Ok(StepOutcome::Idle);
        };
        let work_item_id = item.id().to_string();
        debug!(agent_id, work_item_id = %work_item_id, "Processing work item");

        let response = match self
            .agent
            .process_request(AgentRequest::for_work_item(&item))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let reason = e.to_string();
                warn!(agent_id, work_item_id = %work_item_id, error = %reason, "Agent failed work item");
                let blocked = self.coordinator.fail(&work_item_id, &reason).await?;
                return Ok(StepOutcome::Failed {
                    work_item_id,
                    reason,
                    blocked,
                });
            }
        };

        let validation = self.agent.validate_output(&response.data).await;
        let gate_data = serde_json::to_value(&validation)?;
        let outcome = self
            .coordinator
            .complete(&work_item_id, response.data, gate_data)
            .await?;

        Ok(match outcome {
            CompletionOutcome::Completed { newly_eligible, .. } => StepOutcome::Completed {
                work_item_id,
                newly_eligible,
            },
            held @ CompletionOutcome::Held { .. } => StepOutcome::Held {
                work_item_id,
                rejections: held.rejections().iter().map(ToString::to_string).collect(),
            },
        })
    }

    /// Loops until `shutdown` turns true (or its sender is dropped).
    ///
    /// When idle the worker sleeps for the poll interval, waking early
    /// whenever any item completes. An item that vanished from under the
    /// worker (completed or failed elsewhere) is skipped; any other error
    /// stops the loop. Returns the number of items handled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> CoordinationResult<usize> {
        let wake = Arc::new(Notify::new());
        let token = self
            .coordinator
            .bus()
            .subscribe(
                AgentEventKind::WorkCompleted,
                Arc::new(WakeOnEvent(Arc::clone(&wake))),
            )
            .await;
        info!(agent_id = self.agent.id(), "Worker started");

        let mut handled = 0;
        let result = loop {
            let stopping = *shutdown.borrow();
            if stopping {
                break Ok(handled);
            }
            match self.run_once().await {
                Ok(StepOutcome::Idle) => {
                    tokio::select! {
                        _ = wake.notified() => {}
                        _ = tokio::time::sleep(self.poll_interval) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break Ok(handled);
                            }
                        }
                    }
                }
                Ok(_) => handled += 1,
                Err(e) if e.is_structural() => {
                    warn!(agent_id = self.agent.id(), error = %e, "Skipping work item");
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(e) => break Err(e),
            }
        };

        self.coordinator.bus().unsubscribe(token).await;
        info!(agent_id = self.agent.id(), handled, "Worker stopped");
        result
    }
}

struct WakeOnEvent(Arc<Notify>);

#[async_trait]
impl EventHandler for WakeOnEvent {
    async fn handle(&self, _event: &AgentEvent) -> Result<(), String> {
        // notify_one stores a permit if the worker is not waiting yet
        self.0.notify_one();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::approvals::AutoApprove;
    use crate::agents::audit::AuditRecorder;
    use crate::agents::errors::CoordinationError;
    use crate::agents::gates::{GateScope, ValidationGate};
    use crate::config::CoordinatorConfig;
    use crate::domain::work_item::{WorkItem, WorkStatus};
    use serde_json::json;

    struct EchoAgent {
        id: String,
        confidence: f64,
        fail: bool,
    }

    #[async_trait]
    impl Agent for EchoAgent {
        fn id(&self) -> &str {
            &self.id
        }

        async fn process_request(&self, request: AgentRequest) -> CoordinationResult<AgentResponse> {
            if self.fail {
                return Err(CoordinationError::Provider("model unavailable".into()));
            }
            let data = json!({"echo": request.data});
            Ok(AgentResponse::reply_to(&request, "echo", data))
        }

        async fn validate_output(&self, _output: &serde_json::Value) -> ValidationResult {
            ValidationResult::valid(self.confidence)
        }
    }

    fn setup(agent: EchoAgent) -> (Arc<WorkflowCoordinator>, WorkerAgent) {
        let coordinator = Arc::new(WorkflowCoordinator::from_config(
            &CoordinatorConfig::default(),
            Arc::new(AutoApprove),
            Arc::new(AuditRecorder::default()),
        ));
        let worker = WorkerAgent::new(Arc::new(agent), Arc::clone(&coordinator))
            .with_poll_interval(Duration::from_millis(10));
        (coordinator, worker)
    }

    fn echo(id: &str) -> EchoAgent {
        EchoAgent {
            id: id.to_string(),
            confidence: 0.9,
            fail: false,
        }
    }

    #[tokio::test]
    async fn run_once_is_idle_without_work() {
        let (_, worker) = setup(echo("agent1"));

        assert!(matches!(worker.run_once().await.unwrap(), StepOutcome::Idle));
    }

    #[tokio::test]
    async fn run_once_completes_item_with_agent_output() {
        let (coordinator, worker) = setup(echo("agent1"));
        coordinator
            .add_work(WorkItem::new("a", "agent1", "t", json!({"x": 1}), vec![]))
            .await
            .unwrap();

        let outcome = worker.run_once().await.unwrap();

        assert!(matches!(outcome, StepOutcome::Completed { ref work_item_id, .. } if work_item_id == "a"));
        let item = coordinator.get("a").await.unwrap();
        assert_eq!(item.status(), WorkStatus::Completed);
        assert_eq!(item.result(), Some(&json!({"echo": {"x": 1}})));
    }

    #[tokio::test]
    async fn agent_error_fails_item_with_reason() {
        let (coordinator, worker) = setup(EchoAgent {
            fail: true,
            ..echo("agent1")
        });
        coordinator
            .add_work(WorkItem::new("a", "agent1", "t", json!({}), vec![]))
            .await
            .unwrap();

        let outcome = worker.run_once().await.unwrap();

        assert!(matches!(outcome, StepOutcome::Failed { .. }));
        let item = coordinator.get("a").await.unwrap();
        assert_eq!(item.status(), WorkStatus::Failed);
        assert!(item.result().unwrap()["error"]
            .as_str()
            .unwrap()
            .contains("model unavailable"));
    }

    #[tokio::test]
    async fn low_confidence_output_is_held() {
        let (coordinator, worker) = setup(EchoAgent {
            confidence: 0.3,
            ..echo("agent1")
        });
        coordinator
            .gates()
            .register(GateScope::AllAgents, Arc::new(ValidationGate::new("confidence", 0.7)))
            .await;
        coordinator
            .add_work(WorkItem::new("a", "agent1", "t", json!({}), vec![]))
            .await
            .unwrap();

        let outcome = worker.run_once().await.unwrap();

        match outcome {
            StepOutcome::Held { rejections, .. } => assert_eq!(rejections.len(), 1),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(coordinator.get("a").await.unwrap().is_awaiting_gate());
    }

    /// Fails the item named in its input before answering
    struct WithdrawingAgent {
        coordinator: Arc<WorkflowCoordinator>,
    }

    #[async_trait]
    impl Agent for WithdrawingAgent {
        fn id(&self) -> &str {
            "agent1"
        }

        async fn process_request(&self, request: AgentRequest) -> CoordinationResult<AgentResponse> {
            if let Some(id) = request.data["withdraw"].as_str() {
                self.coordinator.fail(id, "withdrawn").await?;
            }
            Ok(AgentResponse::reply_to(&request, "done", json!({})))
        }

        async fn validate_output(&self, _output: &serde_json::Value) -> ValidationResult {
            ValidationResult::valid(1.0)
        }
    }

    #[test]
    fn worker_uses_configured_poll_interval() {
        let config = CoordinatorConfig {
            poll_interval: Duration::from_millis(5),
            ..CoordinatorConfig::default()
        };
        let coordinator = Arc::new(WorkflowCoordinator::from_config(
            &config,
            Arc::new(AutoApprove),
            Arc::new(AuditRecorder::default()),
        ));

        let worker = WorkerAgent::new(Arc::new(echo("agent1")), coordinator);

        assert_eq!(worker.poll_interval(), Duration::from_millis(5));
    }

    #[tokio::test]
    async fn run_skips_item_that_vanished_and_keeps_going() {
        let coordinator = Arc::new(WorkflowCoordinator::from_config(
            &CoordinatorConfig {
                poll_interval: Duration::from_millis(10),
                ..CoordinatorConfig::default()
            },
            Arc::new(AutoApprove),
            Arc::new(AuditRecorder::default()),
        ));
        let worker = WorkerAgent::new(
            Arc::new(WithdrawingAgent {
                coordinator: Arc::clone(&coordinator),
            }),
            Arc::clone(&coordinator),
        );
        coordinator
            .add_work(WorkItem::new("a", "agent1", "t", json!({"withdraw": "a"}), vec![]))
            .await
            .unwrap();
        coordinator
            .add_work(WorkItem::new("b", "agent1", "t", json!({}), vec![]))
            .await
            .unwrap();
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { worker.run(rx).await });
        for _ in 0..100 {
            if coordinator.snapshot().await.completed == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(true).unwrap();

        let handled = handle.await.unwrap().unwrap();
        assert_eq!(handled, 1);
        assert_eq!(coordinator.get("a").await.unwrap().status(), WorkStatus::Failed);
        assert_eq!(coordinator.get("b").await.unwrap().status(), WorkStatus::Completed);
    }

    #[tokio::test]
    async fn run_processes_until_shutdown() {
        let (coordinator, worker) = setup(echo("agent1"));
        coordinator
            .add_work(WorkItem::new("a", "agent1", "t", json!({}), vec![]))
            .await
            .unwrap();
        coordinator
            .add_work(WorkItem::new("b", "agent1", "t", json!({}), vec!["a".into()]))
            .await
            .unwrap();
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { worker.run(rx).await });
        for _ in 0..100 {
            if coordinator.snapshot().await.completed == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(true).unwrap();

        let handled = handle.await.unwrap().unwrap();
        assert_eq!(handled, 2);
        assert_eq!(
            coordinator.bus().subscriber_count(AgentEventKind::WorkCompleted).await,
            0
        );
    }
}
