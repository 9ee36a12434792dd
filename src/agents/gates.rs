// Quality gates and human approval checkpoints
//
// The controller decides whether a work item may be honored as done. Gates
// are registered per agent or for all agents; asking for a gate nobody
// registered yields a pass-through decision so unconfigured gates never block.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::approvals::{ApprovalRequest, ApprovalSource};
use super::audit::AuditRecorder;
use super::errors::{CoordinationError, CoordinationResult};
use crate::domain::audit::AuditAction;
use crate::domain::gate::{ApprovalOutcome, GateDecision, ValidationResult};
use crate::domain::work_item::WorkItem;

const GATE_ACTOR: &str = "gate_controller";

pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(300);

/// An automated check over a finished work item
#[async_trait]
pub trait QualityGate: Send + Sync {
    fn name(&self) -> &str;

    /// Mandatory gates run on every completion of the agents they cover
    fn mandatory(&self) -> bool {
        true
    }

    /// A passing decision still needs human sign-off
    fn requires_approval(&self) -> bool {
        false
    }

    async fn check(&self, item: &WorkItem, data: &serde_json::Value) -> ValidationResult;
}

/// Reads gate data as the agent's own [`ValidationResult`] and requires a
/// minimum confidence.
pub struct ValidationGate {
    name: String,
    min_confidence: f64,
    requires_approval: bool,
}

impl ValidationGate {
    pub fn new(name: impl Into<String>, min_confidence: f64) -> Self {
        Self {
            name: name.into(),
            min_confidence,
            requires_approval: false,
        }
    }

    pub fn with_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }
}

#[async_trait]
impl QualityGate for ValidationGate {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires_approval(&self) -> bool {
        self.requires_approval
    }

    async fn check(&self, _item: &WorkItem, data: &serde_json::Value) -> ValidationResult {
        let mut validation: ValidationResult = match serde_json::from_value(data.clone()) {
            Ok(v) => v,
            Err(e) => {
                return ValidationResult::invalid(vec![format!(
                    "gate data is not a validation result: {}",
                    e
                )])
            }
        };

        if validation.is_valid && validation.confidence < self.min_confidence {
            validation.is_valid = false;
            validation.errors.push(format!(
                "confidence {:.2} below required {:.2}",
                validation.confidence, self.min_confidence
            ));
        }
        validation
    }
}

/// Gate backed by a plain closure
pub struct FnGate<F> {
    name: String,
    mandatory: bool,
    requires_approval: bool,
    check: F,
}

impl<F> FnGate<F>
where
    F: Fn(&WorkItem, &serde_json::Value) -> ValidationResult + Send + Sync,
{
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            mandatory: true,
            requires_approval: false,
            check,
        }
    }

    /// Only runs when asked for by name
    pub fn optional(mut self) -> Self {
        self.mandatory = false;
        self
    }

    pub fn with_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }
}

#[async_trait]
impl<F> QualityGate for FnGate<F>
where
    F: Fn(&WorkItem, &serde_json::Value) -> ValidationResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn mandatory(&self) -> bool {
        self.mandatory
    }

    fn requires_approval(&self) -> bool {
        self.requires_approval
    }

    async fn check(&self, item: &WorkItem, data: &serde_json::Value) -> ValidationResult {
        (self.check)(item, data)
    }
}

/// Which agents a registered gate covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateScope {
    Agent(String),
    AllAgents,
}

impl GateScope {
    fn covers(&self, agent_id: &str) -> bool {
        match self {
            GateScope::Agent(id) => id == agent_id,
            GateScope::AllAgents => true,
        }
    }
}

pub struct GateController {
    gates: RwLock<Vec<(GateScope, Arc<dyn QualityGate>)>>,
    approvals: Arc<dyn ApprovalSource>,
    approval_timeout: Duration,
    audit: Arc<AuditRecorder>,
}

impl GateController {
    pub fn new(
        approvals: Arc<dyn ApprovalSource>,
        approval_timeout: Duration,
        audit: Arc<AuditRecorder>,
    ) -> Self {
        Self {
            gates: RwLock::new(Vec::new()),
            approvals,
            approval_timeout,
            audit,
        }
    }

    /// Registers a gate, replacing one of the same name and scope
    pub async fn register(&self, scope: GateScope, gate: Arc<dyn QualityGate>) {
        let mut gates = self.gates.write().await;
        gates.retain(|(s, g)| !(s == &scope && g.name() == gate.name()));
        info!(gate = gate.name(), scope = ?scope, "Quality gate registered");
        gates.push((scope, gate));
    }

    /// Agent-scoped registrations shadow all-agent ones of the same name
    async fn lookup(&self, agent_id: &str, gate_name: &str) -> Option<Arc<dyn QualityGate>> {
        let gates = self.gates.read().await;
        let matching = |wanted: fn(&GateScope) -> bool| {
            gates
                .iter()
                .find(|(scope, gate)| {
                    wanted(scope) && scope.covers(agent_id) && gate.name() == gate_name
                })
                .map(|(_, gate)| Arc::clone(gate))
        };
        matching(|s| matches!(s, GateScope::Agent(_)))
            .or_else(|| matching(|s| matches!(s, GateScope::AllAgents)))
    }

    /// Names of the mandatory gates that apply to `agent_id`
    pub async fn mandatory_gates(&self, agent_id: &str) -> Vec<String> {
        let gates = self.gates.read().await;
        let mut names: Vec<String> = Vec::new();
        for (scope, gate) in gates.iter() {
            if scope.covers(agent_id) && !names.iter().any(|n| n == gate.name()) {
                names.push(gate.name().to_string());
            }
        }
        drop(gates);

        let mut mandatory = Vec::with_capacity(names.len());
        for name in names {
            if let Some(gate) = self.lookup(agent_id, &name).await {
                if gate.mandatory() {
                    mandatory.push(name);
                }
            }
        }
        mandatory
    }

    /// Runs the named gate for the item's agent.
    ///
    /// An unregistered gate yields a valid decision with a single warning.
    pub async fn evaluate_gate(
        &self,
        gate_name: &str,
        item: &WorkItem,
        data: &serde_json::Value,
    ) -> GateDecision {
        let decision = match self.lookup(item.agent_id(), gate_name).await {
            None => {
                debug!(gate = gate_name, work_item_id = item.id(), "Gate not configured; passing through");
                GateDecision::pass_through(gate_name, item.id())
            }
            Some(gate) => {
                let validation = gate.check(item, data).await;
                GateDecision::from_validation(
                    gate_name,
                    item.id(),
                    validation,
                    gate.requires_approval(),
                )
            }
        };

        self.audit.record(
            GATE_ACTOR,
            AuditAction::GateEvaluated,
            format!(
                "{} on {}: valid={} confidence={:.2} approval_required={}",
                gate_name,
                item.id(),
                decision.is_valid,
                decision.confidence,
                decision.requires_human_approval
            ),
        );
        decision
    }

    /// Asks for human sign-off when the decision requires it.
    ///
    /// Returns `Ok(None)` when no approval is needed. On timeout the decision
    /// is marked denied and `ApprovalTimeout` is returned.
    pub async fn request_approval(
        &self,
        decision: &mut GateDecision,
        context: &str,
    ) -> CoordinationResult<Option<ApprovalOutcome>> {
        if !decision.requires_human_approval {
            return Ok(None);
        }

        let request = ApprovalRequest::new(decision.clone(), context);
        self.audit.record(
            GATE_ACTOR,
            AuditAction::ApprovalRequested,
            format!("{} on {} ({})", decision.gate_name, decision.work_item_id, request.id),
        );

        let outcome = match tokio::time::timeout(
            self.approval_timeout,
            self.approvals.request_approval(request),
        )
        .await
        {
            Ok(Ok(true)) => ApprovalOutcome::Granted,
            Ok(Ok(false)) => ApprovalOutcome::Denied,
            Ok(Err(e)) => {
                warn!(gate = %decision.gate_name, work_item_id = %decision.work_item_id, error = %e, "Approval source failed; treating as denied");
                ApprovalOutcome::Denied
            }
            Err(_) => {
                decision.approval = Some(ApprovalOutcome::Denied);
                warn!(gate = %decision.gate_name, work_item_id = %decision.work_item_id, timeout = ?self.approval_timeout, "Approval timed out");
                self.audit.record(
                    GATE_ACTOR,
                    AuditAction::ApprovalTimedOut,
                    format!(
                        "{} on {} after {:?}",
                        decision.gate_name, decision.work_item_id, self.approval_timeout
                    ),
                );
                return Err(CoordinationError::ApprovalTimeout {
                    work_item_id: decision.work_item_id.clone(),
                    gate_name: decision.gate_name.clone(),
                    timeout: self.approval_timeout,
                });
            }
        };

        decision.approval = Some(outcome);
        let action = match outcome {
            ApprovalOutcome::Granted => AuditAction::ApprovalGranted,
            ApprovalOutcome::Denied | ApprovalOutcome::Pending => AuditAction::ApprovalDenied,
        };
        self.audit.record(
            GATE_ACTOR,
            action,
            format!("{} on {}", decision.gate_name, decision.work_item_id),
        );
        Ok(Some(outcome))
    }

    pub fn approval_timeout(&self) -> Duration {
        self.approval_timeout
    }
}
