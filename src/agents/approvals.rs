// Human approval sources
//
// The gate controller asks an ApprovalSource for sign-off and bounds the wait
// with its own timeout. PendingApprovals parks each request until a human
// resolves it (over HTTP); AutoApprove is for local development only.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use super::errors::{CoordinationError, CoordinationResult};
use crate::domain::gate::GateDecision;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub work_item_id: String,
    pub gate_name: String,
    pub decision: GateDecision,
    pub context: String,
    pub reasoning: String,
    pub requested_at: DateTime<Utc>,
}

impl ApprovalRequest {
    pub fn new(decision: GateDecision, context: impl Into<String>) -> Self {
        let reasoning = format!(
            "gate '{}' passed with confidence {:.2}; {} warning(s), {} recommendation(s)",
            decision.gate_name,
            decision.confidence,
            decision.warnings.len(),
            decision.recommendations.len()
        );
        Self {
            id: Uuid::new_v4(),
            work_item_id: decision.work_item_id.clone(),
            gate_name: decision.gate_name.clone(),
            decision,
            context: context.into(),
            reasoning,
            requested_at: Utc::now(),
        }
    }
}

/// External sign-off authority
#[async_trait]
pub trait ApprovalSource: Send + Sync {
    /// Resolves to `true` when granted. May never resolve; callers bound it.
    async fn request_approval(&self, request: ApprovalRequest) -> Result<bool, String>;
}

/// Grants every request immediately
pub struct AutoApprove;

#[async_trait]
impl ApprovalSource for AutoApprove {
    async fn request_approval(&self, request: ApprovalRequest) -> Result<bool, String> {
        warn!(
            work_item_id = %request.work_item_id,
            gate = %request.gate_name,
            "Auto-approving gate; human review is disabled"
        );
        Ok(true)
    }
}

struct ParkedRequest {
    request: ApprovalRequest,
    responder: oneshot::Sender<bool>,
}

/// Approval inbox resolved by a human operator
#[derive(Default)]
pub struct PendingApprovals {
    parked: Mutex<HashMap<Uuid, ParkedRequest>>,
}

impl PendingApprovals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open requests, oldest first. Requests whose caller gave up are dropped.
    pub async fn list(&self) -> Vec<ApprovalRequest> {
        let mut parked = self.parked.lock().await;
        parked.retain(|_, entry| !entry.responder.is_closed());

        let mut requests: Vec<ApprovalRequest> =
            parked.values().map(|entry| entry.request.clone()).collect();
        requests.sort_by_key(|request| request.requested_at);
        requests
    }

    pub async fn resolve(&self, id: Uuid, approved: bool) -> CoordinationResult<()> {
        let entry = self
            .parked
            .lock()
            .await
            .remove(&id)
            .ok_or(CoordinationError::UnknownApproval(id))?;

        entry
            .responder
            .send(approved)
            .map_err(|_| CoordinationError::UnknownApproval(id))?;
        info!(approval_id = %id, work_item_id = %entry.request.work_item_id, approved, "Approval resolved");
        Ok(())
    }
}

#[async_trait]
impl ApprovalSource for PendingApprovals {
    async fn request_approval(&self, request: ApprovalRequest) -> Result<bool, String> {
        let id = request.id;
        let (responder, response) = oneshot::channel();

        info!(approval_id = %id, work_item_id = %request.work_item_id, gate = %request.gate_name, "Awaiting human approval");
        self.parked
            .lock()
            .await
            .insert(id, ParkedRequest { request, responder });

        response
            .await
            .map_err(|_| format!("approval request {} was abandoned", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::gate::ValidationResult;
    use std::sync::Arc;
    use std::time::Duration;

    fn request() -> ApprovalRequest {
        ApprovalRequest::new(
            GateDecision::from_validation("signoff", "item-1", ValidationResult::valid(0.9), true),
            "release notes ready",
        )
    }

    async fn wait_for_parked(inbox: &PendingApprovals) -> ApprovalRequest {
        for _ in 0..100 {
            if let Some(first) = inbox.list().await.into_iter().next() {
                return first;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no approval request was parked");
    }

    #[tokio::test]
    async fn auto_approve_grants() {
        assert_eq!(AutoApprove.request_approval(request()).await, Ok(true));
    }

    #[tokio::test]
    async fn resolving_delivers_outcome() {
        let inbox = Arc::new(PendingApprovals::new());
        let waiter = {
            let inbox = inbox.clone();
            tokio::spawn(async move { inbox.request_approval(request()).await })
        };

        let parked = wait_for_parked(&inbox).await;
        assert_eq!(parked.gate_name, "signoff");
        assert!(parked.reasoning.contains("0.90"));

        inbox.resolve(parked.id, false).await.unwrap();

        assert_eq!(waiter.await.unwrap(), Ok(false));
        assert!(inbox.list().await.is_empty());
    }

    #[tokio::test]
    async fn resolving_unknown_request_fails() {
        let inbox = PendingApprovals::new();
        let id = Uuid::new_v4();

        let err = inbox.resolve(id, true).await.unwrap_err();

        assert!(matches!(err, CoordinationError::UnknownApproval(got) if got == id));
    }

    #[tokio::test]
    async fn abandoned_requests_are_pruned() {
        let inbox = Arc::new(PendingApprovals::new());
        let waiter = {
            let inbox = inbox.clone();
            tokio::spawn(async move { inbox.request_approval(request()).await })
        };
        let parked = wait_for_parked(&inbox).await;

        waiter.abort();
        let _ = waiter.await;

        assert!(inbox.list().await.is_empty());
        assert!(inbox.resolve(parked.id, true).await.is_err());
    }
}
