// API layer module (adapters for controllers)
// Follows Hexagonal Architecture - API is an adapter

pub mod errors;
pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::agents::approvals::PendingApprovals;
use crate::agents::manager::WorkflowCoordinator;

use handlers::{approvals, audit, health, work, workflow};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<WorkflowCoordinator>,
    /// Inbox that `/api/approvals` resolves; empty when auto-approving
    pub approvals: Arc<PendingApprovals>,
}

/// Builds every route over `state`
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/work", post(work::create_work))
        .route("/api/work/:id", get(work::get_work))
        .route("/api/work/:id/eligibility", get(work::get_eligibility))
        .route("/api/work/:id/complete", post(work::complete_work))
        .route("/api/work/:id/fail", post(work::fail_work))
        .route("/api/agents/:agent_id/next", post(work::next_work))
        .route("/api/workflow/state", get(workflow::get_state))
        .route("/api/audit", get(audit::list_audit))
        .route("/api/approvals", get(approvals::list_approvals))
        .route("/api/approvals/:id", post(approvals::resolve_approval))
        .with_state(state)
}
