use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::agents::approvals::ApprovalRequest;
use crate::api::errors::ApiError;
use crate::api::AppState;

#[derive(Debug, Deserialize)]
pub struct ResolveApprovalRequest {
    pub approved: bool,
}

/// Requests waiting on a human decision
///
/// GET /api/approvals
pub async fn list_approvals(State(state): State<AppState>) -> Json<Vec<ApprovalRequest>> {
    Json(state.approvals.list().await)
}

/// Grant or deny a parked request
///
/// POST /api/approvals/:id
pub async fn resolve_approval(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ResolveApprovalRequest>,
) -> Result<StatusCode, ApiError> {
    state.approvals.resolve(id, req.approved).await?;
    Ok(StatusCode::NO_CONTENT)
}
