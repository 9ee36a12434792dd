use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::api::AppState;
use crate::domain::audit::AuditEntry;

const DEFAULT_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

/// Newest audit entries, oldest first
///
/// GET /api/audit?limit=N
pub async fn list_audit(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Json<Vec<AuditEntry>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    Json(state.coordinator.audit().recent(limit))
}
