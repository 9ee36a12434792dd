use axum::{extract::State, Json};

use crate::agents::state::WorkflowSnapshot;
use crate::api::AppState;

/// Per-status counts and per-agent queue depth
///
/// GET /api/workflow/state
pub async fn get_state(State(state): State<AppState>) -> Json<WorkflowSnapshot> {
    Json(state.coordinator.snapshot().await)
}
