use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::manager::CompletionOutcome;
use crate::agents::queue::Eligibility;
use crate::api::errors::ApiError;
use crate::api::AppState;
use crate::domain::gate::GateDecision;
use crate::domain::work_item::{Priority, WorkItem, WorkItemId, WorkStatus};

/// Request body for admitting a work item
#[derive(Debug, Deserialize)]
pub struct CreateWorkRequest {
    /// Generated when omitted
    pub id: Option<String>,
    pub agent_id: String,
    pub work_type: String,
    #[serde(default)]
    pub input: serde_json::Value,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub priority: Priority,
}

/// Request body for reporting a result
#[derive(Debug, Deserialize)]
pub struct CompleteWorkRequest {
    pub result: serde_json::Value,
    #[serde(default)]
    pub gate_data: serde_json::Value,
    /// Gates to run in addition to the agent's mandatory ones
    #[serde(default)]
    pub gates: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct FailWorkRequest {
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct FailWorkResponse {
    pub id: WorkItemId,
    pub blocked: Vec<WorkItemId>,
}

/// Work item view
#[derive(Debug, Serialize)]
pub struct WorkItemResponse {
    pub id: WorkItemId,
    pub agent_id: String,
    pub work_type: String,
    pub input: serde_json::Value,
    pub priority: Priority,
    pub status: WorkStatus,
    pub awaiting_gate: bool,
    pub result: Option<serde_json::Value>,
    pub dependencies: Vec<WorkItemId>,
    pub gate_decisions: Vec<GateDecision>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Failed upstream item that makes this one permanently ineligible
    pub blocked_by: Option<WorkItemId>,
}

impl WorkItemResponse {
    fn new(item: &WorkItem, blocked_by: Option<WorkItemId>) -> Self {
        Self {
            id: item.id().to_string(),
            agent_id: item.agent_id().to_string(),
            work_type: item.work_type().to_string(),
            input: item.input().clone(),
            priority: item.priority(),
            status: item.status(),
            awaiting_gate: item.is_awaiting_gate(),
            result: item.result().cloned(),
            dependencies: item.dependencies().to_vec(),
            gate_decisions: item.gate_decisions().to_vec(),
            created_at: item.created_at(),
            started_at: item.started_at(),
            finished_at: item.finished_at(),
            blocked_by,
        }
    }
}

/// Admit a work item
///
/// POST /api/work
pub async fn create_work(
    State(state): State<AppState>,
    Json(req): Json<CreateWorkRequest>,
) -> Result<(StatusCode, Json<WorkItemResponse>), ApiError> {
    if req.agent_id.trim().is_empty() || req.work_type.trim().is_empty() {
        return Err(ApiError::bad_request("agent_id and work_type are required"));
    }

    let item = match req.id {
        Some(id) => WorkItem::new(id, req.agent_id, req.work_type, req.input, req.dependencies),
        None => WorkItem::with_generated_id(req.agent_id, req.work_type, req.input, req.dependencies),
    }
    .with_priority(req.priority);

    state.coordinator.add_work(item.clone()).await?;

    Ok((StatusCode::CREATED, Json(WorkItemResponse::new(&item, None))))
}

/// Get a work item by ID
///
/// GET /api/work/:id
pub async fn get_work(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WorkItemResponse>, ApiError> {
    let item = state.coordinator.get(&id).await?;
    let blocked_by = state.coordinator.queue().failed_upstream(&id).await?;

    Ok(Json(WorkItemResponse::new(&item, blocked_by)))
}

/// Whether the item could be dispatched right now
///
/// GET /api/work/:id/eligibility
pub async fn get_eligibility(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Eligibility>, ApiError> {
    Ok(Json(state.coordinator.check_eligibility(&id).await?))
}

/// Dispatch the agent's next eligible item (204 when there is none)
///
/// POST /api/agents/:agent_id/next
pub async fn next_work(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Response, ApiError> {
    Ok(match state.coordinator.next_work(&agent_id).await? {
        Some(item) => Json(WorkItemResponse::new(&item, None)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// Report an agent's result; gates decide whether the item completes
///
/// POST /api/work/:id/complete
pub async fn complete_work(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CompleteWorkRequest>,
) -> Result<Json<CompletionOutcome>, ApiError> {
    let extra: Vec<&str> = req.gates.iter().map(String::as_str).collect();
    let outcome = state
        .coordinator
        .complete_with_gates(&id, req.result, req.gate_data, &extra)
        .await?;

    Ok(Json(outcome))
}

/// Report that an agent could not finish an item
///
/// POST /api/work/:id/fail
pub async fn fail_work(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<FailWorkRequest>,
) -> Result<Json<FailWorkResponse>, ApiError> {
    let blocked = state.coordinator.fail(&id, &req.reason).await?;

    Ok(Json(FailWorkResponse { id, blocked }))
}
