use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use crate::domain::gate::ValidationResult;
pub use crate::domain::work_item::Priority;
use crate::domain::work_item::WorkItem;

/// Sender id used when the coordinator hands work to an agent
pub const COORDINATOR_ID: &str = "coordinator";

/// Request handed to an agent's `process_request`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub sender: String,
    pub recipient: String,
    pub request_type: String,
    pub data: serde_json::Value,
    pub priority: Priority,
    pub requires_human_input: bool,
}

impl AgentRequest {
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        request_type: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            sender: sender.into(),
            recipient: recipient.into(),
            request_type: request_type.into(),
            data,
            priority: Priority::default(),
            requires_human_input: false,
        }
    }

    /// Request for a dispatched work item; `request_type` is the work type
    pub fn for_work_item(item: &WorkItem) -> Self {
        let mut request = Self::new(
            COORDINATOR_ID,
            item.agent_id(),
            item.work_type(),
            item.input().clone(),
        );
        request.priority = item.priority();
        request
    }
}

/// Response returned by an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub id: Uuid,
    pub request_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub sender: String,
    pub recipient: String,
    pub response_type: String,
    pub data: serde_json::Value,
    pub priority: Priority,
    pub requires_human_input: bool,
}

impl AgentResponse {
    /// Response to `request`, sent back by its recipient
    pub fn reply_to(
        request: &AgentRequest,
        response_type: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id: request.id,
            created_at: Utc::now(),
            sender: request.recipient.clone(),
            recipient: request.sender.clone(),
            response_type: response_type.into(),
            data,
            priority: request.priority,
            requires_human_input: false,
        }
    }
}
