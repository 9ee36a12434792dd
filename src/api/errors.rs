use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::agents::errors::CoordinationError;

/// API error type with HTTP status code and message
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    /// Creates a new API error
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Creates a 400 Bad Request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Creates a 409 Conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    /// Creates a 404 Not Found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Creates a 422 Unprocessable Entity error
    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    /// Creates a 500 Internal Server Error
    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl From<CoordinationError> for ApiError {
    fn from(err: CoordinationError) -> Self {
        let message = err.to_string();
        match err {
            CoordinationError::DuplicateId(_)
            | CoordinationError::CyclicDependency { .. }
            | CoordinationError::AwaitingGate(_)
            | CoordinationError::InvalidStateTransition(_) => Self::conflict(message),
            CoordinationError::UnknownWorkItem(_) | CoordinationError::UnknownApproval(_) => {
                Self::not_found(message)
            }
            CoordinationError::Communication(_) | CoordinationError::Json(_) => {
                Self::bad_request(message)
            }
            CoordinationError::BlockedByFailedDependency { .. }
            | CoordinationError::GateValidation { .. } => Self::unprocessable(message),
            CoordinationError::ApprovalTimeout { .. } => {
                Self::new(StatusCode::GATEWAY_TIMEOUT, message)
            }
            CoordinationError::Provider(_) => Self::new(StatusCode::BAD_GATEWAY, message),
            CoordinationError::Config(_) => Self::internal_server_error(message),
        }
    }
}

impl From<String> for ApiError {
    fn from(message: String) -> Self {
        Self::internal_server_error(message)
    }
}

impl From<&str> for ApiError {
    fn from(message: &str) -> Self {
        Self::internal_server_error(message)
    }
}
