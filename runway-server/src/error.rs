//! Server error types

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use runway_core::{TaskError, TaskState};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in the runway server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified address
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Task control rejected the request
    #[error(transparent)]
    Task(#[from] TaskError),

    /// Malformed request body
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON body of every error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ServerError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ServerError::Task(TaskError::InvalidTransition {
                state: TaskState::Idle,
                ..
            }) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ServerError::Task(TaskError::InvalidTransition { .. }) => {
                (StatusCode::CONFLICT, "INVALID_TRANSITION")
            }
            ServerError::Task(TaskError::Stopped(_)) => (StatusCode::CONFLICT, "STOPPED"),
            ServerError::Task(TaskError::BackendUnavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "BACKEND_UNAVAILABLE")
            }
            ServerError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ServerError::Bind { .. } | ServerError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::warn!("Request failed: {}", self);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use runway_core::BackendError;
    use runway_core::task::{InterruptSignal, TaskAction};

    use super::*;

    fn transition(state: TaskState) -> ServerError {
        TaskError::InvalidTransition {
            task_id: "t1".to_string(),
            state,
            action: TaskAction::Signal(InterruptSignal::Stop),
        }
        .into()
    }

    #[test]
    fn unknown_task_maps_to_not_found() {
        assert_eq!(
            transition(TaskState::Idle).into_response().status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn terminal_task_maps_to_conflict() {
        assert_eq!(
            transition(TaskState::Finished).into_response().status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn backend_unavailable_maps_to_503() {
        let error: ServerError =
            TaskError::from(BackendError::Unavailable("closed".to_string())).into();
        assert_eq!(
            error.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn invalid_request_maps_to_400() {
        let error = ServerError::InvalidRequest("bad signal".to_string());
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
