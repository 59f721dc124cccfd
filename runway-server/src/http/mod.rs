//! HTTP server module

mod api;
mod tasks;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::AppState;

pub use api::HealthResponse;
pub use tasks::{
    SignalRequest, SignalResponse, SubmitTaskRequest, SubmitTaskResponse, TaskStatusResponse,
};

/// Create the HTTP router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/tasks", post(tasks::submit_task))
        .route("/tasks/:id", delete(tasks::acknowledge_task))
        .route("/tasks/:id/signal", post(tasks::signal_task))
        .route("/tasks/:id/status", get(tasks::task_status))
        .with_state(state)
}
