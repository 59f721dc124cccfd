//! Task submission and control routes

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use runway_core::{InterruptSignal, TaskOutcome, TaskState};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ServerError;
use crate::work::{WorkPlan, run_steps};
use crate::AppState;

/// Optional overrides for a submitted task
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SubmitTaskRequest {
    /// Caller-chosen id; a UUID is generated otherwise
    pub task_id: Option<String>,
    pub steps: Option<u32>,
    pub step_ms: Option<u64>,
    #[serde(default)]
    pub fail: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitTaskResponse {
    pub task_id: String,
    pub state: TaskState,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignalRequest {
    #[serde(rename = "type")]
    pub signal: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignalResponse {
    pub task_id: String,
    pub signal: InterruptSignal,
    pub state: TaskState,
}

/// Task state as seen by pollers; `state` is null for unknown tasks
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    pub task_id: String,
    pub state: Option<TaskState>,
}

/// POST /tasks
///
/// Returns as soon as the task reads RUNNING; the body runs on its own task.
pub async fn submit_task(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<SubmitTaskResponse>), ServerError> {
    let request = parse_submission(&body)?;
    let task_id = request
        .task_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    if task_id.is_empty() {
        return Err(ServerError::InvalidRequest("task_id must not be empty".into()));
    }

    let plan = WorkPlan {
        steps: request.steps.unwrap_or(state.default_work.steps),
        step_delay: request
            .step_ms
            .map(Duration::from_millis)
            .unwrap_or(state.default_work.step_delay),
        fail: request.fail,
    };

    let prepared = state.controller.prepare(&task_id).await?;
    info!(task_id = %task_id, steps = plan.steps, "Task submitted");

    tokio::spawn(async move {
        let task_id = prepared.task_id().to_string();
        match prepared.run(|ctx| run_steps(ctx, plan)).await {
            Ok(TaskOutcome::Completed(steps)) => info!(task_id = %task_id, steps, "Task completed"),
            Ok(TaskOutcome::Failed(e)) => warn!(task_id = %task_id, error = %e, "Task failed"),
            Ok(TaskOutcome::Stopped) => info!(task_id = %task_id, "Task stopped"),
            Err(e) => warn!(task_id = %task_id, error = %e, "Could not record task outcome"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitTaskResponse {
            task_id,
            state: TaskState::Running,
        }),
    ))
}

/// An empty body means "all defaults"; anything else must be a valid request
fn parse_submission(body: &[u8]) -> Result<SubmitTaskRequest, ServerError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(SubmitTaskRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ServerError::InvalidRequest(format!("invalid task submission: {e}")))
}

/// POST /tasks/:id/signal
pub async fn signal_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    Json(request): Json<SignalRequest>,
) -> Result<Json<SignalResponse>, ServerError> {
    let signal: InterruptSignal = request
        .signal
        .parse()
        .map_err(|e: runway_core::task::ParseError| ServerError::InvalidRequest(e.to_string()))?;

    let next = state.controller.signal(&task_id, signal).await?;
    Ok(Json(SignalResponse {
        task_id,
        signal,
        state: next,
    }))
}

/// GET /tasks/:id/status
pub async fn task_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ServerError> {
    let current = state.controller.get_status(&task_id).await?;
    Ok(Json(TaskStatusResponse {
        task_id,
        state: current,
    }))
}

/// DELETE /tasks/:id
///
/// Acknowledges a finished task and forgets its state.
pub async fn acknowledge_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ServerError> {
    let last = state.controller.acknowledge(&task_id).await?;
    Ok(Json(TaskStatusResponse {
        task_id,
        state: Some(last),
    }))
}
