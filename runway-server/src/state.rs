//! Shared application state for the runway server

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use runway_core::{ControllerConfig, MemoryInterruptBackend, TaskController};

use crate::work::WorkPlan;

/// Shared application state accessible by all handlers
#[derive(Clone)]
pub struct AppState {
    /// Task controller backing every task route
    pub controller: Arc<TaskController>,
    /// Work plan used when a submission does not override it
    pub default_work: WorkPlan,
    /// When the server started
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create a new AppState with an in-memory interrupt backend
    pub fn new(controller_config: ControllerConfig) -> Self {
        let backend = Arc::new(MemoryInterruptBackend::new());
        Self::with_controller(Arc::new(TaskController::with_config(
            backend,
            controller_config,
        )))
    }

    /// Create AppState around an existing controller (for testing)
    pub fn with_controller(controller: Arc<TaskController>) -> Self {
        Self {
            controller,
            default_work: WorkPlan::default(),
            started_at: Utc::now(),
        }
    }

    pub fn with_default_work(mut self, steps: u32, step_delay: Duration) -> Self {
        self.default_work = WorkPlan { steps, step_delay, fail: false };
        self
    }

    /// Namespace task ids are scoped to, if any
    pub fn namespace(&self) -> Option<&str> {
        self.controller.config().namespace.as_deref()
    }

    /// Returns how long the server has been running
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(ControllerConfig::default())
    }
}
