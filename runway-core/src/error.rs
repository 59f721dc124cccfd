//! Error types for runway-core

use thiserror::Error;

use crate::task::{TaskAction, TaskState};

/// Top-level error type for runway-core
#[derive(Error, Debug)]
pub enum RunwayError {
    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Interrupt backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Errors raised by an interrupt backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Interrupt backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors related to task control
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Cannot {action} task {task_id} in state {state}")]
    InvalidTransition {
        task_id: String,
        state: TaskState,
        action: TaskAction,
    },

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(#[from] BackendError),

    #[error("Task {0} was stopped")]
    Stopped(String),
}

impl TaskError {
    /// True when the error reports an illegal state machine transition
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, TaskError::InvalidTransition { .. })
    }
}

/// Errors related to the deployment registry
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Deployment not found: {0}")]
    DeploymentNotFound(String),

    #[error("Registry I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Registry serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid registry data: {0}")]
    InvalidData(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::InterruptSignal;

    #[test]
    fn invalid_transition_displays_state_and_action() {
        let error = TaskError::InvalidTransition {
            task_id: "t1".to_string(),
            state: TaskState::Stopped,
            action: TaskAction::Finish,
        };
        let message = error.to_string();
        assert!(message.contains("t1"));
        assert!(message.contains("STOPPED"));
        assert!(message.contains("finish"));
        assert!(error.is_invalid_transition());
    }

    #[test]
    fn invalid_signal_displays_signal_name() {
        let error = TaskError::InvalidTransition {
            task_id: "t2".to_string(),
            state: TaskState::Idle,
            action: TaskAction::Signal(InterruptSignal::Pause),
        };
        assert!(error.to_string().contains("signal PAUSE"));
    }

    #[test]
    fn backend_error_converts_into_task_error() {
        let error: TaskError = BackendError::Unavailable("closed".to_string()).into();
        assert!(matches!(error, TaskError::BackendUnavailable(_)));
        assert!(!error.is_invalid_transition());
        assert!(error.to_string().contains("closed"));
    }

    #[test]
    fn deployment_not_found_displays_id() {
        let error = RegistryError::DeploymentNotFound("local_1".to_string());
        assert_eq!(error.to_string(), "Deployment not found: local_1");
    }

    #[test]
    fn runway_error_converts_from_registry_error() {
        let error: RunwayError = RegistryError::DeploymentNotFound("x".to_string()).into();
        assert!(matches!(error, RunwayError::Registry(_)));
        assert!(error.to_string().contains("Registry error"));
    }

    #[test]
    fn runway_error_converts_from_task_error() {
        let error: RunwayError = TaskError::Stopped("t".to_string()).into();
        assert!(matches!(error, RunwayError::Task(_)));
    }
}
