//! Task lifecycle states and control signals

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a task.
///
/// `Idle` precedes the first execution, `Running` follows `start`, and the
/// three remaining states are terminal: nothing leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Idle,
    Running,
    Stopped,
    Finished,
    Error,
}

impl TaskState {
    /// Wire name of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Idle => "IDLE",
            TaskState::Running => "RUNNING",
            TaskState::Stopped => "STOPPED",
            TaskState::Finished => "FINISHED",
            TaskState::Error => "ERROR",
        }
    }

    /// Whether the state is final
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Stopped | TaskState::Finished | TaskState::Error
        )
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Idle, TaskState::Running)
                | (
                    TaskState::Running,
                    TaskState::Stopped | TaskState::Finished | TaskState::Error
                )
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown state or signal name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseError {
    kind: &'static str,
    value: String,
}

impl FromStr for TaskState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IDLE" => Ok(TaskState::Idle),
            "RUNNING" => Ok(TaskState::Running),
            "STOPPED" => Ok(TaskState::Stopped),
            "FINISHED" => Ok(TaskState::Finished),
            "ERROR" => Ok(TaskState::Error),
            other => Err(ParseError {
                kind: "task state",
                value: other.to_string(),
            }),
        }
    }
}

/// Transient control message delivered on a task's channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterruptSignal {
    Stop,
    Pause,
    Resume,
}

impl InterruptSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterruptSignal::Stop => "STOP",
            InterruptSignal::Pause => "PAUSE",
            InterruptSignal::Resume => "RESUME",
        }
    }
}

impl fmt::Display for InterruptSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterruptSignal {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STOP" => Ok(InterruptSignal::Stop),
            "PAUSE" => Ok(InterruptSignal::Pause),
            "RESUME" => Ok(InterruptSignal::Resume),
            _ => Err(ParseError {
                kind: "signal",
                value: s.to_string(),
            }),
        }
    }
}

/// Operation attempted against a task, reported by `InvalidTransition`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    Start,
    Finish,
    Signal(InterruptSignal),
    Acknowledge,
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskAction::Start => f.write_str("start"),
            TaskAction::Finish => f.write_str("finish"),
            TaskAction::Signal(signal) => write!(f, "signal {}", signal),
            TaskAction::Acknowledge => f.write_str("acknowledge"),
        }
    }
}
