//! Task lifecycle: states, signals, and the controller that enforces them

mod controller;
mod executor;
mod state;

pub use controller::{ControllerConfig, DEFAULT_TERMINAL_TTL, TaskController};
pub use executor::{PreparedTask, TaskContext, TaskOutcome};
pub use state::{InterruptSignal, ParseError, TaskAction, TaskState};
