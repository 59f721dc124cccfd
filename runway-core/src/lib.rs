//! runway-core: task control and deployment bookkeeping for runway
//!
//! This crate provides the pieces every runway process shares:
//!
//! - **Interrupt backends** - [`InterruptBackend`] trait and [`MemoryInterruptBackend`]
//!   for pub/sub control signals plus expiring task state
//! - **Task control** - [`TaskController`] enforcing the `IDLE -> RUNNING -> terminal`
//!   state machine, with [`TaskController::execute`] running bodies under supervision
//! - **Deployment registry** - [`DeploymentRegistry`] over a pluggable [`RegistryStore`],
//!   file-backed by [`JsonFileStore`]
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use runway_core::{InterruptSignal, MemoryInterruptBackend, TaskController};
//!
//! async fn example() -> Result<(), runway_core::TaskError> {
//!     let controller = Arc::new(TaskController::new(Arc::new(MemoryInterruptBackend::new())));
//!
//!     let prepared = controller.prepare("t1").await?;
//!     let run = tokio::spawn(prepared.run(|ctx| async move {
//!         for _step in 0..100 {
//!             ctx.checkpoint().await?;
//!             tokio::time::sleep(std::time::Duration::from_millis(10)).await;
//!         }
//!         Ok::<(), runway_core::TaskError>(())
//!     }));
//!
//!     controller.signal("t1", InterruptSignal::Stop).await?;
//!     let _ = run.await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐ signal/status ┌────────────────┐
//! │ frontend/CLI │──────────────▶│ TaskController │
//! └──────────────┘               └───────┬────────┘
//!                                        │ publish / subscribe / set / get
//!                                ┌───────▼──────────┐
//!                                │ InterruptBackend │
//!                                └──────────────────┘
//!
//! ┌───────────────┐  put/list   ┌────────────────────┐   flock + rename
//! │ deploy manager│────────────▶│ DeploymentRegistry │──▶ deployments.json
//! └───────────────┘             └────────────────────┘
//! ```

pub mod error;
pub mod interrupt;
pub mod registry;
pub mod task;

pub use error::{BackendError, RegistryError, RunwayError, TaskError};
pub use interrupt::{DEFAULT_STATE_TTL, InterruptBackend, MemoryInterruptBackend, SignalStream};
pub use registry::{DeploymentRecord, DeploymentRegistry, JsonFileStore, ListFilter, RegistryStore};
pub use task::{
    ControllerConfig, DEFAULT_TERMINAL_TTL, InterruptSignal, PreparedTask, TaskContext,
    TaskController, TaskOutcome, TaskState,
};
