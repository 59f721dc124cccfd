//! Running task bodies under controller supervision

use std::fmt::Display;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::controller::TaskController;
use super::state::{InterruptSignal, TaskState};
use crate::error::TaskError;

/// How a supervised task body ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome<T, E> {
    /// The body returned `Ok`
    Completed(T),
    /// The body returned `Err`
    Failed(E),
    /// A STOP signal cancelled the body
    Stopped,
}

impl<T, E> TaskOutcome<T, E> {
    /// Terminal state recorded for this outcome
    pub fn final_state(&self) -> TaskState {
        match self {
            TaskOutcome::Completed(_) => TaskState::Finished,
            TaskOutcome::Failed(_) => TaskState::Error,
            TaskOutcome::Stopped => TaskState::Stopped,
        }
    }
}

/// In-process control surface of an executing task
#[derive(Clone)]
pub(crate) struct LocalControl {
    paused: Arc<watch::Sender<bool>>,
    cancel: CancellationToken,
}

impl LocalControl {
    pub(crate) fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            paused: Arc::new(paused),
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn apply(&self, signal: InterruptSignal) {
        match signal {
            InterruptSignal::Stop => self.cancel.cancel(),
            InterruptSignal::Pause => {
                self.paused.send_replace(true);
            }
            InterruptSignal::Resume => {
                self.paused.send_replace(false);
            }
        }
    }

    pub(crate) fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    fn context(&self, task_id: &str) -> TaskContext {
        TaskContext {
            task_id: task_id.to_string(),
            paused: self.paused.subscribe(),
            cancel: self.cancel.clone(),
        }
    }
}

/// Handle given to a task body for cooperative pause and stop
#[derive(Clone)]
pub struct TaskContext {
    task_id: String,
    paused: watch::Receiver<bool>,
    cancel: CancellationToken,
}

impl TaskContext {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the task has been stopped
    pub async fn stopped(&self) {
        self.cancel.cancelled().await
    }

    /// Yield point for long-running bodies.
    ///
    /// Returns immediately while running, waits while paused, and fails with
    /// `TaskError::Stopped` once the task has been stopped.
    pub async fn checkpoint(&self) -> Result<(), TaskError> {
        let mut paused = self.paused.clone();
        loop {
            if self.cancel.is_cancelled() {
                return Err(TaskError::Stopped(self.task_id.clone()));
            }
            if !*paused.borrow_and_update() {
                return Ok(());
            }
            tokio::select! {
                _ = self.cancel.cancelled() => {}
                changed = paused.changed() => {
                    if changed.is_err() {
                        // Supervisor is gone; nothing can resume us
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// A task that has been started but whose body has not run yet.
///
/// Dropping it without calling [`PreparedTask::run`] detaches the signal
/// listener and leaves the state `Running` until its TTL expires.
pub struct PreparedTask {
    controller: Arc<TaskController>,
    task_id: String,
    control: LocalControl,
    listener: JoinHandle<()>,
    settled: bool,
}

impl PreparedTask {
    pub(crate) fn new(
        controller: Arc<TaskController>,
        task_id: String,
        control: LocalControl,
        listener: JoinHandle<()>,
    ) -> Self {
        Self {
            controller,
            task_id,
            control,
            listener,
            settled: false,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Context that will be handed to the body
    pub fn context(&self) -> TaskContext {
        self.control.context(&self.task_id)
    }

    /// Run `body` to completion or until stopped, then record the outcome
    pub async fn run<T, E, F, Fut>(mut self, body: F) -> Result<TaskOutcome<T, E>, TaskError>
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let ctx = self.context();
        let cancel = self.control.cancel.clone();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => TaskOutcome::Stopped,
            result = body(ctx) => match result {
                Ok(value) => TaskOutcome::Completed(value),
                Err(e) => {
                    warn!(task_id = %self.task_id, error = %e, "Task body failed");
                    TaskOutcome::Failed(e)
                }
            },
        };

        self.listener.abort();
        self.settled = true;
        let settled = self
            .controller
            .settle(&self.task_id, outcome.final_state())
            .await;
        self.controller.forget_local(&self.task_id);

        let state = settled?;
        info!(task_id = %self.task_id, %state, "Task run complete");
        Ok(outcome)
    }
}

impl Drop for PreparedTask {
    fn drop(&mut self) {
        if !self.settled {
            self.listener.abort();
            self.controller.forget_local(&self.task_id);
            warn!(task_id = %self.task_id, "Prepared task dropped without running");
        }
    }
}
