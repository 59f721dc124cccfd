//! TaskController: the task state machine mediated by an interrupt backend
//!
//! State never lives only in local memory. Every transition is read from and
//! written to the backend so pollers in other processes observe it. Within
//! one controller, transitions on the same key are serialised by a per-key
//! async lock so check-then-set cannot interleave.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::OwnedMutexGuard;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use super::executor::{LocalControl, PreparedTask, TaskContext, TaskOutcome};
use super::state::{InterruptSignal, TaskAction, TaskState};
use crate::error::TaskError;
use crate::interrupt::{DEFAULT_STATE_TTL, InterruptBackend, SignalStream};

/// Default time-to-live for records in a terminal state
pub const DEFAULT_TERMINAL_TTL: Duration = Duration::from_secs(600);

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Prefix scoping task ids, usually a deployment or `user:session`
    pub namespace: Option<String>,
    /// TTL applied while a task is running
    pub state_ttl: Duration,
    /// TTL applied once a task reaches a terminal state
    pub terminal_ttl: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            state_ttl: DEFAULT_STATE_TTL,
            terminal_ttl: DEFAULT_TERMINAL_TTL,
        }
    }
}

impl ControllerConfig {
    /// Default configuration scoped to `namespace`
    pub fn namespaced(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Self::default()
        }
    }
}

type LockMap = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

/// Owns the lifecycle state machine for tasks under one namespace
pub struct TaskController {
    backend: Arc<dyn InterruptBackend>,
    config: ControllerConfig,
    locks: Mutex<LockMap>,
    local: Mutex<HashMap<String, LocalControl>>,
}

impl TaskController {
    /// Create a controller with default configuration
    pub fn new(backend: Arc<dyn InterruptBackend>) -> Self {
        Self::with_config(backend, ControllerConfig::default())
    }

    pub fn with_config(backend: Arc<dyn InterruptBackend>, config: ControllerConfig) -> Self {
        Self {
            backend,
            config,
            locks: Mutex::new(HashMap::new()),
            local: Mutex::new(HashMap::new()),
        }
    }

    /// The backend this controller reads and writes through
    pub fn backend(&self) -> &Arc<dyn InterruptBackend> {
        &self.backend
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Backend key for `task_id`
    pub fn task_key(&self, task_id: &str) -> String {
        match &self.config.namespace {
            Some(namespace) if !namespace.is_empty() => format!("{namespace}:{task_id}"),
            _ => task_id.to_string(),
        }
    }

    /// Signal channel for `task_id`
    pub fn channel(&self, task_id: &str) -> String {
        format!("chan:{}", self.task_key(task_id))
    }

    /// Transition `task_id` from idle to running
    pub async fn start(&self, task_id: &str) -> Result<(), TaskError> {
        let key = self.task_key(task_id);
        let _guard = self.lock_key(&key).await;

        let current = self.current_state(&key).await?;
        if !current.can_transition_to(TaskState::Running) {
            return Err(invalid(task_id, current, TaskAction::Start));
        }

        self.backend
            .set_task_state(&key, TaskState::Running, self.config.state_ttl)
            .await?;
        info!(task_id, "Task started");
        Ok(())
    }

    /// Publish `signal` on the task channel and apply its state effect.
    ///
    /// Only running tasks accept signals. `Stop` moves the task to
    /// `Stopped`; `Pause` and `Resume` leave the state untouched and flip the
    /// cooperative pause flag of the executing body. Returns the state after
    /// the signal.
    pub async fn signal(
        &self,
        task_id: &str,
        signal: InterruptSignal,
    ) -> Result<TaskState, TaskError> {
        let key = self.task_key(task_id);
        let _guard = self.lock_key(&key).await;

        let current = self.current_state(&key).await?;
        if current != TaskState::Running {
            return Err(invalid(task_id, current, TaskAction::Signal(signal)));
        }

        self.backend
            .publish_event(&self.channel(task_id), signal.as_str())
            .await?;
        self.apply_local(&key, signal);

        let next = match signal {
            InterruptSignal::Stop => {
                self.backend
                    .set_task_state(&key, TaskState::Stopped, self.config.terminal_ttl)
                    .await?;
                TaskState::Stopped
            }
            InterruptSignal::Pause | InterruptSignal::Resume => current,
        };

        info!(task_id, %signal, state = %next, "Signal delivered");
        Ok(next)
    }

    /// Record the outcome of a running task
    pub async fn finish(&self, task_id: &str, success: bool) -> Result<TaskState, TaskError> {
        let target = if success {
            TaskState::Finished
        } else {
            TaskState::Error
        };

        let key = self.task_key(task_id);
        let _guard = self.lock_key(&key).await;

        let current = self.current_state(&key).await?;
        if !current.can_transition_to(target) {
            return Err(invalid(task_id, current, TaskAction::Finish));
        }

        self.backend
            .set_task_state(&key, target, self.config.terminal_ttl)
            .await?;
        info!(task_id, state = %target, "Task finished");
        Ok(target)
    }

    /// Current state of `task_id`; `None` when absent or expired
    pub async fn get_status(&self, task_id: &str) -> Result<Option<TaskState>, TaskError> {
        Ok(self.backend.get_task_state(&self.task_key(task_id)).await?)
    }

    /// Delete the record of a task that reached a terminal state
    pub async fn acknowledge(&self, task_id: &str) -> Result<TaskState, TaskError> {
        let key = self.task_key(task_id);
        let _guard = self.lock_key(&key).await;

        let current = self.current_state(&key).await?;
        if !current.is_terminal() {
            return Err(invalid(task_id, current, TaskAction::Acknowledge));
        }
        self.backend.delete_task_state(&key).await?;
        debug!(task_id, state = %current, "Terminal state acknowledged");
        Ok(current)
    }

    /// Whether the body executing `task_id` in this process is paused
    pub fn is_paused(&self, task_id: &str) -> bool {
        lock_map(&self.local)
            .get(&self.task_key(task_id))
            .is_some_and(LocalControl::is_paused)
    }

    /// Number of task bodies currently executing through this controller
    pub fn local_task_count(&self) -> usize {
        lock_map(&self.local).len()
    }

    /// Subscribe to the task channel and start the task.
    ///
    /// The returned handle is run later, typically on a spawned task, so
    /// callers can hand out the task id while the state already reads
    /// `Running`.
    pub async fn prepare(self: &Arc<Self>, task_id: &str) -> Result<PreparedTask, TaskError> {
        let key = self.task_key(task_id);

        // Subscribe first so a STOP published right after start is not lost
        let stream = self.backend.subscribe_listen(&self.channel(task_id)).await?;
        self.start(task_id).await?;

        let control = LocalControl::new();
        lock_map(&self.local).insert(key, control.clone());

        let listener = tokio::spawn(listen_for_signals(
            stream,
            control.clone(),
            task_id.to_string(),
        ));

        Ok(PreparedTask::new(
            Arc::clone(self),
            task_id.to_string(),
            control,
            listener,
        ))
    }

    /// Run `body` as task `task_id` and record how it ended.
    ///
    /// `Ok` bodies finish the task, `Err` bodies mark it as errored, and a
    /// STOP signal drops the body at its next suspension point.
    pub async fn execute<T, E, F, Fut>(
        self: &Arc<Self>,
        task_id: &str,
        body: F,
    ) -> Result<TaskOutcome<T, E>, TaskError>
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.prepare(task_id).await?.run(body).await
    }

    /// Close the underlying backend
    pub async fn close(&self) -> Result<(), TaskError> {
        self.backend.aclose().await?;
        Ok(())
    }

    /// Move a running task to `final_state` once its body has returned.
    ///
    /// A task already moved to a terminal state by a signal keeps it.
    pub(crate) async fn settle(
        &self,
        task_id: &str,
        final_state: TaskState,
    ) -> Result<TaskState, TaskError> {
        let key = self.task_key(task_id);
        let _guard = self.lock_key(&key).await;

        let current = self.current_state(&key).await?;
        if current != TaskState::Running {
            debug!(task_id, state = %current, "Task already settled");
            return Ok(current);
        }

        self.backend
            .set_task_state(&key, final_state, self.config.terminal_ttl)
            .await?;
        info!(task_id, state = %final_state, "Task settled");
        Ok(final_state)
    }

    pub(crate) fn forget_local(&self, task_id: &str) {
        lock_map(&self.local).remove(&self.task_key(task_id));
    }

    async fn current_state(&self, key: &str) -> Result<TaskState, TaskError> {
        Ok(self
            .backend
            .get_task_state(key)
            .await?
            .unwrap_or(TaskState::Idle))
    }

    async fn lock_key(&self, key: &str) -> KeyLock<'_> {
        let lock = Arc::clone(lock_map(&self.locks).entry(key.to_string()).or_default());
        KeyLock {
            locks: &self.locks,
            key: key.to_string(),
            _guard: lock.lock_owned().await,
        }
    }

    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        lock_map(&self.locks).len()
    }

    fn apply_local(&self, key: &str, signal: InterruptSignal) {
        if let Some(control) = lock_map(&self.local).get(key) {
            control.apply(signal);
        }
    }
}

/// Exclusive hold on one task key.
///
/// The map entry is removed on release unless another caller holds a clone
/// of the same lock, so the map only ever holds keys with operations in
/// flight.
struct KeyLock<'a> {
    locks: &'a Mutex<LockMap>,
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for KeyLock<'_> {
    fn drop(&mut self) {
        let mut locks = lock_map(self.locks);
        // One reference is the map's, one is held by our guard
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) <= 2)
        {
            locks.remove(&self.key);
        }
    }
}

fn invalid(task_id: &str, state: TaskState, action: TaskAction) -> TaskError {
    TaskError::InvalidTransition {
        task_id: task_id.to_string(),
        state,
        action,
    }
}

fn lock_map<T>(map: &Mutex<T>) -> MutexGuard<'_, T> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Forward signals from the task channel to the executing body
async fn listen_for_signals(mut stream: SignalStream, control: LocalControl, task_id: String) {
    while let Some(message) = stream.next().await {
        match message.parse::<InterruptSignal>() {
            Ok(signal) => {
                debug!(task_id = %task_id, %signal, "Received signal");
                control.apply(signal);
                if signal == InterruptSignal::Stop {
                    break;
                }
            }
            Err(e) => warn!(task_id = %task_id, error = %e, "Ignoring control message"),
        }
    }
}
