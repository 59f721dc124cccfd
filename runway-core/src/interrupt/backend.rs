//! InterruptBackend trait definition
//!
//! A backend carries two independent paths: a fire-and-forget pub/sub
//! channel for control signals and a key-value store with expiry for task
//! state. A poller that missed a live signal can still read the last state.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use tokio_stream::Stream;

use crate::error::BackendError;
use crate::task::TaskState;

/// Default time-to-live for task state records
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(3600);

/// Live stream of messages received on one channel.
///
/// The stream never ends on its own while the backend is open; dropping it
/// cancels the subscription.
pub type SignalStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Pub/sub signaling plus expiring task-state storage
///
/// Implementations must guarantee:
/// - Messages on one channel reach a subscriber in publish order
/// - Publishing with no subscriber attached succeeds and drops the message
/// - Reading a missing or expired key yields `None`, never an error
#[async_trait]
pub trait InterruptBackend: Send + Sync {
    /// Broadcast `message` to every current subscriber of `channel`
    async fn publish_event(&self, channel: &str, message: &str) -> Result<(), BackendError>;

    /// Subscribe to `channel`, receiving messages published from now on
    async fn subscribe_listen(&self, channel: &str) -> Result<SignalStream, BackendError>;

    /// Store `state` under `key`, discarding it once `ttl` has elapsed
    async fn set_task_state(
        &self,
        key: &str,
        state: TaskState,
        ttl: Duration,
    ) -> Result<(), BackendError>;

    /// Read the state stored under `key`
    async fn get_task_state(&self, key: &str) -> Result<Option<TaskState>, BackendError>;

    /// Remove the state stored under `key`
    async fn delete_task_state(&self, key: &str) -> Result<(), BackendError>;

    /// Release backend resources. Calling it again is a no-op.
    async fn aclose(&self) -> Result<(), BackendError>;
}
