//! In-memory InterruptBackend implementation
//!
//! MemoryInterruptBackend keeps task states in a map with lazy expiry and
//! fans published messages out to one unbounded queue per subscriber. It
//! serves tests and single-process deployments.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};
use tokio::time::Instant;
use tokio_stream::Stream;
use tracing::{debug, trace};

use super::backend::{InterruptBackend, SignalStream};
use crate::error::BackendError;
use crate::task::TaskState;

/// Prefix applied to every state key, mirroring networked stores
const STATE_KEY_PREFIX: &str = "state:";

/// Upper bound used when `now + ttl` overflows the clock
const MAX_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

type SubscriberMap = HashMap<String, Vec<Subscriber>>;

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<String>,
}

#[derive(Debug, Clone, Copy)]
struct StateEntry {
    state: TaskState,
    expires_at: Instant,
}

impl StateEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory implementation of InterruptBackend
pub struct MemoryInterruptBackend {
    states: RwLock<HashMap<String, StateEntry>>,
    subscribers: Arc<Mutex<SubscriberMap>>,
    next_subscriber_id: AtomicU64,
    closed: AtomicBool,
}

impl MemoryInterruptBackend {
    pub fn new() -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            next_subscriber_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of live subscriptions on `channel`
    pub fn subscriber_count(&self, channel: &str) -> usize {
        lock_subscribers(&self.subscribers)
            .get(channel)
            .map_or(0, Vec::len)
    }

    /// Drop every expired state record, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut states = self.states.write().await;
        let before = states.len();
        states.retain(|_, entry| !entry.is_expired(now));
        before - states.len()
    }

    /// Whether `aclose` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), BackendError> {
        if self.is_closed() {
            Err(BackendError::Unavailable("backend is closed".to_string()))
        } else {
            Ok(())
        }
    }

    fn full_key(key: &str) -> String {
        format!("{STATE_KEY_PREFIX}{key}")
    }
}

impl Default for MemoryInterruptBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InterruptBackend for MemoryInterruptBackend {
    async fn publish_event(&self, channel: &str, message: &str) -> Result<(), BackendError> {
        self.ensure_open()?;

        let mut subscribers = lock_subscribers(&self.subscribers);
        let Some(queues) = subscribers.get_mut(channel) else {
            trace!(channel, "No subscribers, dropping message");
            return Ok(());
        };

        queues.retain(|sub| sub.tx.send(message.to_string()).is_ok());
        trace!(channel, delivered = queues.len(), "Published message");
        if queues.is_empty() {
            subscribers.remove(channel);
        }
        Ok(())
    }

    async fn subscribe_listen(&self, channel: &str) -> Result<SignalStream, BackendError> {
        self.ensure_open()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        lock_subscribers(&self.subscribers)
            .entry(channel.to_string())
            .or_default()
            .push(Subscriber { id, tx });

        debug!(channel, subscriber = id, "Subscribed");

        Ok(Box::pin(Subscription {
            channel: channel.to_string(),
            id,
            rx,
            registry: Arc::downgrade(&self.subscribers),
        }))
    }

    async fn set_task_state(
        &self,
        key: &str,
        state: TaskState,
        ttl: Duration,
    ) -> Result<(), BackendError> {
        self.ensure_open()?;

        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .unwrap_or_else(|| now + MAX_TTL);
        self.states
            .write()
            .await
            .insert(Self::full_key(key), StateEntry { state, expires_at });
        Ok(())
    }

    async fn get_task_state(&self, key: &str) -> Result<Option<TaskState>, BackendError> {
        self.ensure_open()?;

        let full_key = Self::full_key(key);
        let mut states = self.states.write().await;
        match states.get(&full_key) {
            None => Ok(None),
            Some(entry) if entry.is_expired(Instant::now()) => {
                // Lazy deletion
                states.remove(&full_key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.state)),
        }
    }

    async fn delete_task_state(&self, key: &str) -> Result<(), BackendError> {
        self.ensure_open()?;
        self.states.write().await.remove(&Self::full_key(key));
        Ok(())
    }

    async fn aclose(&self) -> Result<(), BackendError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.states.write().await.clear();
        // Dropping the senders ends every open subscription stream
        lock_subscribers(&self.subscribers).clear();
        debug!("Memory interrupt backend closed");
        Ok(())
    }
}

fn lock_subscribers(map: &Mutex<SubscriberMap>) -> MutexGuard<'_, SubscriberMap> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Stream handed out by `subscribe_listen`; unregisters itself on drop
struct Subscription {
    channel: String,
    id: u64,
    rx: mpsc::UnboundedReceiver<String>,
    registry: Weak<Mutex<SubscriberMap>>,
}

impl Stream for Subscription {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut subscribers = lock_subscribers(&registry);
        if let Some(queues) = subscribers.get_mut(&self.channel) {
            queues.retain(|sub| sub.id != self.id);
            if queues.is_empty() {
                subscribers.remove(&self.channel);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;
    use tokio_test::{assert_pending, task};

    // ==================== Pub/Sub Tests ====================

    #[tokio::test]
    async fn subscriber_receives_messages_in_publish_order() {
        let backend = MemoryInterruptBackend::new();
        let mut stream = backend.subscribe_listen("chan:a").await.unwrap();

        backend.publish_event("chan:a", "PAUSE").await.unwrap();
        backend.publish_event("chan:a", "RESUME").await.unwrap();
        backend.publish_event("chan:a", "STOP").await.unwrap();

        assert_eq!(stream.next().await.as_deref(), Some("PAUSE"));
        assert_eq!(stream.next().await.as_deref(), Some("RESUME"));
        assert_eq!(stream.next().await.as_deref(), Some("STOP"));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_silently_dropped() {
        let backend = MemoryInterruptBackend::new();
        backend.publish_event("chan:none", "STOP").await.unwrap();

        // A late subscriber does not see earlier messages
        let mut stream = backend.subscribe_listen("chan:none").await.unwrap();
        let mut next = task::spawn(stream.next());
        assert_pending!(next.poll());
    }

    #[tokio::test]
    async fn every_subscriber_gets_a_copy() {
        let backend = MemoryInterruptBackend::new();
        let mut first = backend.subscribe_listen("chan:b").await.unwrap();
        let mut second = backend.subscribe_listen("chan:b").await.unwrap();

        backend.publish_event("chan:b", "STOP").await.unwrap();

        assert_eq!(first.next().await.as_deref(), Some("STOP"));
        assert_eq!(second.next().await.as_deref(), Some("STOP"));
    }

    #[tokio::test]
    async fn channels_are_isolated() {
        let backend = MemoryInterruptBackend::new();
        let mut stream = backend.subscribe_listen("chan:x").await.unwrap();

        backend.publish_event("chan:y", "STOP").await.unwrap();

        let mut next = task::spawn(stream.next());
        assert_pending!(next.poll());
    }

    #[tokio::test]
    async fn dropping_subscription_unregisters_it() {
        let backend = MemoryInterruptBackend::new();
        let stream = backend.subscribe_listen("chan:c").await.unwrap();
        assert_eq!(backend.subscriber_count("chan:c"), 1);

        drop(stream);
        assert_eq!(backend.subscriber_count("chan:c"), 0);
    }

    // ==================== State Store Tests ====================

    #[tokio::test]
    async fn get_missing_key_returns_none() {
        let backend = MemoryInterruptBackend::new();
        assert_eq!(backend.get_task_state("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_then_get_returns_state() {
        let backend = MemoryInterruptBackend::new();
        backend
            .set_task_state("k", TaskState::Running, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            backend.get_task_state("k").await.unwrap(),
            Some(TaskState::Running)
        );
    }

    #[tokio::test]
    async fn set_overwrites_previous_state() {
        let backend = MemoryInterruptBackend::new();
        let ttl = Duration::from_secs(60);
        backend.set_task_state("k", TaskState::Running, ttl).await.unwrap();
        backend.set_task_state("k", TaskState::Finished, ttl).await.unwrap();
        assert_eq!(
            backend.get_task_state("k").await.unwrap(),
            Some(TaskState::Finished)
        );
    }

    #[tokio::test]
    async fn delete_removes_state() {
        let backend = MemoryInterruptBackend::new();
        backend
            .set_task_state("k", TaskState::Stopped, Duration::from_secs(60))
            .await
            .unwrap();
        backend.delete_task_state("k").await.unwrap();
        assert_eq!(backend.get_task_state("k").await.unwrap(), None);

        // Deleting again is fine
        backend.delete_task_state("k").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn state_expires_after_ttl() {
        let backend = MemoryInterruptBackend::new();
        backend
            .set_task_state("t", TaskState::Running, Duration::from_secs(1))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(999)).await;
        assert_eq!(
            backend.get_task_state("t").await.unwrap(),
            Some(TaskState::Running),
            "must not expire before the ttl"
        );

        tokio::time::advance(Duration::from_millis(1001)).await;
        assert_eq!(backend.get_task_state("t").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_expired_removes_only_stale_records() {
        let backend = MemoryInterruptBackend::new();
        backend
            .set_task_state("short", TaskState::Running, Duration::from_secs(1))
            .await
            .unwrap();
        backend
            .set_task_state("long", TaskState::Running, Duration::from_secs(100))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(backend.purge_expired().await, 1);
        assert!(backend.get_task_state("long").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn huge_ttl_does_not_overflow() {
        let backend = MemoryInterruptBackend::new();
        backend
            .set_task_state("k", TaskState::Running, Duration::MAX)
            .await
            .unwrap();
        assert!(backend.get_task_state("k").await.unwrap().is_some());
    }

    // ==================== Close Tests ====================

    #[tokio::test]
    async fn aclose_is_idempotent_and_ends_streams() {
        let backend = MemoryInterruptBackend::new();
        let mut stream = backend.subscribe_listen("chan:d").await.unwrap();

        backend.aclose().await.unwrap();
        backend.aclose().await.unwrap();

        assert!(backend.is_closed());
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn operations_after_close_report_unavailable() {
        let backend = MemoryInterruptBackend::new();
        backend.aclose().await.unwrap();

        let err = backend.get_task_state("k").await.unwrap_err();
        assert!(matches!(err, BackendError::Unavailable(_)));
        assert!(backend.publish_event("c", "STOP").await.is_err());
        assert!(backend.subscribe_listen("c").await.is_err());
    }
}
