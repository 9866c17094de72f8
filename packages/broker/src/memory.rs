//! In-process broker.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use jobbox_core::{Broker, BrokerError, Subscription};
use tokio::sync::{Notify, broadcast};
use tokio::time::Instant;

/// Messages a slow subscriber may fall behind before it starts skipping.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Default)]
struct State {
    lists: HashMap<String, VecDeque<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
    channels: HashMap<String, broadcast::Sender<String>>,
}

struct Inner {
    state: Mutex<State>,
    pushed: Notify,
    closed: AtomicBool,
}

/// Broker living inside one process.
///
/// Clones share the same data, so a producer and several workers in one
/// process can hand jobs to each other through it.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                pushed: Notify::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Current length of a list.
    pub fn list_len(&self, list: &str) -> Result<usize, BrokerError> {
        let state = self.lock()?;
        Ok(state.lists.get(list).map_or(0, VecDeque::len))
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, BrokerError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }
        self.inner
            .state
            .lock()
            .map_err(|_| BrokerError::Command("broker state poisoned".to_string()))
    }

    fn try_pop(&self, list: &str) -> Result<Option<String>, BrokerError> {
        let mut state = self.lock()?;
        let Some(items) = state.lists.get_mut(list) else {
            return Ok(None);
        };
        let value = items.pop_front();
        if items.is_empty() {
            state.lists.remove(list);
        }
        Ok(value)
    }
}

/// Clamp an inclusive `start..=stop` range to a list of `len` elements.
fn clamp_range(len: usize, start: usize, stop: usize) -> Option<(usize, usize)> {
    if len == 0 || start >= len || start > stop {
        return None;
    }
    Some((start, stop.min(len - 1)))
}

impl Broker for MemoryBroker {
    type Subscription = MemorySubscription;

    async fn push_tail(&self, list: &str, value: &str) -> Result<(), BrokerError> {
        {
            let mut state = self.lock()?;
            state
                .lists
                .entry(list.to_string())
                .or_default()
                .push_back(value.to_string());
        }
        self.inner.pushed.notify_waiters();
        Ok(())
    }

    async fn push_head(&self, list: &str, value: &str) -> Result<(), BrokerError> {
        {
            let mut state = self.lock()?;
            state
                .lists
                .entry(list.to_string())
                .or_default()
                .push_front(value.to_string());
        }
        self.inner.pushed.notify_waiters();
        Ok(())
    }

    async fn pop_blocking(
        &self,
        list: &str,
        timeout: Duration,
    ) -> Result<Option<String>, BrokerError> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register for wakeups before looking, so a push between the
            // check and the wait is not missed.
            let notified = self.inner.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.try_pop(list)? {
                return Ok(Some(value));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn list_trim(&self, list: &str, start: usize, stop: usize) -> Result<(), BrokerError> {
        let mut state = self.lock()?;
        let Some(items) = state.lists.get_mut(list) else {
            return Ok(());
        };

        match clamp_range(items.len(), start, stop) {
            Some((start, stop)) => {
                items.truncate(stop + 1);
                items.drain(..start);
            }
            None => items.clear(),
        }
        if items.is_empty() {
            state.lists.remove(list);
        }
        Ok(())
    }

    async fn list_range(
        &self,
        list: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<String>, BrokerError> {
        let state = self.lock()?;
        let Some(items) = state.lists.get(list) else {
            return Ok(Vec::new());
        };

        Ok(match clamp_range(items.len(), start, stop) {
            Some((start, stop)) => items.range(start..=stop).cloned().collect(),
            None => Vec::new(),
        })
    }

    async fn hash_get(&self, key: &str) -> Result<Option<HashMap<String, String>>, BrokerError> {
        let state = self.lock()?;
        Ok(state.hashes.get(key).cloned())
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), BrokerError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut state = self.lock()?;
        let hash = state.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<usize, BrokerError> {
        let state = self.lock()?;
        let Some(sender) = state.channels.get(channel) else {
            return Ok(0);
        };
        // No receivers is not an error for a broadcast.
        Ok(sender.send(message.to_string()).unwrap_or(0))
    }

    async fn subscribe(&self, channel: &str) -> Result<MemorySubscription, BrokerError> {
        let mut state = self.lock()?;
        let receiver = state
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();

        tracing::debug!(channel, "memory subscription opened");

        Ok(MemorySubscription {
            channel: channel.to_string(),
            receiver: Some(receiver),
        })
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // Dropping the senders ends every open subscription.
        if let Ok(mut state) = self.inner.state.lock() {
            state.channels.clear();
        }
        self.inner.pushed.notify_waiters();
        tracing::debug!("memory broker closed");
        Ok(())
    }
}

/// Subscriber on a [`MemoryBroker`] channel.
pub struct MemorySubscription {
    channel: String,
    receiver: Option<broadcast::Receiver<String>>,
}

impl Subscription for MemorySubscription {
    async fn next_message(&mut self) -> Option<String> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(channel = %self.channel, skipped, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.receiver = None;
                    return None;
                }
            }
        }
    }

    async fn unsubscribe(&mut self) -> Result<(), BrokerError> {
        self.receiver = None;
        Ok(())
    }
}
