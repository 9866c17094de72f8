//! Broker selected at runtime from a URL.

use std::collections::HashMap;
use std::time::Duration;

use jobbox_core::{Broker, BrokerError, Subscription};

use crate::memory::{MemoryBroker, MemorySubscription};
#[cfg(feature = "redis")]
use crate::redis_broker::{RedisBroker, RedisSubscription};

/// Either backend, chosen by [`AnyBroker::connect`].
#[derive(Clone)]
pub enum AnyBroker {
    Memory(MemoryBroker),
    #[cfg(feature = "redis")]
    Redis(RedisBroker),
}

impl AnyBroker {
    /// Open a broker from a URL.
    ///
    /// `memory://` gives a fresh in-process broker; `redis://` and
    /// `rediss://` connect to a server when the `redis` feature is enabled.
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let url = url.trim();
        if url.is_empty() || url == "memory" || url.starts_with("memory://") {
            tracing::info!("Using in-memory broker");
            return Ok(Self::Memory(MemoryBroker::new()));
        }

        if url.starts_with("redis://") || url.starts_with("rediss://") {
            #[cfg(feature = "redis")]
            {
                return Ok(Self::Redis(RedisBroker::connect(url).await?));
            }
            #[cfg(not(feature = "redis"))]
            {
                return Err(BrokerError::Connection(
                    "redis support is not enabled in this build".to_string(),
                ));
            }
        }

        Err(BrokerError::Connection(format!(
            "unsupported broker url: {url}"
        )))
    }

    /// Backend name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            #[cfg(feature = "redis")]
            Self::Redis(_) => "redis",
        }
    }
}

impl From<MemoryBroker> for AnyBroker {
    fn from(broker: MemoryBroker) -> Self {
        Self::Memory(broker)
    }
}

/// Subscription of an [`AnyBroker`].
pub enum AnySubscription {
    Memory(MemorySubscription),
    #[cfg(feature = "redis")]
    Redis(RedisSubscription),
}

macro_rules! dispatch {
    ($self:expr, $b:ident => $call:expr) => {
        match $self {
            AnyBroker::Memory($b) => $call,
            #[cfg(feature = "redis")]
            AnyBroker::Redis($b) => $call,
        }
    };
}

impl Broker for AnyBroker {
    type Subscription = AnySubscription;

    async fn push_tail(&self, list: &str, value: &str) -> Result<(), BrokerError> {
        dispatch!(self, b => b.push_tail(list, value).await)
    }

    async fn push_head(&self, list: &str, value: &str) -> Result<(), BrokerError> {
        dispatch!(self, b => b.push_head(list, value).await)
    }

    async fn pop_blocking(
        &self,
        list: &str,
        timeout: Duration,
    ) -> Result<Option<String>, BrokerError> {
        dispatch!(self, b => b.pop_blocking(list, timeout).await)
    }

    async fn list_trim(&self, list: &str, start: usize, stop: usize) -> Result<(), BrokerError> {
        dispatch!(self, b => b.list_trim(list, start, stop).await)
    }

    async fn list_range(
        &self,
        list: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<String>, BrokerError> {
        dispatch!(self, b => b.list_range(list, start, stop).await)
    }

    async fn hash_get(&self, key: &str) -> Result<Option<HashMap<String, String>>, BrokerError> {
        dispatch!(self, b => b.hash_get(key).await)
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), BrokerError> {
        dispatch!(self, b => b.hash_set(key, fields).await)
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<usize, BrokerError> {
        dispatch!(self, b => b.publish(channel, message).await)
    }

    async fn subscribe(&self, channel: &str) -> Result<AnySubscription, BrokerError> {
        match self {
            AnyBroker::Memory(b) => Ok(AnySubscription::Memory(b.subscribe(channel).await?)),
            #[cfg(feature = "redis")]
            AnyBroker::Redis(b) => Ok(AnySubscription::Redis(b.subscribe(channel).await?)),
        }
    }

    async fn close(&self) -> Result<(), BrokerError> {
        dispatch!(self, b => b.close().await)
    }
}

impl Subscription for AnySubscription {
    async fn next_message(&mut self) -> Option<String> {
        match self {
            AnySubscription::Memory(s) => s.next_message().await,
            #[cfg(feature = "redis")]
            AnySubscription::Redis(s) => s.next_message().await,
        }
    }

    async fn unsubscribe(&mut self) -> Result<(), BrokerError> {
        match self {
            AnySubscription::Memory(s) => s.unsubscribe().await,
            #[cfg(feature = "redis")]
            AnySubscription::Redis(s) => s.unsubscribe().await,
        }
    }
}
