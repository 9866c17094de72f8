//! Redis-backed broker.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use jobbox_core::{Broker, BrokerError, Subscription};
use redis::aio::{MultiplexedConnection, PubSub};
use redis::{Client, RedisError};
use tokio::sync::Mutex;

/// `BLPOP` treats a zero timeout as "block forever", which would keep a
/// worker from ever seeing its shutdown flag.
const MIN_BLOCK: Duration = Duration::from_millis(100);

fn blpop_timeout(timeout: Duration) -> f64 {
    timeout.max(MIN_BLOCK).as_secs_f64()
}

fn command_error(err: RedisError) -> BrokerError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
        BrokerError::Connection(err.to_string())
    } else {
        BrokerError::Command(err.to_string())
    }
}

/// Broker backed by a Redis server.
///
/// Ordinary commands share one multiplexed connection. Blocking pops each
/// hold a connection of their own, taken from a small idle pool, so a
/// worker waiting on an empty queue never stalls other commands.
#[derive(Clone)]
pub struct RedisBroker {
    client: Client,
    conn: MultiplexedConnection,
    blocking: Arc<Mutex<Vec<MultiplexedConnection>>>,
    closed: Arc<AtomicBool>,
}

impl RedisBroker {
    /// Connect to `redis://` or `rediss://` URL.
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let client = Client::open(url).map_err(|e| BrokerError::Connection(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        tracing::info!("Connected to redis broker");

        Ok(Self {
            client,
            conn,
            blocking: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    fn connection(&self) -> Result<MultiplexedConnection, BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }
        Ok(self.conn.clone())
    }

    async fn blocking_connection(&self) -> Result<MultiplexedConnection, BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }
        if let Some(conn) = self.blocking.lock().await.pop() {
            return Ok(conn);
        }
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))
    }
}

impl Broker for RedisBroker {
    type Subscription = RedisSubscription;

    async fn push_tail(&self, list: &str, value: &str) -> Result<(), BrokerError> {
        let mut conn = self.connection()?;
        redis::cmd("RPUSH")
            .arg(list)
            .arg(value)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(command_error)
    }

    async fn push_head(&self, list: &str, value: &str) -> Result<(), BrokerError> {
        let mut conn = self.connection()?;
        redis::cmd("LPUSH")
            .arg(list)
            .arg(value)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(command_error)
    }

    async fn pop_blocking(
        &self,
        list: &str,
        timeout: Duration,
    ) -> Result<Option<String>, BrokerError> {
        let mut conn = self.blocking_connection().await?;

        let popped = redis::cmd("BLPOP")
            .arg(list)
            .arg(blpop_timeout(timeout))
            .query_async::<_, Option<(String, String)>>(&mut conn)
            .await
            .map_err(command_error)?;

        // A connection that failed is dropped above; only healthy ones return.
        if !self.closed.load(Ordering::Acquire) {
            self.blocking.lock().await.push(conn);
        }

        Ok(popped.map(|(_, value)| value))
    }

    async fn list_trim(&self, list: &str, start: usize, stop: usize) -> Result<(), BrokerError> {
        let mut conn = self.connection()?;
        redis::cmd("LTRIM")
            .arg(list)
            .arg(start)
            .arg(stop)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(command_error)
    }

    async fn list_range(
        &self,
        list: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<String>, BrokerError> {
        let mut conn = self.connection()?;
        redis::cmd("LRANGE")
            .arg(list)
            .arg(start)
            .arg(stop)
            .query_async::<_, Vec<String>>(&mut conn)
            .await
            .map_err(command_error)
    }

    async fn hash_get(&self, key: &str) -> Result<Option<HashMap<String, String>>, BrokerError> {
        let mut conn = self.connection()?;
        let fields = redis::cmd("HGETALL")
            .arg(key)
            .query_async::<_, HashMap<String, String>>(&mut conn)
            .await
            .map_err(command_error)?;

        // Redis reports a missing key as an empty hash.
        Ok((!fields.is_empty()).then_some(fields))
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), BrokerError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection()?;
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }
        cmd.query_async::<_, ()>(&mut conn)
            .await
            .map_err(command_error)
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<usize, BrokerError> {
        let mut conn = self.connection()?;
        redis::cmd("PUBLISH")
            .arg(channel)
            .arg(message)
            .query_async::<_, usize>(&mut conn)
            .await
            .map_err(command_error)
    }

    async fn subscribe(&self, channel: &str) -> Result<RedisSubscription, BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        pubsub.subscribe(channel).await.map_err(command_error)?;

        tracing::debug!(channel, "redis subscription opened");

        Ok(RedisSubscription {
            channel: channel.to_string(),
            pubsub: Some(pubsub),
        })
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.blocking.lock().await.clear();
        tracing::info!("Redis broker closed");
        Ok(())
    }
}

/// Subscriber holding its own Redis pub/sub connection.
pub struct RedisSubscription {
    channel: String,
    pubsub: Option<PubSub>,
}

impl Subscription for RedisSubscription {
    async fn next_message(&mut self) -> Option<String> {
        let pubsub = self.pubsub.as_mut()?;
        loop {
            let msg = pubsub.on_message().next().await?;
            match msg.get_payload::<String>() {
                Ok(payload) => return Some(payload),
                Err(e) => {
                    tracing::warn!(channel = %self.channel, error = %e, "skipping undecodable message");
                }
            }
        }
    }

    async fn unsubscribe(&mut self) -> Result<(), BrokerError> {
        if let Some(mut pubsub) = self.pubsub.take() {
            pubsub
                .unsubscribe(self.channel.as_str())
                .await
                .map_err(command_error)?;
        }
        Ok(())
    }
}
