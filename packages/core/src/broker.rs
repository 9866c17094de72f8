//! Dispatch broker contract.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use crate::error::BrokerError;

/// Atomic single-key list / hash / pub-sub primitives.
///
/// No multi-key transaction is provided. `pop_blocking` hands each element
/// to at most one concurrent caller; that exclusive pop is the only
/// ownership primitive the queue relies on.
pub trait Broker: Send + Sync + 'static {
    /// Dedicated subscriber returned by [`Broker::subscribe`].
    type Subscription: Subscription;

    /// Append to the tail of a list.
    fn push_tail(&self, list: &str, value: &str)
    -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Prepend to the head of a list.
    fn push_head(&self, list: &str, value: &str)
    -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Pop from the head of a list, waiting up to `timeout` for an element.
    fn pop_blocking(
        &self,
        list: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<String>, BrokerError>> + Send;

    /// Keep only elements `start..=stop` (non-negative indexes).
    fn list_trim(
        &self,
        list: &str,
        start: usize,
        stop: usize,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Elements `start..=stop` (non-negative indexes).
    fn list_range(
        &self,
        list: &str,
        start: usize,
        stop: usize,
    ) -> impl Future<Output = Result<Vec<String>, BrokerError>> + Send;

    /// All fields of a hash, or `None` when the key does not exist.
    fn hash_get(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<HashMap<String, String>>, BrokerError>> + Send;

    /// Set the given fields of a hash, leaving other fields untouched.
    fn hash_set(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Broadcast a message; returns how many subscribers received it.
    fn publish(
        &self,
        channel: &str,
        message: &str,
    ) -> impl Future<Output = Result<usize, BrokerError>> + Send;

    /// Open a dedicated subscriber on `channel`.
    fn subscribe(
        &self,
        channel: &str,
    ) -> impl Future<Output = Result<Self::Subscription, BrokerError>> + Send;

    /// Release the handle. Later calls fail with [`BrokerError::Closed`].
    fn close(&self) -> impl Future<Output = Result<(), BrokerError>> + Send;
}

/// A live subscription owning its own broker connection.
///
/// Dropping it releases the connection.
pub trait Subscription: Send + 'static {
    /// Next broadcast message, or `None` once the subscription has ended.
    fn next_message(&mut self) -> impl Future<Output = Option<String>> + Send;

    /// Stop receiving messages.
    fn unsubscribe(&mut self) -> impl Future<Output = Result<(), BrokerError>> + Send;
}
