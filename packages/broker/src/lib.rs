//! Dispatch broker backends.
//!
//! - `MemoryBroker` - in-process lists, hashes and channels
//! - `RedisBroker` - shared Redis server (`redis` feature)
//! - `AnyBroker` - picks one of the above from a URL
//!
//! # Usage
//!
//! ```ignore
//! use jobbox_broker::AnyBroker;
//!
//! let broker = AnyBroker::connect("memory://").await?;
//! broker.push_tail("jobs:queue", "01J...").await?;
//! ```

mod any;
mod memory;
#[cfg(feature = "redis")]
mod redis_broker;

pub use any::{AnyBroker, AnySubscription};
pub use memory::{MemoryBroker, MemorySubscription};
#[cfg(feature = "redis")]
pub use redis_broker::{RedisBroker, RedisSubscription};

pub use jobbox_core::{Broker, BrokerError, Subscription};
