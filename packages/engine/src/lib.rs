//! Job lifecycle engine.
//!
//! This crate drives jobs through their state machine on top of a
//! [`JobStore`](jobbox_core::JobStore) and a [`Broker`](jobbox_core::Broker).
//!
//! # Architecture
//!
//! - `Producer` - validates requests and publishes new jobs
//! - `Worker` - pops ids, runs handlers, records every transition
//! - `JobQueries` - read side used by the HTTP surface
//! - `WorkerSupervisor` - Ractor actor owning a pool of worker tasks
//!
//! # Usage
//!
//! ```ignore
//! use jobbox_engine::{HandlerRegistry, FnHandler, Worker, WorkerConfig, start_supervisor};
//!
//! let mut handlers = HandlerRegistry::new();
//! handlers.register(FnHandler::new("echo", |payload| async move { Ok(()) }));
//!
//! let worker = Worker::new(store, broker, Arc::new(handlers), WorkerConfig::default());
//! let (supervisor, _handle, report) = start_supervisor(vec![worker.into_task()]).await?;
//! ```

mod dispatch;
mod handler;
mod messages;
mod producer;
mod queries;
mod supervisor;
mod worker;

pub use handler::{FnHandler, HandlerFuture, HandlerRegistry, HandlerResult, JobHandler};
pub use messages::{PoolReport, PoolStatus, SupervisorMessage, WorkerExit};
pub use producer::{EnqueueRequest, Producer};
pub use queries::{JobQueries, RECENT_LIMIT};
pub use supervisor::{SupervisorArgs, WorkerSupervisor, start_supervisor};
pub use worker::{Outcome, Worker, WorkerConfig, WorkerStats, WorkerTask};

/// Re-export ractor types for convenience.
pub use ractor::{ActorRef, RpcReplyPort};
