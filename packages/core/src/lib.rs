//! Core domain types for the job queue.
//!
//! This crate contains the pieces shared by every other package:
//! - `Job` and its lifecycle state machine
//! - the dispatch mirror codec and broker key layout
//! - `JobEvent` for real-time updates
//! - the `JobStore` and `Broker` collaborator contracts
//! - the error taxonomy

pub mod broker;
mod error;
mod events;
mod job;
mod layout;
pub mod mirror;
pub mod store;

pub use broker::{Broker, Subscription};
pub use error::{BrokerError, JobError, StoreError};
pub use events::JobEvent;
pub use job::{DEFAULT_MAX_RETRIES, FailureOutcome, Job, JobId, JobStatus};
pub use layout::QueueLayout;
pub use store::JobStore;
