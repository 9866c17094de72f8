//! Error taxonomy shared by every component.

use thiserror::Error;

use crate::job::{JobId, JobStatus};

/// Durable store failures. Always treated as infrastructure failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(String),
    #[error("store query error: {0}")]
    Query(String),
    #[error("corrupt store record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

/// Dispatch broker failures. Always treated as infrastructure failures.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker is closed")]
    Closed,
    #[error("broker connection error: {0}")]
    Connection(String),
    #[error("broker command error: {0}")]
    Command(String),
}

/// Errors surfaced by producers, workers and queries.
#[derive(Debug, Error)]
pub enum JobError {
    /// Bad enqueue input; surfaced to the caller as a rejected request.
    #[error("{0}")]
    Validation(String),

    /// Unknown job id.
    #[error("job not found: {0}")]
    NotFound(String),

    /// The durable store was unreachable or failed mid-operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The broker was unreachable or failed mid-operation.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// A transition was requested from a state that does not allow it.
    #[error("invalid transition for job {id}: {from} -> {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
}

impl JobError {
    /// Store or broker failure: fatal for the unit of work that hit it.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, JobError::Store(_) | JobError::Broker(_))
    }
}
