//! Durable record store contract.

use std::future::Future;

use crate::error::StoreError;
use crate::job::{Job, JobId};

/// CRUD over durable job records, keyed by id.
///
/// Records are never deleted. Each job's record is written only by its
/// current owner, so implementations need no row locking.
pub trait JobStore: Send + Sync + 'static {
    /// Insert the record of a freshly created job.
    fn insert(&self, job: &Job) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Persist the job's latest transition, creating the record if it is missing.
    fn save(&self, job: &Job) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Fetch a job by id.
    fn get(&self, id: &JobId) -> impl Future<Output = Result<Option<Job>, StoreError>> + Send;

    /// Newest jobs first.
    fn list_recent(&self, limit: usize)
    -> impl Future<Output = Result<Vec<Job>, StoreError>> + Send;
}
