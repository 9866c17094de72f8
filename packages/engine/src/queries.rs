//! Read side used by the HTTP surface.

use std::sync::Arc;

use jobbox_core::{Broker, Job, JobError, JobId, JobStore, QueueLayout};

/// Default size of the recent and dead-letter listings.
pub const RECENT_LIMIT: usize = 20;

/// Read-only views over the store and the broker structures.
pub struct JobQueries<S, B> {
    store: Arc<S>,
    broker: Arc<B>,
    layout: QueueLayout,
}

impl<S, B> Clone for JobQueries<S, B> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            broker: self.broker.clone(),
            layout: self.layout.clone(),
        }
    }
}

impl<S: JobStore, B: Broker> JobQueries<S, B> {
    pub fn new(store: Arc<S>, broker: Arc<B>, layout: QueueLayout) -> Self {
        Self {
            store,
            broker,
            layout,
        }
    }

    /// Newest jobs first, read from the recent index and the mirrors.
    ///
    /// Ids whose mirror has vanished are skipped, so fewer than `limit`
    /// jobs may come back.
    pub async fn recent(&self, limit: usize) -> Result<Vec<Job>, JobError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let ids = self
            .broker
            .list_range(&self.layout.recent, 0, limit - 1)
            .await?;

        let mut jobs = Vec::with_capacity(ids.len());
        for raw in ids {
            let Ok(id) = JobId::parse(&raw) else {
                tracing::warn!(raw = %raw, "Skipping malformed id in recent index");
                continue;
            };
            if let Some(fields) = self.broker.hash_get(&self.layout.mirror_key(&id)).await? {
                match Job::from_mirror(id, &fields) {
                    Ok(job) => jobs.push(job),
                    Err(e) => tracing::warn!(job_id = %id, error = %e, "Skipping unreadable mirror"),
                }
            }
        }
        Ok(jobs)
    }

    /// The durable record of one job. Ids that do not parse are unknown ids.
    pub async fn get(&self, id: &str) -> Result<Job, JobError> {
        let not_found = || JobError::NotFound(id.to_string());
        let job_id = JobId::parse(id).map_err(|_| not_found())?;
        self.store.get(&job_id).await?.ok_or_else(not_found)
    }

    /// Dead-lettered jobs, most recent failure first.
    pub async fn dead_letters(&self, limit: usize) -> Result<Vec<Job>, JobError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let ids = self
            .broker
            .list_range(&self.layout.dead_letter, 0, limit - 1)
            .await?;

        let mut jobs = Vec::with_capacity(ids.len());
        for raw in ids {
            let Ok(id) = JobId::parse(&raw) else {
                continue;
            };
            match self.store.get(&id).await? {
                Some(job) => jobs.push(job),
                None => tracing::warn!(job_id = %id, "Dead-lettered job has no record"),
            }
        }
        Ok(jobs)
    }
}
