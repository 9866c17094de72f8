//! Worker loop: pops job ids and drives each job through its lifecycle.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use jobbox_core::{Broker, FailureOutcome, Job, JobError, JobId, JobStore, QueueLayout};
use tokio::sync::watch;

use crate::dispatch::{publish_transition, write_mirror};
use crate::handler::HandlerRegistry;
use crate::messages::WorkerExit;

/// Worker settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Name used in logs and pool reports.
    pub worker_id: String,
    /// How long one blocking pop waits before the shutdown flag is rechecked.
    pub poll_timeout: Duration,
    pub layout: QueueLayout,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: "worker".to_string(),
            poll_timeout: Duration::from_secs(5),
            layout: QueueLayout::default(),
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn with_layout(mut self, layout: QueueLayout) -> Self {
        self.layout = layout;
        self
    }
}

/// What happened to one popped id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Retried,
    DeadLettered,
    /// Unknown or stale id, dropped without a transition.
    Skipped,
}

/// Counters kept by a worker over its lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    /// Handler executions.
    pub processed: u64,
    pub completed: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub skipped: u64,
}

impl WorkerStats {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Completed => self.completed += 1,
            Outcome::Retried => self.retried += 1,
            Outcome::DeadLettered => self.dead_lettered += 1,
            Outcome::Skipped => {
                self.skipped += 1;
                return;
            }
        }
        self.processed += 1;
    }

    /// Sum two sets of counters.
    pub fn merge(&mut self, other: &WorkerStats) {
        self.processed += other.processed;
        self.completed += other.completed;
        self.retried += other.retried;
        self.dead_lettered += other.dead_lettered;
        self.skipped += other.skipped;
    }
}

/// A worker ready to be spawned by the supervisor.
pub struct WorkerTask {
    pub worker_id: String,
    pub(crate) run: Box<dyn FnOnce(watch::Receiver<bool>) -> BoxFuture<'static, WorkerExit> + Send>,
}

/// Drives jobs through the state machine.
///
/// Every transition is written to the durable store, then to the mirror,
/// then broadcast. Handler failures are absorbed into job state; store and
/// broker failures end the loop.
pub struct Worker<S, B> {
    store: Arc<S>,
    broker: Arc<B>,
    handlers: Arc<HandlerRegistry>,
    config: WorkerConfig,
    stats: WorkerStats,
}

impl<S: JobStore, B: Broker> Worker<S, B> {
    pub fn new(
        store: Arc<S>,
        broker: Arc<B>,
        handlers: Arc<HandlerRegistry>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            broker,
            handlers,
            config,
            stats: WorkerStats::default(),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    /// Run until `shutdown` turns true.
    ///
    /// The flag is only checked between pops, so a running handler always
    /// finishes. Returns the final counters, or the first infrastructure
    /// error.
    pub async fn run(&mut self, shutdown: watch::Receiver<bool>) -> Result<WorkerStats, JobError> {
        tracing::info!(worker_id = %self.config.worker_id, "Worker started");

        loop {
            let draining = *shutdown.borrow();
            if draining {
                break;
            }
            self.run_once().await?;
        }

        tracing::info!(
            worker_id = %self.config.worker_id,
            processed = self.stats.processed,
            "Worker drained"
        );
        Ok(self.stats)
    }

    /// One pop attempt. `None` when the poll timed out on an empty queue.
    pub async fn run_once(&mut self) -> Result<Option<Outcome>, JobError> {
        let popped = self
            .broker
            .pop_blocking(&self.config.layout.work_queue, self.config.poll_timeout)
            .await?;

        let Some(raw) = popped else {
            return Ok(None);
        };

        let outcome = match JobId::parse(&raw) {
            Ok(id) => self.process(id).await?,
            Err(e) => {
                tracing::warn!(worker_id = %self.config.worker_id, raw = %raw, error = %e, "Dropping malformed job id");
                Outcome::Skipped
            }
        };
        self.stats.record(outcome);

        Ok(Some(outcome))
    }

    /// Take ownership of a popped id and run it to its next resting state.
    pub async fn process(&self, id: JobId) -> Result<Outcome, JobError> {
        let Some(mut job) = self.load(&id).await? else {
            tracing::warn!(worker_id = %self.config.worker_id, job_id = %id, "Dropping job id with no usable state");
            return Ok(Outcome::Skipped);
        };

        match job.start(Utc::now()) {
            Ok(()) => {}
            Err(JobError::InvalidTransition { from, .. }) => {
                tracing::warn!(
                    worker_id = %self.config.worker_id,
                    job_id = %id,
                    status = %from,
                    "Dropping stale job id"
                );
                return Ok(Outcome::Skipped);
            }
            Err(e) => return Err(e),
        }
        self.record(&job).await?;

        match self.execute(&job).await {
            Ok(()) => {
                job.complete(Utc::now())?;
                self.record(&job).await?;
                Ok(Outcome::Completed)
            }
            Err(reason) => {
                tracing::debug!(job_id = %id, reason = %reason, "Handler failed");
                let layout = &self.config.layout;
                let id = id.to_string();
                match job.fail(reason, Utc::now())? {
                    FailureOutcome::Retry => {
                        self.record(&job).await?;
                        self.broker.push_tail(&layout.work_queue, &id).await?;
                        Ok(Outcome::Retried)
                    }
                    FailureOutcome::DeadLetter => {
                        self.record(&job).await?;
                        self.broker.push_head(&layout.dead_letter, &id).await?;
                        tracing::warn!(job_id = %id, "Job dead-lettered");
                        Ok(Outcome::DeadLettered)
                    }
                }
            }
        }
    }

    /// Current state from the mirror, falling back to the durable record.
    /// An unreadable mirror counts as no state at all.
    async fn load(&self, id: &JobId) -> Result<Option<Job>, JobError> {
        let key = self.config.layout.mirror_key(id);
        if let Some(fields) = self.broker.hash_get(&key).await? {
            return match Job::from_mirror(*id, &fields) {
                Ok(job) => Ok(Some(job)),
                Err(e) => {
                    tracing::warn!(job_id = %id, error = %e, "Unreadable mirror");
                    Ok(None)
                }
            };
        }
        Ok(self.store.get(id).await?)
    }

    async fn record(&self, job: &Job) -> Result<(), JobError> {
        self.store.save(job).await?;
        write_mirror(&*self.broker, &self.config.layout, job).await?;
        publish_transition(&*self.broker, &self.config.layout, job).await?;
        Ok(())
    }

    async fn execute(&self, job: &Job) -> Result<(), String> {
        let Some(handler) = self.handlers.get(&job.job_type) else {
            return Err(format!(
                "no handler registered for job type '{}'",
                job.job_type
            ));
        };

        AssertUnwindSafe(async { handler.handle(&job.payload).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(format!("handler panicked: {}", panic_message(&*panic))))
    }

    /// Package this worker for [`start_supervisor`](crate::start_supervisor).
    pub fn into_task(mut self) -> WorkerTask {
        let worker_id = self.config.worker_id.clone();
        WorkerTask {
            worker_id: worker_id.clone(),
            run: Box::new(move |shutdown: watch::Receiver<bool>| -> BoxFuture<'static, WorkerExit> {
                Box::pin(async move {
                    let result = self.run(shutdown).await;
                    WorkerExit {
                        worker_id,
                        stats: self.stats,
                        error: result.err().map(|e| e.to_string()),
                    }
                })
            }),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_count_executions_only() {
        let mut stats = WorkerStats::default();
        stats.record(Outcome::Completed);
        stats.record(Outcome::Retried);
        stats.record(Outcome::Skipped);
        stats.record(Outcome::DeadLettered);

        assert_eq!(stats.processed, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.retried, 1);
        assert_eq!(stats.dead_lettered, 1);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn panic_messages_are_extracted() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*boxed), "boom");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(panic_message(&*boxed), "kaboom");

        let boxed: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(&*boxed), "unknown panic");
    }
}
