//! Event types for real-time updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::{Job, JobId, JobStatus};

/// A job transition broadcast to live viewers.
///
/// Serializes as the job projection plus an `event` tag, so the stream
/// carries the same shape as the REST endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// A new job was enqueued.
    Enqueued(Job),
    /// A worker took ownership and is about to run the handler.
    Started(Job),
    /// The handler succeeded.
    Completed(Job),
    /// The handler failed and the job went back to the work queue.
    Retrying(Job),
    /// The handler failed and the retry budget is spent.
    DeadLettered(Job),
}

impl JobEvent {
    /// Derive the event describing the job's latest transition.
    pub fn from_transition(job: &Job) -> Self {
        let job = job.clone();
        match job.status {
            JobStatus::Queued if job.retry_count > 0 => JobEvent::Retrying(job),
            JobStatus::Queued => JobEvent::Enqueued(job),
            JobStatus::Running => JobEvent::Started(job),
            JobStatus::Completed => JobEvent::Completed(job),
            JobStatus::Failed => JobEvent::DeadLettered(job),
        }
    }

    /// The job snapshot carried by this event.
    pub fn job(&self) -> &Job {
        match self {
            JobEvent::Enqueued(job)
            | JobEvent::Started(job)
            | JobEvent::Completed(job)
            | JobEvent::Retrying(job)
            | JobEvent::DeadLettered(job) => job,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job().id
    }

    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.job().updated_at
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::Enqueued(job) => format!("Job {} enqueued", job.id),
            JobEvent::Started(job) => format!("Job {} started", job.id),
            JobEvent::Completed(job) => format!("Job {} completed", job.id),
            JobEvent::Retrying(job) => format!(
                "Job {} failed, retrying ({}/{})",
                job.id, job.retry_count, job.max_retries
            ),
            JobEvent::DeadLettered(job) => format!(
                "Job {} dead-lettered: {}",
                job.id,
                job.last_error.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    /// Encode for the broadcast channel.
    pub fn to_message(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a broadcast channel message.
    pub fn from_message(message: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(message)
    }
}
