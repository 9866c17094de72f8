//! Job domain types and the lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::JobError;

/// Default retry budget for a job when the producer does not supply one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current status of a job in its lifecycle.
///
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting in the work queue.
    #[default]
    Queued,
    /// Owned by exactly one worker.
    Running,
    /// Handler succeeded.
    Completed,
    /// Retry budget exhausted; the id lives in the dead-letter list.
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Get a simple status string for storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(JobError::Validation(format!("unknown job status: {other}"))),
        }
    }
}

/// What a failed execution led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Back to `queued`; the id goes to the tail of the work queue.
    Retry,
    /// Terminal `failed`; the id goes to the head of the dead-letter list.
    DeadLetter,
}

/// A job represents a unit of work to be executed by the queue system.
///
/// Serializes to the public projection shape shared by the REST API and
/// the broadcast channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Type of job (used for routing to handlers).
    #[serde(rename = "type")]
    pub job_type: String,
    /// Job payload, never interpreted by the queue itself.
    pub payload: serde_json::Value,
    /// Current status.
    pub status: JobStatus,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job last transitioned.
    pub updated_at: DateTime<Utc>,
    /// Number of failed executions so far.
    #[serde(default)]
    pub retry_count: u32,
    /// Failed executions tolerated before dead-lettering.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Reason of the most recent failure.
    #[serde(default)]
    pub last_error: Option<String>,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl Job {
    /// Create a new queued job.
    pub fn new(job_type: impl Into<String>, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            job_type: job_type.into(),
            payload,
            status: JobStatus::Queued,
            created_at: now,
            updated_at: now,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            last_error: None,
        }
    }

    /// Set the max retries for this job.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// queued -> running.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), JobError> {
        self.transition(JobStatus::Queued, JobStatus::Running, now)
    }

    /// running -> completed.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), JobError> {
        self.transition(JobStatus::Running, JobStatus::Completed, now)
    }

    /// Record a failed execution.
    ///
    /// Always bumps `retry_count` by one. The job goes back to `queued` while
    /// `retry_count <= max_retries`, otherwise it becomes `failed`.
    pub fn fail(
        &mut self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome, JobError> {
        let retry_count = self.retry_count.saturating_add(1);
        let (target, outcome) = if retry_count <= self.max_retries {
            (JobStatus::Queued, FailureOutcome::Retry)
        } else {
            (JobStatus::Failed, FailureOutcome::DeadLetter)
        };

        self.transition(JobStatus::Running, target, now)?;
        self.retry_count = retry_count;
        self.last_error = Some(reason.into());
        Ok(outcome)
    }

    fn transition(
        &mut self,
        expected: JobStatus,
        to: JobStatus,
        now: DateTime<Utc>,
    ) -> Result<(), JobError> {
        if self.status != expected {
            return Err(JobError::InvalidTransition {
                id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }
}
