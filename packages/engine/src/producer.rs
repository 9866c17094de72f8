//! Job producer: validates requests and hands new jobs to the workers.

use std::sync::Arc;

use jobbox_core::{Broker, Job, JobError, JobStore, QueueLayout};
use serde_json::{Map, Value};

const TYPE_REQUIRED: &str = "type is required";

/// A request to enqueue one job.
#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueRequest {
    pub job_type: String,
    pub payload: Value,
    pub max_retries: Option<u32>,
}

impl EnqueueRequest {
    pub fn new(job_type: impl Into<String>, payload: Value) -> Self {
        Self {
            job_type: job_type.into(),
            payload,
            max_retries: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Parse a loosely typed request body `{type, payload?, maxRetries?}`.
    ///
    /// Anything that is not an object is treated as an empty object, so it
    /// fails on the missing type. A missing payload becomes `{}`.
    pub fn from_json(body: &Value) -> Result<Self, JobError> {
        let empty = Map::new();
        let fields = body.as_object().unwrap_or(&empty);

        let job_type = fields
            .get("type")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| JobError::Validation(TYPE_REQUIRED.to_string()))?;

        let payload = fields
            .get("payload")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));

        let max_retries = match fields.get("maxRetries") {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                value
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| {
                        JobError::Validation(
                            "maxRetries must be a non-negative integer".to_string(),
                        )
                    })?,
            ),
        };

        Ok(Self {
            job_type: job_type.to_string(),
            payload,
            max_retries,
        })
    }
}

/// Creates jobs: durable record first, then the broker structures, then
/// the `enqueued` broadcast.
pub struct Producer<S, B> {
    store: Arc<S>,
    broker: Arc<B>,
    layout: QueueLayout,
}

impl<S, B> Clone for Producer<S, B> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            broker: self.broker.clone(),
            layout: self.layout.clone(),
        }
    }
}

impl<S: JobStore, B: Broker> Producer<S, B> {
    pub fn new(store: Arc<S>, broker: Arc<B>, layout: QueueLayout) -> Self {
        Self {
            store,
            broker,
            layout,
        }
    }

    pub fn layout(&self) -> &QueueLayout {
        &self.layout
    }

    /// Enqueue a new job.
    ///
    /// Every call creates a distinct job. Each step completes before the
    /// next starts; the first store or broker failure aborts the call.
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<Job, JobError> {
        let job_type = request.job_type.trim();
        if job_type.is_empty() {
            return Err(JobError::Validation(TYPE_REQUIRED.to_string()));
        }

        let mut job = Job::new(job_type, request.payload);
        if let Some(max_retries) = request.max_retries {
            job = job.with_max_retries(max_retries);
        }
        let id = job.id.to_string();

        self.store.insert(&job).await?;
        crate::dispatch::write_mirror(&*self.broker, &self.layout, &job).await?;
        self.broker.push_tail(&self.layout.work_queue, &id).await?;
        self.broker.push_head(&self.layout.recent, &id).await?;
        self.broker
            .list_trim(&self.layout.recent, 0, self.layout.recent_cap.saturating_sub(1))
            .await?;
        crate::dispatch::publish_transition(&*self.broker, &self.layout, &job).await?;

        tracing::info!(job_id = %job.id, job_type = %job.job_type, "Job enqueued");

        Ok(job)
    }
}
