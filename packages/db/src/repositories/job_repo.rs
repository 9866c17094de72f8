//! Job repository: durable job records in SurrealDB.

use chrono::{DateTime, SecondsFormat, Utc};
use jobbox_core::mirror::{decode_payload, encode_payload};
use jobbox_core::{Job, JobId, JobStatus, JobStore, StoreError};
use serde::{Deserialize, Serialize};

use crate::{Database, DbError};

const SELECT_FIELDS: &str = "meta::id(id) AS id, job_type, payload, status, created_at, \
     updated_at, retry_count, max_retries, last_error";

/// Repository for job persistence operations.
#[derive(Clone)]
pub struct JobRepository {
    db: Database,
}

/// Record content as written to SurrealDB.
#[derive(Debug, Serialize)]
struct JobContent {
    job_type: String,
    payload: String,
    status: String,
    created_at: String,
    updated_at: String,
    retry_count: i64,
    max_retries: i64,
    last_error: Option<String>,
}

impl From<&Job> for JobContent {
    fn from(job: &Job) -> Self {
        Self {
            job_type: job.job_type.clone(),
            payload: encode_payload(&job.payload),
            status: job.status.as_str().to_string(),
            created_at: format_timestamp(&job.created_at),
            updated_at: format_timestamp(&job.updated_at),
            retry_count: i64::from(job.retry_count),
            max_retries: i64::from(job.max_retries),
            last_error: job.last_error.clone(),
        }
    }
}

/// Internal record type for SurrealDB reads.
#[derive(Debug, Deserialize)]
struct JobRecord {
    id: String,
    job_type: String,
    payload: Option<String>,
    status: String,
    created_at: String,
    updated_at: String,
    retry_count: i64,
    max_retries: i64,
    last_error: Option<String>,
}

impl JobRecord {
    fn into_job(self) -> Result<Job, DbError> {
        let corrupt = |reason: String| DbError::Corrupt {
            id: self.id.clone(),
            reason,
        };

        let id = JobId::parse(&self.id).map_err(|e| corrupt(e.to_string()))?;
        let status = self
            .status
            .parse::<JobStatus>()
            .map_err(|e| corrupt(e.to_string()))?;
        let created_at = parse_timestamp(&self.created_at).map_err(&corrupt)?;
        let updated_at = parse_timestamp(&self.updated_at).map_err(&corrupt)?;
        let retry_count = u32::try_from(self.retry_count).map_err(|e| corrupt(e.to_string()))?;
        let max_retries = u32::try_from(self.max_retries).map_err(|e| corrupt(e.to_string()))?;

        Ok(Job {
            id,
            payload: decode_payload(&id, self.payload.as_deref()),
            job_type: self.job_type,
            status,
            created_at,
            updated_at,
            retry_count,
            max_retries,
            last_error: self.last_error,
        })
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp {s:?}: {e}"))
}

impl JobRepository {
    /// Wrap an open database connection.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// The underlying connection.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Create a new job record. Fails if the id already exists.
    pub async fn create(&self, job: &Job) -> Result<(), DbError> {
        self.db
            .query("CREATE type::thing('job', $id) CONTENT $content RETURN NONE")
            .bind(("id", job.id.to_string()))
            .bind(("content", JobContent::from(job)))
            .await?
            .check()?;
        Ok(())
    }

    /// Write the full record, creating it if it does not exist.
    pub async fn upsert(&self, job: &Job) -> Result<(), DbError> {
        self.db
            .query("UPSERT type::thing('job', $id) CONTENT $content RETURN NONE")
            .bind(("id", job.id.to_string()))
            .bind(("content", JobContent::from(job)))
            .await?
            .check()?;
        Ok(())
    }

    /// Get a job by ID.
    pub async fn find(&self, id: &JobId) -> Result<Option<Job>, DbError> {
        let mut response = self
            .db
            .query(format!(
                "SELECT {SELECT_FIELDS} FROM type::thing('job', $id)"
            ))
            .bind(("id", id.to_string()))
            .await?;

        let records: Vec<JobRecord> = response.take(0)?;

        records.into_iter().next().map(JobRecord::into_job).transpose()
    }

    /// List the newest jobs first.
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<Job>, DbError> {
        let mut response = self
            .db
            .query(format!(
                "SELECT {SELECT_FIELDS} FROM job ORDER BY created_at DESC LIMIT $limit"
            ))
            .bind(("limit", limit as i64))
            .await?;

        let records: Vec<JobRecord> = response.take(0)?;

        records.into_iter().map(JobRecord::into_job).collect()
    }
}

impl JobStore for JobRepository {
    async fn insert(&self, job: &Job) -> Result<(), StoreError> {
        Ok(self.create(job).await?)
    }

    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        Ok(self.upsert(job).await?)
    }

    async fn get(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.find(id).await?)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Job>, StoreError> {
        Ok(JobRepository::list_recent(self, limit).await?)
    }
}
