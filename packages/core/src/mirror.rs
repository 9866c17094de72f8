//! Dispatch mirror codec: a job flattened into broker hash fields.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::JobError;
use crate::job::{DEFAULT_MAX_RETRIES, Job, JobId, JobStatus};

pub const FIELD_ID: &str = "id";
pub const FIELD_TYPE: &str = "type";
pub const FIELD_PAYLOAD: &str = "payload";
pub const FIELD_STATUS: &str = "status";
pub const FIELD_CREATED_AT: &str = "createdAt";
pub const FIELD_UPDATED_AT: &str = "updatedAt";
pub const FIELD_RETRY_COUNT: &str = "retryCount";
pub const FIELD_MAX_RETRIES: &str = "maxRetries";
pub const FIELD_LAST_ERROR: &str = "lastError";

/// Decode a stored JSON payload, substituting `null` when it is corrupt.
pub fn decode_payload(id: &JobId, raw: Option<&str>) -> serde_json::Value {
    let Some(raw) = raw.filter(|s| !s.is_empty()) else {
        return serde_json::Value::Null;
    };
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(job_id = %id, "Undecodable payload, substituting null: {}", e);
            serde_json::Value::Null
        }
    }
}

/// Encode a payload as JSON text.
pub fn encode_payload(payload: &serde_json::Value) -> String {
    // Serializing a `Value` into a string cannot fail.
    serde_json::to_string(payload).unwrap_or_else(|_| "null".to_string())
}

impl Job {
    /// Flatten this job into mirror hash fields.
    pub fn to_mirror_fields(&self) -> Vec<(String, String)> {
        vec![
            (FIELD_ID.into(), self.id.to_string()),
            (FIELD_TYPE.into(), self.job_type.clone()),
            (FIELD_PAYLOAD.into(), encode_payload(&self.payload)),
            (FIELD_STATUS.into(), self.status.as_str().to_string()),
            (FIELD_CREATED_AT.into(), self.created_at.to_rfc3339()),
            (FIELD_UPDATED_AT.into(), self.updated_at.to_rfc3339()),
            (FIELD_RETRY_COUNT.into(), self.retry_count.to_string()),
            (FIELD_MAX_RETRIES.into(), self.max_retries.to_string()),
            (
                FIELD_LAST_ERROR.into(),
                self.last_error.clone().unwrap_or_default(),
            ),
        ]
    }

    /// Rebuild a job from mirror hash fields.
    ///
    /// Missing fields fall back to defaults so that mirrors written by a
    /// minimal producer (id, type, payload, status only) stay dispatchable:
    /// retry count 0, max retries 3, status queued, timestamps now. A status
    /// that is present but unknown is an error, never a fresh `queued`.
    pub fn from_mirror(id: JobId, fields: &HashMap<String, String>) -> Result<Self, JobError> {
        let now = Utc::now();
        let get = |key: &str| fields.get(key).map(String::as_str);

        let status = match get(FIELD_STATUS) {
            Some(raw) => raw.parse::<JobStatus>()?,
            None => JobStatus::default(),
        };

        Ok(Self {
            id,
            job_type: get(FIELD_TYPE).unwrap_or_default().to_string(),
            payload: decode_payload(&id, get(FIELD_PAYLOAD)),
            status,
            created_at: get(FIELD_CREATED_AT).and_then(parse_timestamp).unwrap_or(now),
            updated_at: get(FIELD_UPDATED_AT).and_then(parse_timestamp).unwrap_or(now),
            retry_count: get(FIELD_RETRY_COUNT)
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            max_retries: get(FIELD_MAX_RETRIES)
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_RETRIES),
            last_error: get(FIELD_LAST_ERROR)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
