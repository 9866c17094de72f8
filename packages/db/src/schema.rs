//! Database schema definitions using SurrealQL.

use crate::{Database, DbError};

/// Initialize the database schema.
///
/// Every statement is `IF NOT EXISTS`, so this is safe to run on each start.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    tracing::info!("Initializing database schema...");

    db.query(JOB_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Job table schema.
///
/// Timestamps are fixed-width RFC 3339 strings so that lexical order is
/// chronological order. The payload is stored as JSON text.
const JOB_SCHEMA: &str = r#"
-- Durable job records, keyed by job:<ulid>, never deleted
DEFINE TABLE IF NOT EXISTS job SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS job_type ON job TYPE string;
DEFINE FIELD IF NOT EXISTS payload ON job TYPE string DEFAULT "null";
DEFINE FIELD IF NOT EXISTS status ON job TYPE string DEFAULT "queued";
DEFINE FIELD IF NOT EXISTS created_at ON job TYPE string;
DEFINE FIELD IF NOT EXISTS updated_at ON job TYPE string;
DEFINE FIELD IF NOT EXISTS retry_count ON job TYPE int DEFAULT 0;
DEFINE FIELD IF NOT EXISTS max_retries ON job TYPE int DEFAULT 3;
DEFINE FIELD IF NOT EXISTS last_error ON job TYPE option<string>;

-- Indexes for listing and inspection
DEFINE INDEX IF NOT EXISTS job_created ON job FIELDS created_at;
DEFINE INDEX IF NOT EXISTS job_status ON job FIELDS status;
DEFINE INDEX IF NOT EXISTS job_type ON job FIELDS job_type;
"#;
