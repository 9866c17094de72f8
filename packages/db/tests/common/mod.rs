use jobbox_db::{DbConfig, DbError, JobRepository};

/// Fresh in-memory store per test; `mem://` handles never share data.
pub async fn setup_repo() -> Result<JobRepository, DbError> {
    jobbox_db::open(&DbConfig::memory()).await
}
