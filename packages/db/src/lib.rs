//! SurrealDB integration for the job queue.
//!
//! This crate provides the durable record store: one `job` record per job,
//! never deleted, authoritative for history and single-job queries.
//!
//! # Features
//!
//! - `memory` (default): Use in-memory storage for testing
//! - `rocksdb`: Use RocksDB for persistent file-based storage

mod connection;
pub mod repositories;
mod schema;

pub use connection::{Database, DbConfig, DbError, connect};
pub use repositories::JobRepository;
pub use schema::init_schema;

/// Connect, initialize the schema and return a ready repository.
pub async fn open(config: &DbConfig) -> Result<JobRepository, DbError> {
    let db = connect(config).await?;
    init_schema(&db).await?;
    Ok(JobRepository::new(db))
}
