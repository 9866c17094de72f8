//! HTTP surface for the job queue.
//!
//! - `POST /api/jobs` - enqueue
//! - `GET /api/jobs`, `GET /api/jobs/{id}`, `GET /api/jobs/dead` - inspection
//! - `GET /api/stream/jobs` - live transitions over Server-Sent Events

mod error;
pub mod realtime;
mod routes;

pub use error::ApiError;
pub use realtime::{BridgeConfig, EventBridge, StreamFrame, ViewerStream};
pub use routes::{AppState, router};
