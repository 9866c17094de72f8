//! HTTP routes for producing and inspecting jobs.

use std::convert::Infallible;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{Stream, StreamExt};
use jobbox_core::{Broker, JobStore};
use jobbox_engine::{EnqueueRequest, JobQueries, Producer, RECENT_LIMIT};
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::realtime::EventBridge;

/// Shared handles behind every route.
pub struct AppState<S, B> {
    pub producer: Producer<S, B>,
    pub queries: JobQueries<S, B>,
    pub bridge: EventBridge<B>,
}

impl<S, B> Clone for AppState<S, B> {
    fn clone(&self) -> Self {
        Self {
            producer: self.producer.clone(),
            queries: self.queries.clone(),
            bridge: self.bridge.clone(),
        }
    }
}

/// Build the router.
pub fn router<S: JobStore, B: Broker>(state: AppState<S, B>) -> Router {
    Router::new()
        .route("/api/jobs", post(create_job::<S, B>).get(list_jobs::<S, B>))
        .route("/api/jobs/dead", get(list_dead_jobs::<S, B>))
        .route("/api/jobs/{id}", get(get_job::<S, B>))
        .route("/api/stream/jobs", get(stream_jobs::<S, B>))
        .with_state(state)
}

/// POST /api/jobs
///
/// The body is parsed leniently: anything that is not a JSON object is
/// treated as `{}` and rejected for its missing type.
async fn create_job<S: JobStore, B: Broker>(
    State(state): State<AppState<S, B>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let request = EnqueueRequest::from_json(&body)?;
    let job = state.producer.enqueue(request).await?;

    Ok(Json(json!({ "id": job.id, "status": job.status })))
}

/// GET /api/jobs
async fn list_jobs<S: JobStore, B: Broker>(
    State(state): State<AppState<S, B>>,
) -> Result<Json<Value>, ApiError> {
    let jobs = state.queries.recent(RECENT_LIMIT).await?;
    Ok(Json(json!({ "jobs": jobs })))
}

/// GET /api/jobs/dead
async fn list_dead_jobs<S: JobStore, B: Broker>(
    State(state): State<AppState<S, B>>,
) -> Result<Json<Value>, ApiError> {
    let jobs = state.queries.dead_letters(RECENT_LIMIT).await?;
    Ok(Json(json!({ "jobs": jobs })))
}

/// GET /api/jobs/{id}
async fn get_job<S: JobStore, B: Broker>(
    State(state): State<AppState<S, B>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let job = state.queries.get(&id).await?;
    Ok(Json(json!(job)))
}

/// GET /api/stream/jobs
///
/// One frame per broadcast transition plus `ping` heartbeats, until the
/// client goes away or the bridge shuts down.
async fn stream_jobs<S: JobStore, B: Broker>(
    State(state): State<AppState<S, B>>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let frames = state.bridge.open().await?;
    Ok(Sse::new(
        frames.map(|frame| Ok::<_, Infallible>(frame.into_event())),
    ))
}
