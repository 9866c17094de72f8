#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use jobbox_api::{AppState, BridgeConfig, EventBridge, router};
use jobbox_broker::MemoryBroker;
use jobbox_core::QueueLayout;
use jobbox_db::{DbConfig, JobRepository};
use jobbox_engine::{JobQueries, Producer};
use serde_json::Value;
use tower::ServiceExt;

pub struct TestApp {
    pub store: Arc<JobRepository>,
    pub broker: Arc<MemoryBroker>,
    pub layout: QueueLayout,
    pub state: AppState<JobRepository, MemoryBroker>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_heartbeat(Duration::from_secs(15)).await
    }

    pub async fn with_heartbeat(heartbeat: Duration) -> Self {
        let store = Arc::new(
            jobbox_db::open(&DbConfig::memory())
                .await
                .expect("in-memory store should open"),
        );
        let broker = Arc::new(MemoryBroker::new());
        let layout = QueueLayout::default();

        let state = AppState {
            producer: Producer::new(store.clone(), broker.clone(), layout.clone()),
            queries: JobQueries::new(store.clone(), broker.clone(), layout.clone()),
            bridge: EventBridge::new(
                broker.clone(),
                BridgeConfig::for_layout(&layout).with_heartbeat(heartbeat),
            ),
        };

        Self {
            store,
            broker,
            layout,
            state,
        }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Send one request and decode the JSON response.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router().oneshot(request).await.expect("router call");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_json(&self, uri: &str, body: &str) -> (StatusCode, Value) {
        self.send(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }
}
