#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use jobbox_broker::MemoryBroker;
use jobbox_core::QueueLayout;
use jobbox_db::{DbConfig, JobRepository};
use jobbox_engine::{
    FnHandler, HandlerRegistry, JobQueries, Producer, Worker, WorkerConfig,
};

pub type TestWorker = Worker<JobRepository, MemoryBroker>;

/// A fresh store and broker shared by producers, workers and queries.
pub struct Harness {
    pub store: Arc<JobRepository>,
    pub broker: Arc<MemoryBroker>,
    pub layout: QueueLayout,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_layout(QueueLayout::default()).await
    }

    pub async fn with_layout(layout: QueueLayout) -> Self {
        let store = jobbox_db::open(&DbConfig::memory())
            .await
            .expect("in-memory store should open");
        Self {
            store: Arc::new(store),
            broker: Arc::new(MemoryBroker::new()),
            layout,
        }
    }

    pub fn producer(&self) -> Producer<JobRepository, MemoryBroker> {
        Producer::new(self.store.clone(), self.broker.clone(), self.layout.clone())
    }

    pub fn queries(&self) -> JobQueries<JobRepository, MemoryBroker> {
        JobQueries::new(self.store.clone(), self.broker.clone(), self.layout.clone())
    }

    pub fn worker(&self, worker_id: &str, handlers: HandlerRegistry) -> TestWorker {
        Worker::new(
            self.store.clone(),
            self.broker.clone(),
            Arc::new(handlers),
            WorkerConfig::default()
                .with_worker_id(worker_id)
                .with_poll_timeout(Duration::from_millis(50))
                .with_layout(self.layout.clone()),
        )
    }
}

/// Handlers counting their executions: `ok` succeeds, `fail` always fails.
pub fn counting_handlers(calls: Arc<AtomicUsize>) -> HandlerRegistry {
    let ok_calls = calls.clone();
    HandlerRegistry::new()
        .with(FnHandler::new("ok", move |_| {
            let calls = ok_calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }))
        .with(FnHandler::new("fail", move |_| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("always fails".to_string())
            }
        }))
}

/// Drive a worker until the queue stays empty for one poll.
pub async fn drain(worker: &mut TestWorker) {
    while worker.run_once().await.expect("worker step").is_some() {}
}
