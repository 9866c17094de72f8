//! jobbox: job queue server.
//!
//! Runs a pool of workers and the HTTP surface in one process. Either side
//! can be switched off through the environment, so producers and workers
//! can also be deployed separately against a shared store and broker.

use std::sync::Arc;

use jobbox_api::{AppState, BridgeConfig, EventBridge, router};
use jobbox_broker::{AnyBroker, Broker};
use jobbox_core::QueueLayout;
use jobbox_engine::{
    JobQueries, PoolReport, Producer, SupervisorMessage, Worker, WorkerConfig, start_supervisor,
};
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

mod config;
mod handlers;

use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let store = Arc::new(jobbox_db::open(&config.db).await?);
    let broker = Arc::new(AnyBroker::connect(&config.broker_url).await?);
    let layout = QueueLayout::default().with_recent_cap(config.recent_cap);
    tracing::info!(broker = broker.kind(), workers = config.workers, "Starting jobbox");

    // Workers
    let handlers = Arc::new(handlers::registry());
    tracing::info!(job_types = ?handlers.job_types(), "Handlers registered");
    let tasks = (1..=config.workers)
        .map(|n| {
            let worker_config = WorkerConfig::default()
                .with_worker_id(format!("{}-{n}", config.worker_id))
                .with_poll_timeout(config.poll_timeout)
                .with_layout(layout.clone());
            Worker::new(store.clone(), broker.clone(), handlers.clone(), worker_config).into_task()
        })
        .collect();
    let (supervisor, supervisor_handle, mut pool_report) = start_supervisor(tasks).await?;

    // HTTP
    let (http_stop, http_stopped) = oneshot::channel::<()>();
    let bridge = EventBridge::new(
        broker.clone(),
        BridgeConfig::for_layout(&layout).with_heartbeat(config.heartbeat),
    );
    let server = match &config.http_addr {
        Some(addr) => {
            let state = AppState {
                producer: Producer::new(store.clone(), broker.clone(), layout.clone()),
                queries: JobQueries::new(store.clone(), broker.clone(), layout.clone()),
                bridge: bridge.clone(),
            };
            let listener = tokio::net::TcpListener::bind(addr).await?;
            tracing::info!("Listening on http://{}", listener.local_addr()?);

            Some(tokio::spawn(async move {
                axum::serve(listener, router(state))
                    .with_graceful_shutdown(async move {
                        let _ = http_stopped.await;
                    })
                    .await
            }))
        }
        None => None,
    };

    let report: Option<PoolReport> = tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
            None
        }
        finished = &mut pool_report, if config.workers > 0 => {
            tracing::warn!("Worker pool stopped on its own");
            Some(finished.unwrap_or_default())
        }
    };

    // Drain: workers finish their current job, then the HTTP side stops.
    let _ = supervisor.send_message(SupervisorMessage::Shutdown);
    let report = match report {
        Some(report) => report,
        None => pool_report.await.unwrap_or_default(),
    };
    let _ = supervisor_handle.await;

    // Open event streams would otherwise hold the graceful shutdown forever.
    bridge.shutdown();
    let _ = http_stop.send(());
    if let Some(server) = server {
        server.await??;
    }

    broker.close().await?;

    let totals = report.totals();
    tracing::info!(
        processed = totals.processed,
        completed = totals.completed,
        retried = totals.retried,
        dead_lettered = totals.dead_lettered,
        "jobbox stopped"
    );

    if let Some(failed) = report.failures().next() {
        anyhow::bail!(
            "worker {} failed: {}",
            failed.worker_id,
            failed.error.as_deref().unwrap_or_default()
        );
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
