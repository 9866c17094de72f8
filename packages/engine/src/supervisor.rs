//! Supervisor actor owning a pool of worker tasks.

use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::{oneshot, watch};

use crate::messages::{PoolReport, PoolStatus, SupervisorMessage, WorkerExit};
use crate::worker::WorkerTask;

/// State for the supervisor actor.
pub struct SupervisorState {
    /// Drain flag shared by every worker.
    shutdown: watch::Sender<bool>,
    /// Workers whose loop is still running.
    live: Vec<String>,
    /// Workers that have returned, in exit order.
    exited: Vec<WorkerExit>,
    /// Where the final report goes.
    report: Option<oneshot::Sender<PoolReport>>,
}

impl SupervisorState {
    fn draining(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn finish(&mut self, myself: &ActorRef<SupervisorMessage>) {
        tracing::info!(workers = self.exited.len(), "Worker pool stopped");
        if let Some(report) = self.report.take() {
            let _ = report.send(PoolReport {
                workers: std::mem::take(&mut self.exited),
            });
        }
        myself.stop(None);
    }
}

/// Arguments for the supervisor.
pub struct SupervisorArgs {
    pub tasks: Vec<WorkerTask>,
    pub report: oneshot::Sender<PoolReport>,
}

/// Supervisor actor: spawns one task per worker and drains them together.
///
/// A worker that stops on an infrastructure error drains the whole pool.
pub struct WorkerSupervisor;

impl Actor for WorkerSupervisor {
    type Msg = SupervisorMessage;
    type State = SupervisorState;
    type Arguments = SupervisorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(workers = args.tasks.len(), "Starting worker supervisor");

        let (shutdown, rx) = watch::channel(false);
        let mut live = Vec::with_capacity(args.tasks.len());

        for task in args.tasks {
            live.push(task.worker_id.clone());
            let run = task.run;
            let rx = rx.clone();
            let myself = myself.clone();
            tokio::spawn(async move {
                let exit = run(rx).await;
                if myself
                    .send_message(SupervisorMessage::WorkerExited(exit))
                    .is_err()
                {
                    tracing::warn!("Supervisor gone before worker exit was reported");
                }
            });
        }

        Ok(SupervisorState {
            shutdown,
            live,
            exited: Vec::new(),
            report: Some(args.report),
        })
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if state.live.is_empty() {
            state.finish(&myself);
        }
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::Shutdown => {
                tracing::info!("Draining worker pool");
                state.shutdown.send_replace(true);
            }

            SupervisorMessage::GetStatus { reply } => {
                let _ = reply.send(PoolStatus {
                    live: state.live.clone(),
                    exited: state.exited.iter().map(|w| w.worker_id.clone()).collect(),
                    draining: state.draining(),
                });
            }

            SupervisorMessage::WorkerExited(exit) => {
                // Ids need not be unique; one exit retires one entry.
                if let Some(pos) = state.live.iter().position(|id| id == &exit.worker_id) {
                    state.live.remove(pos);
                }

                match &exit.error {
                    Some(error) => {
                        tracing::error!(worker_id = %exit.worker_id, %error, "Worker failed, draining pool");
                        state.shutdown.send_replace(true);
                    }
                    None => {
                        tracing::info!(worker_id = %exit.worker_id, processed = exit.stats.processed, "Worker exited");
                    }
                }
                state.exited.push(exit);

                if state.live.is_empty() {
                    state.finish(&myself);
                }
            }
        }

        Ok(())
    }
}

/// Start a supervisor running the given workers.
///
/// Returns the actor, its join handle and a receiver for the final
/// [`PoolReport`].
pub async fn start_supervisor(
    tasks: Vec<WorkerTask>,
) -> Result<
    (
        ActorRef<SupervisorMessage>,
        tokio::task::JoinHandle<()>,
        oneshot::Receiver<PoolReport>,
    ),
    ractor::SpawnErr,
> {
    let (report_tx, report_rx) = oneshot::channel();
    let args = SupervisorArgs {
        tasks,
        report: report_tx,
    };

    let (actor, handle) = Actor::spawn(None, WorkerSupervisor, args).await?;

    Ok((actor, handle, report_rx))
}
