//! Message types for the worker supervisor.

use ractor::RpcReplyPort;

use crate::worker::WorkerStats;

/// Messages for the WorkerSupervisor.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Raise the shutdown flag; workers stop after their current job.
    Shutdown,

    /// Report which workers are still running.
    GetStatus { reply: RpcReplyPort<PoolStatus> },

    /// Sent by a worker task when its loop returns.
    WorkerExited(WorkerExit),
}

/// How one worker ended.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerExit {
    pub worker_id: String,
    pub stats: WorkerStats,
    /// Infrastructure error that stopped the worker, if any.
    pub error: Option<String>,
}

/// Snapshot of a running pool.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolStatus {
    pub live: Vec<String>,
    pub exited: Vec<String>,
    pub draining: bool,
}

/// Final report, sent once the last worker has exited.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolReport {
    pub workers: Vec<WorkerExit>,
}

impl PoolReport {
    /// Workers that stopped on an error.
    pub fn failures(&self) -> impl Iterator<Item = &WorkerExit> {
        self.workers.iter().filter(|w| w.error.is_some())
    }

    /// Counters summed over every worker.
    pub fn totals(&self) -> WorkerStats {
        let mut totals = WorkerStats::default();
        for worker in &self.workers {
            totals.merge(&worker.stats);
        }
        totals
    }
}
