//! Recovery sweep for jobs that were persisted but never queued.
//!
//! A `pending` record older than `stale_after` whose id is not sitting in the
//! queue is pushed again. A worker that popped the id but has not yet moved
//! the record out of `pending` looks the same from here, so the sweep can
//! enqueue such a job a second time; workers must tolerate duplicate ids.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::jobs::{JobStore, JobStoreError};
use crate::queue::JobQueue;

pub const DEFAULT_BATCH_LIMIT: usize = 100;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub requeued: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
    stale_after: chrono::Duration,
    batch_limit: usize,
}

impl Reconciler {
    pub fn new(store: Arc<dyn JobStore>, queue: Arc<dyn JobQueue>, stale_after: chrono::Duration) -> Self {
        Self {
            store,
            queue,
            stale_after,
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }

    pub fn with_batch_limit(mut self, batch_limit: usize) -> Self {
        self.batch_limit = batch_limit.max(1);
        self
    }

    /// Push every stale, unqueued `pending` job once.
    ///
    /// Queue failures are counted per job; a store failure aborts the sweep.
    #[instrument(skip(self), fields(queue = %self.queue.name()), err)]
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, JobStoreError> {
        let cutoff = now - self.stale_after;
        let stale = self.store.list_stale_pending(cutoff, self.batch_limit).await?;

        let mut report = SweepReport {
            scanned: stale.len(),
            ..SweepReport::default()
        };

        for job in stale {
            match self.queue.contains(job.id).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "queue lookup failed");
                    report.failed += 1;
                    continue;
                }
            }

            match self.queue.enqueue(job.id).await {
                Ok(_) => {
                    info!(job_id = %job.id, created_at = %job.created_at, "stale pending job requeued");
                    report.requeued += 1;
                }
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "requeue failed");
                    report.failed += 1;
                }
            }
        }

        if report.scanned > 0 {
            info!(
                scanned = report.scanned,
                requeued = report.requeued,
                failed = report.failed,
                "reconciliation sweep finished"
            );
        }
        Ok(report)
    }

    /// Run `sweep` every `interval` on a background task until shut down.
    pub fn spawn(self, interval: Duration) -> ReconcilerHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        // Errors are already logged by `sweep`.
                        let _ = self.sweep(Utc::now()).await;
                    }
                }
            }
        });

        ReconcilerHandle {
            shutdown: Some(shutdown_tx),
            join,
        }
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("queue", &self.queue.name())
            .field("stale_after", &self.stale_after)
            .field("batch_limit", &self.batch_limit)
            .finish_non_exhaustive()
    }
}

/// Handle to stop a spawned reconciler.
#[derive(Debug)]
pub struct ReconcilerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl ReconcilerHandle {
    /// Request shutdown and wait for the current sweep to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.join).await;
    }
}
