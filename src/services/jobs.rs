// SPDX-License-Identifier: MIT

//! Background sync jobs.
//!
//! The webhook handler only enqueues; a single worker task drains the
//! queue and runs the actual provider syncs. Worker failures are logged
//! and never reach the webhook response.

use crate::services::sync::SyncEngine;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Queue depth before enqueues start being dropped.
const QUEUE_CAPACITY: usize = 256;

/// One unit of background sync work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncJob {
    Workouts { user_id: i64, days_back: i64 },
    Recovery { user_id: i64, days_back: i64 },
}

/// Producer handle held in application state.
#[derive(Clone)]
pub struct SyncQueue {
    tx: mpsc::Sender<SyncJob>,
}

impl SyncQueue {
    /// Create the queue, returning the receiver for the worker.
    pub fn new() -> (Self, mpsc::Receiver<SyncJob>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        (Self { tx }, rx)
    }

    /// Enqueue a job without waiting. Returns false (and logs) when the
    /// queue is full or the worker is gone; webhook intake never fails
    /// because of this.
    pub fn enqueue(&self, job: SyncJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Failed to enqueue sync job");
                false
            }
        }
    }
}

/// Spawn the worker that drains the queue.
pub fn spawn_sync_worker(mut rx: mpsc::Receiver<SyncJob>, sync: SyncEngine) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            match job {
                SyncJob::Workouts { user_id, days_back } => {
                    if let Err(e) = sync.sync_workouts(user_id, days_back).await {
                        tracing::error!(error = %e, user_id, "Background workout sync failed");
                    }
                }
                SyncJob::Recovery { user_id, days_back } => {
                    if let Err(e) = sync.sync_recovery(user_id, days_back).await {
                        tracing::error!(error = %e, user_id, "Background recovery sync failed");
                    }
                }
            }
        }
        tracing::info!("Sync worker shutting down");
    })
}
