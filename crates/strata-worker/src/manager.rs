//! Claim loop that spins up one worker per claimed task.

use crate::config::WorkerConfig;
use crate::worker::{Worker, WorkerContext, WorkerOutcome};
use std::sync::Arc;
use strata_core::{Error, Result};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Bounds concurrent workers with a semaphore and polls the queue for work.
pub struct WorkerManager {
    config: WorkerConfig,
    context: Arc<WorkerContext>,
    permits: Arc<Semaphore>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl WorkerManager {
    pub fn new(config: WorkerConfig, context: Arc<WorkerContext>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let permits = Arc::new(Semaphore::new(config.max_workers.max(1) as usize));
        Self {
            config,
            context,
            permits,
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Workers currently running.
    pub fn active(&self) -> usize {
        self.capacity() - self.permits.available_permits()
    }

    fn capacity(&self) -> usize {
        self.config.max_workers.max(1) as usize
    }

    /// Claim one task and start a worker for it, waiting for a free slot first.
    /// Returns `None` when the queue has nothing to claim.
    pub async fn process_next(&self) -> Result<Option<JoinHandle<WorkerOutcome>>> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| Error::Internal("worker semaphore closed".to_string()))?;
        self.claim_with(permit).await
    }

    async fn claim_with(
        &self,
        permit: OwnedSemaphorePermit,
    ) -> Result<Option<JoinHandle<WorkerOutcome>>> {
        let Some(task) = self.context.queue.claim().await? else {
            return Ok(None);
        };

        let worker = Worker::new(task, Arc::clone(&self.context));
        debug!(worker_id = %worker.id(), "Spawning worker");

        Ok(Some(tokio::spawn(async move {
            let _permit = permit;
            match worker.run().await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "Worker error");
                    WorkerOutcome::Failed(e.to_string())
                }
            }
        })))
    }

    /// Poll until shutdown is signalled.
    pub async fn run(&self) {
        let mut shutdown = self.shutdown_rx.clone();
        info!(
            max_workers = self.capacity(),
            poll_interval_ms = self.config.poll_interval_ms,
            "Worker manager started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let permit = tokio::select! {
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown.changed() => continue,
            };

            let idle = match self.claim_with(permit).await {
                Ok(Some(_)) => false,
                Ok(None) => true,
                Err(e) => {
                    error!(error = %e, "Failed to claim task");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval()) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }

        info!("Worker manager stopped");
    }

    /// Stop claiming and wait for running workers to finish.
    pub async fn shutdown(&self) {
        info!("Initiating worker shutdown");
        self.shutdown_tx.send_replace(true);

        info!(active = self.active(), "Waiting for in-progress tasks to complete");
        let _ = self.permits.acquire_many(self.capacity() as u32).await;
    }
}
