//! Job executor.

use std::sync::Arc;
use std::time::Instant;

use proofprint_media::ProofAnalyzer;
use proofprint_queue::ForensicQueue;
use proofprint_storage::ObjectStore;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::metrics;
use crate::processor::{JobOutcome, JobProcessor};
use crate::retry::{retry_async, FailureTracker};

/// What one loop iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Nothing was pending
    Idle,
    /// A job was claimed and reached a terminal status
    Processed(JobOutcome),
    /// Claiming or processing failed; the loop carries on
    Error,
}

/// Sequential worker loop: claim one entry, process it to a terminal
/// status, sleep, repeat.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: ForensicQueue,
    processor: JobProcessor,
    failures: Mutex<FailureTracker>,
    shutdown: watch::Sender<bool>,
}

impl JobExecutor {
    pub fn new(
        config: WorkerConfig,
        queue: ForensicQueue,
        store: Arc<dyn ObjectStore>,
        analyzer: Arc<dyn ProofAnalyzer>,
    ) -> Self {
        let processor = JobProcessor::new(&config, queue.clone(), store, analyzer);
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            queue,
            processor,
            failures: Mutex::new(FailureTracker::new(5)),
            shutdown,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    /// Run until `shutdown()` is called.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}', polling every {:?}",
            self.config.worker_id, self.config.poll_interval
        );

        self.queue.init().await?;
        tokio::fs::create_dir_all(&self.config.work_dir).await?;

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut last_reap: Option<Instant> = None;

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            if last_reap.map_or(true, |at| at.elapsed() >= self.config.reap_interval) {
                self.reap().await;
                last_reap = Some(Instant::now());
            }

            let outcome = self.run_once().await;
            debug!("Iteration outcome: {:?}", outcome);

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!("Shutdown signal received, executor '{}' stopped", self.config.worker_id);
        Ok(())
    }

    /// Claim at most one pending entry and process it to completion.
    pub async fn run_once(&self) -> IterationOutcome {
        let policy = self.config.retry.named("claim_job");
        let claimed = retry_async(&policy, || {
            self.queue.claim_one_pending(&self.config.worker_id)
        })
        .await;

        let claim = match claimed {
            Ok(Some(claim)) => claim,
            Ok(None) => {
                self.failures.lock().await.record_success();
                return IterationOutcome::Idle;
            }
            Err(e) => {
                self.record_loop_error(&format!("Failed to claim a job: {}", e)).await;
                return IterationOutcome::Error;
            }
        };

        info!(
            "Claimed entry {} for proof {}",
            claim.id(),
            claim.proof_id()
        );

        match self.processor.process(&claim).await {
            Ok(outcome) => {
                self.failures.lock().await.record_success();
                IterationOutcome::Processed(outcome)
            }
            Err(e) => {
                self.record_loop_error(&format!("Entry {} not completed: {}", claim.id(), e))
                    .await;
                IterationOutcome::Error
            }
        }
    }

    /// Signal shutdown. The current job, if any, runs to completion first.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    async fn reap(&self) {
        let older_than = match chrono::Duration::from_std(self.config.lease_timeout) {
            Ok(d) => d,
            Err(e) => {
                warn!("Lease timeout {:?} out of range: {}", self.config.lease_timeout, e);
                return;
            }
        };

        match self.queue.reap_expired_leases(older_than).await {
            Ok(0) => {}
            Ok(n) => warn!("Reaped {} entries with expired leases", n),
            Err(e) => self.record_loop_error(&format!("Lease reaper failed: {}", e)).await,
        }
    }

    async fn record_loop_error(&self, message: &str) {
        metrics::record_loop_error();
        if self.failures.lock().await.record_failure() {
            error!("{}", message);
        }
    }
}
