//! Single-job processing.
//!
//! Drives one claimed entry from `processing` to a terminal status:
//! resolve media, run the analyzer, persist the artifact and result, then
//! release the local copy.

use std::sync::Arc;
use std::time::{Duration, Instant};

use proofprint_media::ProofAnalyzer;
use proofprint_models::{DiagnosticArtifact, ForensicResult, QueueStatus};
use proofprint_queue::{ClaimedEntry, ForensicQueue, QueueError};
use proofprint_storage::{ObjectStore, StorageError};
use tracing::Instrument;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::media_source::{MediaLocator, MediaResolver, ResolvedMedia};
use crate::metrics;
use crate::retry::{retry_async_when, RetryPolicy};

/// Terminal status a processed job reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Done,
    Failed,
    MissingFile,
}

impl JobOutcome {
    pub fn status(&self) -> QueueStatus {
        match self {
            JobOutcome::Done => QueueStatus::Done,
            JobOutcome::Failed => QueueStatus::Failed,
            JobOutcome::MissingFile => QueueStatus::MissingFile,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.status().as_str()
    }

    fn from_status(status: QueueStatus) -> Option<Self> {
        match status {
            QueueStatus::Done => Some(JobOutcome::Done),
            QueueStatus::Failed => Some(JobOutcome::Failed),
            QueueStatus::MissingFile => Some(JobOutcome::MissingFile),
            QueueStatus::Pending | QueueStatus::Processing => None,
        }
    }
}

/// Processes claimed queue entries.
pub struct JobProcessor {
    queue: ForensicQueue,
    store: Arc<dyn ObjectStore>,
    analyzer: Arc<dyn ProofAnalyzer>,
    resolver: MediaResolver,
    job_timeout: Duration,
    consume_local_source: bool,
    retry: RetryPolicy,
}

impl JobProcessor {
    pub fn new(
        config: &WorkerConfig,
        queue: ForensicQueue,
        store: Arc<dyn ObjectStore>,
        analyzer: Arc<dyn ProofAnalyzer>,
    ) -> Self {
        Self {
            resolver: MediaResolver::new(Arc::clone(&store), &config.work_dir, config.retry.clone()),
            queue,
            store,
            analyzer,
            job_timeout: config.job_timeout,
            consume_local_source: config.consume_local_source,
            retry: config.retry.clone(),
        }
    }

    /// Process one claimed entry.
    ///
    /// `Ok` means the entry reached the returned terminal status. `Err` means
    /// either a transient queue/storage failure (the entry is left
    /// `processing` for the reaper) or an invariant violation (the entry is
    /// marked `failed` when the lease still allows it).
    pub async fn process(&self, claim: &ClaimedEntry) -> WorkerResult<JobOutcome> {
        let logger = JobLogger::new(claim, "fingerprint");
        let span = logger.create_span();

        async {
            let started = Instant::now();
            logger.log_start(&claim.entry.media_locator);

            match self.run(claim, &logger).await {
                Ok(result) => {
                    metrics::record_job(QueueStatus::Done, started.elapsed().as_secs_f64());
                    logger.log_completion(&format!(
                        "{}/3 fingerprints in {:.1}s",
                        result.fingerprints().present_count(),
                        started.elapsed().as_secs_f64()
                    ));
                    Ok(JobOutcome::Done)
                }
                Err(e) => self.handle_failure(claim, &logger, e, started).await,
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, claim: &ClaimedEntry, logger: &JobLogger) -> WorkerResult<ForensicResult> {
        let media = self.resolver.resolve(&claim.entry).await?;
        match media.locator() {
            MediaLocator::Local(path) => {
                logger.log_progress(&format!("using local media {}", path.display()))
            }
            MediaLocator::Stored(key) => logger.log_progress(&format!(
                "downloaded {} to {}",
                key,
                media.path().display()
            )),
        }

        let output = tokio::time::timeout(
            self.job_timeout,
            self.analyzer.analyze(claim.proof_id(), media.path()),
        )
        .await
        .map_err(|_| WorkerError::Timeout(self.job_timeout))??;

        match output.enf_confidence {
            Some(confidence) => {
                logger.log_progress(&format!("ENF series confidence {:.3}", confidence))
            }
            None => logger.log_progress("no ENF series"),
        }

        if let Some(png) = output.spectrogram_png {
            let artifact =
                DiagnosticArtifact::enf_spectrogram(&claim.entry.user_id, claim.proof_id(), png);
            self.store_artifact(&artifact, logger).await?;
        }

        let result = output.result;
        retry_async_when(
            &self.retry.named("complete_job"),
            || self.queue.complete(claim, &result),
            |e: &QueueError| !e.is_invariant_violation(),
        )
        .await?;

        self.release_media(media, logger).await;
        Ok(result)
    }

    async fn store_artifact(
        &self,
        artifact: &DiagnosticArtifact,
        logger: &JobLogger,
    ) -> WorkerResult<()> {
        let upload = retry_async_when(
            &self.retry.named("artifact_upload"),
            || {
                self.store
                    .put_bytes(&artifact.key, artifact.bytes.clone(), artifact.content_type)
            },
            StorageError::is_transient,
        )
        .await;

        match upload {
            Ok(()) => {
                logger.log_progress(&format!("stored artifact {}", artifact.key));
                Ok(())
            }
            Err(StorageError::AlreadyExists(key)) => {
                logger.log_warning(&format!("artifact {} already exists, keeping it", key));
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Drop the temporary copy and, when configured, the caller-owned source.
    async fn release_media(&self, media: ResolvedMedia, logger: &JobLogger) {
        if self.consume_local_source && media.is_local() {
            if let Err(e) = tokio::fs::remove_file(media.path()).await {
                logger.log_warning(&format!(
                    "could not remove source {}: {}",
                    media.path().display(),
                    e
                ));
            }
        }
        drop(media);
    }

    async fn handle_failure(
        &self,
        claim: &ClaimedEntry,
        logger: &JobLogger,
        error: WorkerError,
        started: Instant,
    ) -> WorkerResult<JobOutcome> {
        let invariant = error.is_invariant_violation();
        if invariant {
            metrics::record_invariant_violation();
            logger.log_error(&format!("invariant violation: {}", error));
        }

        let Some(status) = error.terminal_status() else {
            logger.log_warning(&format!("transient failure, entry left processing: {}", error));
            return Err(error);
        };

        let message = error.to_string();
        let finished = retry_async_when(
            &self.retry.named("finish_job"),
            || self.queue.finish(claim, status, Some(message.as_str())),
            |e: &QueueError| !e.is_invariant_violation(),
        )
        .await;

        match finished {
            Ok(()) => {}
            Err(QueueError::LeaseLost(_)) => {
                logger.log_warning(&format!("lease lost, could not record {}", status));
            }
            Err(e) => {
                logger.log_error(&format!("could not record {}: {}", status, e));
                return Err(e.into());
            }
        }

        metrics::record_job(status, started.elapsed().as_secs_f64());
        if invariant {
            return Err(error);
        }

        if status == QueueStatus::MissingFile {
            logger.log_warning(&message);
        } else {
            logger.log_error(&message);
        }

        JobOutcome::from_status(status)
            .ok_or_else(|| WorkerError::invariant_violation(format!("non-terminal status {}", status)))
    }
}
