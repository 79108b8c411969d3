//! End-to-end worker iterations against a scratch SQLite queue and a local
//! object store.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use proofprint_media::{AnalysisOutput, MediaError, MediaResult, ProofAnalyzer};
use proofprint_models::{
    artifact_key, Fingerprints, ForensicResult, ProofId, ProofRecord, QueueStatus,
};
use proofprint_queue::{ForensicQueue, QueueConfig};
use proofprint_storage::{LocalObjectStore, ObjectStore};
use proofprint_worker::{IterationOutcome, JobExecutor, JobOutcome, RetryPolicy, WorkerConfig};
use tempfile::TempDir;

const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake";

#[derive(Clone, Copy)]
enum Behavior {
    Succeed { spectrogram: bool },
    Fail,
    Hang,
}

struct FakeAnalyzer {
    calls: AtomicUsize,
    behavior: Behavior,
}

impl FakeAnalyzer {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            behavior,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProofAnalyzer for FakeAnalyzer {
    async fn analyze(&self, proof_id: &ProofId, media: &Path) -> MediaResult<AnalysisOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(media.is_file(), "analyzer got {}", media.display());

        match self.behavior {
            Behavior::Succeed { spectrogram } => Ok(AnalysisOutput {
                result: ForensicResult::new(
                    proof_id.clone(),
                    Fingerprints {
                        enf_hash: spectrogram.then(|| "e".repeat(64)),
                        audio_fingerprint: Some("a".repeat(64)),
                        video_phash: Some("v".repeat(64)),
                    },
                ),
                spectrogram_png: spectrogram.then(|| PNG_BYTES.to_vec()),
                enf_confidence: spectrogram.then_some(0.82),
            }),
            Behavior::Fail => Err(MediaError::invalid_media("corrupt moov atom")),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(MediaError::internal("unreachable"))
            }
        }
    }
}

struct Harness {
    dir: TempDir,
    queue: ForensicQueue,
    store: Arc<LocalObjectStore>,
    config: WorkerConfig,
}

impl Harness {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("queue.db").display());
        let queue = ForensicQueue::connect(&QueueConfig::default().with_url(url))
            .await
            .unwrap();
        queue.init().await.unwrap();

        let store = Arc::new(LocalObjectStore::new(dir.path().join("store")));
        let config = WorkerConfig {
            worker_id: "worker-test".to_string(),
            poll_interval: Duration::from_millis(10),
            work_dir: dir.path().join("work"),
            job_timeout: Duration::from_secs(5),
            retry: RetryPolicy::new("test").with_base_delay(Duration::from_millis(1)),
            ..WorkerConfig::default()
        };

        Self {
            dir,
            queue,
            store,
            config,
        }
    }

    fn executor(&self, analyzer: Arc<FakeAnalyzer>) -> JobExecutor {
        JobExecutor::new(
            self.config.clone(),
            self.queue.clone(),
            self.store.clone(),
            analyzer,
        )
    }

    fn write_clip(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, b"clip bytes").unwrap();
        path
    }

    async fn submit(&self, locator: &str) -> (ProofRecord, i64) {
        let proof = ProofRecord::new("user-1", "clip.mp4", "deadbeef", "sig");
        let entry = self.queue.enqueue(&proof, locator).await.unwrap();
        (proof, entry.id)
    }

    fn work_dir_entries(&self) -> usize {
        std::fs::read_dir(&self.config.work_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

#[tokio::test]
async fn test_idle_when_queue_is_empty() {
    let harness = Harness::new().await;
    let analyzer = FakeAnalyzer::new(Behavior::Fail);
    let executor = harness.executor(analyzer.clone());

    assert_eq!(executor.run_once().await, IterationOutcome::Idle);
    assert_eq!(analyzer.calls(), 0);
}

#[tokio::test]
async fn test_successful_job_persists_result_and_artifact() {
    let harness = Harness::new().await;
    let clip = harness.write_clip("clip.mp4");
    let (proof, entry_id) = harness.submit(clip.to_str().unwrap()).await;

    let analyzer = FakeAnalyzer::new(Behavior::Succeed { spectrogram: true });
    let executor = harness.executor(analyzer.clone());

    assert_eq!(
        executor.run_once().await,
        IterationOutcome::Processed(JobOutcome::Done)
    );
    assert_eq!(analyzer.calls(), 1);

    let entry = harness.queue.entry(entry_id).await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::Done);
    assert_eq!(entry.last_error, None);

    let result = harness.queue.result(&proof.id).await.unwrap().unwrap();
    assert_eq!(result.enf_hash, Some("e".repeat(64)));
    assert_eq!(result.chain_hash, None);

    let key = artifact_key("user-1", &proof.id);
    assert!(harness.store.exists(&key).await.unwrap());
    let stored = std::fs::read(harness.dir.path().join("store").join(&key)).unwrap();
    assert_eq!(stored, PNG_BYTES);

    // Caller-owned media is left alone by default.
    assert!(clip.exists());
    assert_eq!(executor.run_once().await, IterationOutcome::Idle);
}

#[tokio::test]
async fn test_null_fingerprints_are_a_valid_done() {
    let harness = Harness::new().await;
    let clip = harness.write_clip("silent.mp4");
    let (proof, _) = harness.submit(clip.to_str().unwrap()).await;

    let executor = harness.executor(FakeAnalyzer::new(Behavior::Succeed { spectrogram: false }));

    assert_eq!(
        executor.run_once().await,
        IterationOutcome::Processed(JobOutcome::Done)
    );
    let result = harness.queue.result(&proof.id).await.unwrap().unwrap();
    assert_eq!(result.enf_hash, None);
    assert!(!harness
        .store
        .exists(&artifact_key("user-1", &proof.id))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_analyzer_error_marks_job_failed() {
    let harness = Harness::new().await;
    let clip = harness.write_clip("broken.mp4");
    let (proof, entry_id) = harness.submit(clip.to_str().unwrap()).await;

    let executor = harness.executor(FakeAnalyzer::new(Behavior::Fail));

    assert_eq!(
        executor.run_once().await,
        IterationOutcome::Processed(JobOutcome::Failed)
    );

    let entry = harness.queue.entry(entry_id).await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::Failed);
    assert!(entry.last_error.unwrap().contains("corrupt moov atom"));
    assert!(harness.queue.result(&proof.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_missing_media_skips_the_pipeline() {
    let harness = Harness::new().await;
    let gone = harness.dir.path().join("never-uploaded.mp4");
    let (_, entry_id) = harness.submit(gone.to_str().unwrap()).await;

    let analyzer = FakeAnalyzer::new(Behavior::Succeed { spectrogram: true });
    let executor = harness.executor(analyzer.clone());

    assert_eq!(
        executor.run_once().await,
        IterationOutcome::Processed(JobOutcome::MissingFile)
    );
    assert_eq!(analyzer.calls(), 0);

    let entry = harness.queue.entry(entry_id).await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::MissingFile);
    assert!(entry.last_error.is_some());
}

#[tokio::test]
async fn test_missing_store_key_is_missing_file() {
    let harness = Harness::new().await;
    let (_, entry_id) = harness.submit("user-1/absent.mp4").await;

    let analyzer = FakeAnalyzer::new(Behavior::Succeed { spectrogram: true });
    let executor = harness.executor(analyzer.clone());

    assert_eq!(
        executor.run_once().await,
        IterationOutcome::Processed(JobOutcome::MissingFile)
    );
    assert_eq!(analyzer.calls(), 0);
    assert_eq!(harness.work_dir_entries(), 0);

    let entry = harness.queue.entry(entry_id).await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::MissingFile);
}

#[tokio::test]
async fn test_work_dir_is_empty_after_every_outcome() {
    let harness = Harness::new().await;
    harness
        .store
        .put_bytes("user-1/a.mp4", b"first".to_vec(), "video/mp4")
        .await
        .unwrap();
    harness
        .store
        .put_bytes("user-1/b.mp4", b"second".to_vec(), "video/mp4")
        .await
        .unwrap();

    harness.submit("user-1/a.mp4").await;
    let done = harness.executor(FakeAnalyzer::new(Behavior::Succeed { spectrogram: true }));
    assert_eq!(
        done.run_once().await,
        IterationOutcome::Processed(JobOutcome::Done)
    );
    assert_eq!(harness.work_dir_entries(), 0);

    harness.submit("store://user-1/b.mp4").await;
    let failing = harness.executor(FakeAnalyzer::new(Behavior::Fail));
    assert_eq!(
        failing.run_once().await,
        IterationOutcome::Processed(JobOutcome::Failed)
    );
    assert_eq!(harness.work_dir_entries(), 0);

    // Stored sources are the store's, never removed by the worker.
    assert!(harness.store.exists("user-1/a.mp4").await.unwrap());
}

#[tokio::test]
async fn test_job_timeout_marks_job_failed() {
    let mut harness = Harness::new().await;
    harness.config.job_timeout = Duration::from_millis(50);
    let clip = harness.write_clip("slow.mp4");
    let (_, entry_id) = harness.submit(clip.to_str().unwrap()).await;

    let executor = harness.executor(FakeAnalyzer::new(Behavior::Hang));

    assert_eq!(
        executor.run_once().await,
        IterationOutcome::Processed(JobOutcome::Failed)
    );
    let entry = harness.queue.entry(entry_id).await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::Failed);
    assert!(entry.last_error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_existing_result_is_an_invariant_violation() {
    let harness = Harness::new().await;
    let clip = harness.write_clip("dup.mp4");
    let (proof, entry_id) = harness.submit(clip.to_str().unwrap()).await;

    let earlier = ForensicResult::new(
        proof.id.clone(),
        Fingerprints {
            enf_hash: None,
            audio_fingerprint: Some("0".repeat(64)),
            video_phash: None,
        },
    );
    harness.queue.insert_result(&earlier).await.unwrap();

    let executor = harness.executor(FakeAnalyzer::new(Behavior::Succeed { spectrogram: false }));

    assert_eq!(executor.run_once().await, IterationOutcome::Error);

    let entry = harness.queue.entry(entry_id).await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::Failed);

    // The earlier result is untouched.
    let stored = harness.queue.result(&proof.id).await.unwrap().unwrap();
    assert_eq!(stored.audio_fingerprint, Some("0".repeat(64)));
    assert_eq!(stored.video_phash, None);
}

#[tokio::test]
async fn test_consume_local_source_after_done() {
    let mut harness = Harness::new().await;
    harness.config.consume_local_source = true;
    let clip = harness.write_clip("consumed.mp4");
    harness.submit(clip.to_str().unwrap()).await;

    let executor = harness.executor(FakeAnalyzer::new(Behavior::Succeed { spectrogram: false }));

    assert_eq!(
        executor.run_once().await,
        IterationOutcome::Processed(JobOutcome::Done)
    );
    assert!(!clip.exists());
}

#[tokio::test]
async fn test_failed_job_keeps_local_source_even_when_consuming() {
    let mut harness = Harness::new().await;
    harness.config.consume_local_source = true;
    let clip = harness.write_clip("kept.mp4");
    harness.submit(clip.to_str().unwrap()).await;

    let executor = harness.executor(FakeAnalyzer::new(Behavior::Fail));

    assert_eq!(
        executor.run_once().await,
        IterationOutcome::Processed(JobOutcome::Failed)
    );
    assert!(clip.exists());
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let harness = Harness::new().await;
    let clip = harness.write_clip("loop.mp4");
    let (_, entry_id) = harness.submit(clip.to_str().unwrap()).await;

    let executor = Arc::new(harness.executor(FakeAnalyzer::new(Behavior::Succeed {
        spectrogram: false,
    })));

    let runner = Arc::clone(&executor);
    let handle = tokio::spawn(async move { runner.run().await });

    for _ in 0..200 {
        let entry = harness.queue.entry(entry_id).await.unwrap().unwrap();
        if entry.status == QueueStatus::Done {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    executor.shutdown();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("executor did not stop")
        .unwrap()
        .unwrap();

    let entry = harness.queue.entry(entry_id).await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::Done);
}

#[tokio::test]
#[ignore = "requires ffmpeg"]
async fn test_silent_black_clip_through_real_pipeline() {
    use proofprint_media::{FingerprintPipeline, MediaDecoder, PipelineConfig};

    let harness = Harness::new().await;
    let clip = harness.dir.path().join("black.mp4");
    let status = std::process::Command::new("ffmpeg")
        .args(["-y", "-loglevel", "error", "-f", "lavfi", "-i"])
        .arg("color=c=black:s=64x64:r=25:d=5")
        .args(["-f", "lavfi", "-i"])
        .arg("anullsrc=r=44100:cl=mono")
        .args(["-t", "5", "-c:v", "libx264", "-pix_fmt", "yuv420p", "-c:a", "aac"])
        .arg(&clip)
        .status()
        .unwrap();
    assert!(status.success());

    let (proof, entry_id) = harness.submit(clip.to_str().unwrap()).await;
    let pipeline = FingerprintPipeline::new(PipelineConfig::default(), MediaDecoder::with_timeout(60));
    let executor = JobExecutor::new(
        harness.config.clone(),
        harness.queue.clone(),
        harness.store.clone(),
        Arc::new(pipeline),
    );

    assert_eq!(
        executor.run_once().await,
        IterationOutcome::Processed(JobOutcome::Done)
    );

    let entry = harness.queue.entry(entry_id).await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::Done);

    let result = harness.queue.result(&proof.id).await.unwrap().unwrap();
    assert_eq!(result.enf_hash, None);
    assert_eq!(result.audio_fingerprint, None);
    assert_eq!(result.video_phash.map(|h| h.len()), Some(64));
    assert!(!harness
        .store
        .exists(&artifact_key("user-1", &proof.id))
        .await
        .unwrap());
}
