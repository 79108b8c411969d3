//! Fingerprint pipeline: decode once, run all analyzers, assemble a result.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use proofprint_models::{Fingerprints, ForensicResult, ProofId};
use tracing::{debug, info, warn};

use crate::audio_fp::AudioFingerprinter;
use crate::cancel::CancelFlag;
use crate::config::PipelineConfig;
use crate::decode::{sample_frame_indices, MediaDecoder};
use crate::enf::EnfAnalyzer;
use crate::error::{MediaError, MediaResult};
use crate::phash::VideoPerceptualHasher;

/// Everything one analysis run produces.
#[derive(Debug, Clone)]
pub struct AnalysisOutput {
    pub result: ForensicResult,
    /// ENF spectrogram PNG, present when ENF produced a series and rendering succeeded
    pub spectrogram_png: Option<Vec<u8>>,
    /// Autocorrelation confidence of the ENF series (logged, not persisted)
    pub enf_confidence: Option<f64>,
}

/// Turns one local media file into a forensic result.
#[async_trait]
pub trait ProofAnalyzer: Send + Sync {
    async fn analyze(&self, proof_id: &ProofId, media: &Path) -> MediaResult<AnalysisOutput>;
}

/// Production analyzer: FFmpeg decode, then ENF, audio fingerprint and
/// video pHash concurrently on the blocking pool.
#[derive(Debug, Clone)]
pub struct FingerprintPipeline {
    config: PipelineConfig,
    decoder: MediaDecoder,
    enf: Arc<EnfAnalyzer>,
    audio: Arc<AudioFingerprinter>,
    video: Arc<VideoPerceptualHasher>,
}

impl FingerprintPipeline {
    pub fn new(config: PipelineConfig, decoder: MediaDecoder) -> Self {
        Self {
            enf: Arc::new(EnfAnalyzer::new(config.enf.clone())),
            audio: Arc::new(AudioFingerprinter::new(config.audio.clone())),
            video: Arc::new(VideoPerceptualHasher::new(config.video.clone())),
            config,
            decoder,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

#[async_trait]
impl ProofAnalyzer for FingerprintPipeline {
    async fn analyze(&self, proof_id: &ProofId, media: &Path) -> MediaResult<AnalysisOutput> {
        let info = self.decoder.probe(media).await?;
        let indices = sample_frame_indices(&info, &self.config.video);

        debug!(
            proof_id = %proof_id,
            has_audio = info.audio.is_some(),
            has_video = info.video.is_some(),
            frames = ?indices,
            "Probed media"
        );

        let enf_cfg = &self.config.enf;
        let audio_cfg = &self.config.audio;
        let (enf_pcm, fp_pcm, frames) = tokio::try_join!(
            self.decoder
                .decode_audio(media, &info, enf_cfg.sample_rate, enf_cfg.max_duration_secs),
            self.decoder
                .decode_audio(media, &info, audio_cfg.sample_rate, audio_cfg.max_duration_secs),
            self.decoder
                .decode_frames(media, &info, &indices, self.config.video.max_duration_secs),
        )?;

        // Dropping this future (job timeout) stops the blocking analyzers.
        let cancel = CancelFlag::new();
        let _stop_on_drop = cancel.cancel_on_drop();

        let enf = Arc::clone(&self.enf);
        let enf_cancel = cancel.clone();
        let enf_task = run_blocking(move || {
            let analysis = enf_pcm
                .as_ref()
                .and_then(|pcm| enf.analyze_until(pcm, &enf_cancel));
            let Some(analysis) = analysis else {
                return (None, None, None);
            };
            let png = match analysis.spectrogram.render_png() {
                Ok(png) => Some(png),
                Err(e) => {
                    warn!("Failed to render ENF spectrogram: {}", e);
                    None
                }
            };
            (Some(analysis.hash), Some(analysis.confidence), png)
        });

        let audio = Arc::clone(&self.audio);
        let audio_cancel = cancel.clone();
        let audio_task = run_blocking(move || {
            fp_pcm
                .as_ref()
                .and_then(|pcm| audio.fingerprint_until(pcm, &audio_cancel))
        });

        let video = Arc::clone(&self.video);
        let video_cancel = cancel.clone();
        let video_task = run_blocking(move || video.hash_until(&frames, &video_cancel));

        let (enf_out, audio_fingerprint, video_phash) =
            tokio::try_join!(enf_task, audio_task, video_task)?;
        let (enf_hash, enf_confidence, spectrogram_png) = enf_out;
        let video_phash = video_phash?;

        let fingerprints = Fingerprints {
            enf_hash,
            audio_fingerprint,
            video_phash,
        };

        info!(
            proof_id = %proof_id,
            enf = fingerprints.enf_hash.is_some(),
            audio = fingerprints.audio_fingerprint.is_some(),
            video = fingerprints.video_phash.is_some(),
            enf_confidence = ?enf_confidence,
            "Fingerprints computed"
        );

        Ok(AnalysisOutput {
            result: ForensicResult::new(proof_id.clone(), fingerprints),
            spectrogram_png,
            enf_confidence,
        })
    }
}

async fn run_blocking<T, F>(f: F) -> MediaResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MediaError::TaskFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    fn pipeline() -> FingerprintPipeline {
        FingerprintPipeline::new(PipelineConfig::default(), MediaDecoder::with_timeout(60))
    }

    fn ffmpeg(args: &[&str]) {
        let status = Command::new("ffmpeg")
            .args(["-y", "-v", "error"])
            .args(args)
            .status()
            .unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_missing_media_is_error() {
        let err = pipeline()
            .analyze(&ProofId::from("p"), Path::new("/nonexistent/clip.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_silent_black_video() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("black.mp4");
        ffmpeg(&[
            "-f", "lavfi", "-i", "color=c=black:s=128x96:r=25:d=5",
            "-f", "lavfi", "-i", "anullsrc=r=44100:cl=mono",
            "-t", "5", "-c:v", "libx264", "-pix_fmt", "yuv420p", "-c:a", "aac",
            path.to_str().unwrap(),
        ]);

        let output = pipeline().analyze(&ProofId::from("black"), &path).await.unwrap();
        assert_eq!(output.result.enf_hash, None);
        assert_eq!(output.result.audio_fingerprint, None);
        assert_eq!(output.result.video_phash.as_ref().map(String::len), Some(64));
        assert!(output.spectrogram_png.is_none());
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_hum_recording_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hum.mkv");
        ffmpeg(&[
            "-f", "lavfi", "-i", "testsrc=s=160x120:r=25:d=8",
            "-f", "lavfi", "-i", "sine=f=60:r=8000:d=8",
            "-c:v", "ffv1", "-c:a", "flac",
            path.to_str().unwrap(),
        ]);

        let pipeline = pipeline();
        let first = pipeline.analyze(&ProofId::from("a"), &path).await.unwrap();
        let second = pipeline.analyze(&ProofId::from("b"), &path).await.unwrap();

        assert!(first.result.enf_hash.is_some());
        assert!(first.result.audio_fingerprint.is_some());
        assert!(first.result.video_phash.is_some());
        assert!(first.spectrogram_png.is_some());
        assert_eq!(first.result.fingerprints(), second.result.fingerprints());
    }
}
