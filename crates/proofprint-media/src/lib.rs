//! FFmpeg-backed media decoding and forensic fingerprinting.
//!
//! This crate provides:
//! - FFprobe stream inspection and FFmpeg PCM/frame extraction
//! - ENF (mains hum) series extraction, hashing and spectrogram rendering
//! - Mel-spectrogram audio fingerprints
//! - Multi-frame perceptual video hashes
//! - The `FingerprintPipeline` that runs all three over one clip

pub mod audio_fp;
pub mod cancel;
pub mod command;
pub mod config;
pub mod decode;
pub mod dsp;
pub mod enf;
pub mod error;
pub mod phash;
pub mod pipeline;
pub mod probe;
pub mod spectrogram;

pub use audio_fp::AudioFingerprinter;
pub use cancel::{CancelFlag, CancelOnDrop};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use config::{AudioFingerprintParams, EnfParams, PipelineConfig, VideoHashParams};
pub use decode::{GrayFrame, MediaDecoder, PcmAudio};
pub use enf::{EnfAnalysis, EnfAnalyzer};
pub use error::{MediaError, MediaResult};
pub use phash::VideoPerceptualHasher;
pub use pipeline::{AnalysisOutput, FingerprintPipeline, ProofAnalyzer};
pub use probe::{probe_media, AudioStreamInfo, MediaInfo, VideoStreamInfo};
