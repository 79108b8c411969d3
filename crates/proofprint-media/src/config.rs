//! Canonical fingerprint parameters.
//!
//! Every numeric parameter that influences a digest lives here. Digests are
//! only comparable between runs that used the same `PipelineConfig`, so the
//! defaults are the canonical parameter set and are not read from the
//! environment.

use serde::{Deserialize, Serialize};

/// Peak absolute sample value below which a track counts as silent.
pub const SILENCE_FLOOR: f32 = 1e-4;

/// ENF extraction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnfParams {
    /// Resample rate for ENF analysis (Hz).
    ///
    /// 1 kHz keeps the 50/60 Hz region well below Nyquist while making a
    /// 2048-point window about two seconds long.
    pub sample_rate: u32,
    /// Decode cap (seconds).
    pub max_duration_secs: f64,
    /// STFT window length W (samples, Hann).
    pub n_fft: usize,
    /// STFT hop length H (samples). 500 samples = 0.5 s at 1 kHz.
    pub hop_length: usize,
    /// Mains frequencies to choose between (Hz).
    pub mains_candidates: Vec<f64>,
    /// Half-width of the band searched around a mains candidate (Hz).
    pub band_half_width: f64,
    /// Fewer STFT frames than this yields no ENF result.
    pub min_frames: usize,
    /// Upper bound of the diagnostic spectrogram (Hz).
    pub spectrogram_max_freq: f64,
}

impl Default for EnfParams {
    fn default() -> Self {
        Self {
            sample_rate: 1000,
            max_duration_secs: 120.0,
            n_fft: 2048,
            hop_length: 500,
            mains_candidates: vec![50.0, 60.0],
            band_half_width: 1.0,
            min_frames: 4,
            spectrogram_max_freq: 80.0,
        }
    }
}

/// Mel-spectrogram audio fingerprint parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFingerprintParams {
    /// Resample rate (Hz).
    pub sample_rate: u32,
    /// Decode cap (seconds).
    pub max_duration_secs: f64,
    /// STFT window length (samples, Hann).
    pub n_fft: usize,
    /// STFT hop length (samples).
    pub hop_length: usize,
    /// Number of mel bands (descriptor length).
    pub n_mels: usize,
    /// Dynamic range kept below the loudest mel cell (dB).
    pub top_db: f64,
    /// Clips shorter than this yield no fingerprint (seconds).
    pub min_duration_secs: f64,
}

impl Default for AudioFingerprintParams {
    fn default() -> Self {
        Self {
            sample_rate: 11025,
            max_duration_secs: 60.0,
            n_fft: 2048,
            hop_length: 512,
            n_mels: 64,
            top_db: 80.0,
            min_duration_secs: 0.5,
        }
    }
}

/// Perceptual video hash parameters.
///
/// Frame policy: `frames_to_sample` indices evenly spaced across the clip,
/// `step = max(frame_count / (N + 1), 1)` and `index_i = step * (i + 1)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoHashParams {
    /// Number of frames sampled (N).
    pub frames_to_sample: usize,
    /// Frames past this point are never decoded (seconds).
    pub max_duration_secs: f64,
    /// Side of the square each frame is resized to before the DCT.
    pub resize: u32,
    /// Side of the low-frequency DCT block kept per frame.
    pub dct_block: usize,
}

impl Default for VideoHashParams {
    fn default() -> Self {
        Self {
            frames_to_sample: 5,
            max_duration_secs: 120.0,
            resize: 32,
            dct_block: 8,
        }
    }
}

/// The full parameter set for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub enf: EnfParams,
    pub audio: AudioFingerprintParams,
    pub video: VideoHashParams,
}
