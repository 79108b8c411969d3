//! Mel-spectrogram audio fingerprint.

use tracing::debug;

use crate::cancel::CancelFlag;
use crate::config::{AudioFingerprintParams, SILENCE_FLOOR};
use crate::decode::PcmAudio;
use crate::dsp::{series_digest, MelFilterBank, Stft};

const POWER_OFFSET: f64 = 1e-9;
const AMIN: f64 = 1e-10;

/// Time-averaged log-mel descriptor, hashed into `audio_fingerprint`.
#[derive(Debug, Clone)]
pub struct AudioFingerprinter {
    params: AudioFingerprintParams,
    stft: Stft,
    mel: MelFilterBank,
}

impl AudioFingerprinter {
    pub fn new(params: AudioFingerprintParams) -> Self {
        let stft = Stft::new(params.n_fft, params.hop_length);
        let mel = MelFilterBank::new(params.sample_rate, params.n_fft, params.n_mels);
        Self { params, stft, mel }
    }

    pub fn params(&self) -> &AudioFingerprintParams {
        &self.params
    }

    /// Fingerprint digest, or `None` for clips shorter than the minimum
    /// duration or below the silence floor.
    pub fn fingerprint(&self, pcm: &PcmAudio) -> Option<String> {
        self.fingerprint_until(pcm, &CancelFlag::new())
    }

    /// `fingerprint` that gives up with `None` once `cancel` is set.
    pub fn fingerprint_until(&self, pcm: &PcmAudio, cancel: &CancelFlag) -> Option<String> {
        self.descriptor_until(pcm, cancel).map(|d| series_digest(&d))
    }

    /// Mean log-mel energy per band, `n_mels` long.
    pub fn descriptor(&self, pcm: &PcmAudio) -> Option<Vec<f64>> {
        self.descriptor_until(pcm, &CancelFlag::new())
    }

    fn descriptor_until(&self, pcm: &PcmAudio, cancel: &CancelFlag) -> Option<Vec<f64>> {
        if pcm.duration_secs() < self.params.min_duration_secs {
            debug!(
                "Audio fingerprint: clip {:.3}s shorter than {}s",
                pcm.duration_secs(),
                self.params.min_duration_secs
            );
            return None;
        }
        if pcm.peak() < SILENCE_FLOOR {
            debug!("Audio fingerprint: audio below silence floor");
            return None;
        }

        let mel_frames: Vec<Vec<f64>> = self
            .stft
            .power_until(&pcm.samples, cancel)?
            .iter()
            .map(|frame| {
                self.mel
                    .apply(frame)
                    .into_iter()
                    .map(|s| 10.0 * (s + POWER_OFFSET).max(AMIN).log10())
                    .collect()
            })
            .collect();

        if mel_frames.is_empty() {
            return None;
        }

        let max_db = mel_frames.iter().flatten().copied().fold(f64::MIN, f64::max);
        let floor = -self.params.top_db;

        let n_mels = self.mel.n_mels();
        let mut sums = vec![0.0; n_mels];
        for frame in &mel_frames {
            for (sum, db) in sums.iter_mut().zip(frame) {
                *sum += (db - max_db).max(floor);
            }
        }

        let count = mel_frames.len() as f64;
        Some(sums.into_iter().map(|s| s / count).collect())
    }
}

impl Default for AudioFingerprinter {
    fn default() -> Self {
        Self::new(AudioFingerprintParams::default())
    }
}
