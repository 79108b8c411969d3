//! Electrical network frequency (mains hum) extraction.
//!
//! Recordings made near mains-powered equipment pick up a faint hum at the
//! grid frequency, which drifts slightly over time. The per-frame peak
//! frequency around the nominal mains value forms a time series that is
//! hashed into `enf_hash`.

use tracing::debug;

use crate::cancel::CancelFlag;
use crate::config::{EnfParams, SILENCE_FLOOR};
use crate::decode::PcmAudio;
use crate::dsp::{series_digest, Stft};
use crate::spectrogram::EnfSpectrogram;

/// Result of a successful ENF extraction.
#[derive(Debug, Clone)]
pub struct EnfAnalysis {
    /// Digest of the z-normalized series
    pub hash: String,
    /// Peak normalized autocorrelation of the series, 0..=1
    pub confidence: f64,
    /// Mains candidate selected for this clip
    pub mains_hz: f64,
    /// Per-frame peak frequency (Hz)
    pub series: Vec<f64>,
    /// Low-frequency magnitude spectrogram for the diagnostic image
    pub spectrogram: EnfSpectrogram,
}

/// Extracts the ENF series from mono PCM.
#[derive(Debug, Clone)]
pub struct EnfAnalyzer {
    params: EnfParams,
    stft: Stft,
}

impl EnfAnalyzer {
    pub fn new(params: EnfParams) -> Self {
        let stft = Stft::new(params.n_fft, params.hop_length);
        Self { params, stft }
    }

    pub fn params(&self) -> &EnfParams {
        &self.params
    }

    /// Returns `None` for silence, clips too short for `min_frames`, or
    /// no energy anywhere in the mains bands.
    pub fn analyze(&self, pcm: &PcmAudio) -> Option<EnfAnalysis> {
        self.analyze_until(pcm, &CancelFlag::new())
    }

    /// `analyze` that also gives up with `None` once `cancel` is set.
    pub fn analyze_until(&self, pcm: &PcmAudio, cancel: &CancelFlag) -> Option<EnfAnalysis> {
        if pcm.peak() < SILENCE_FLOOR {
            debug!("ENF: audio below silence floor");
            return None;
        }

        let Some(frames) = self.stft.magnitudes_until(&pcm.samples, cancel) else {
            debug!("ENF: cancelled");
            return None;
        };
        if frames.len() < self.params.min_frames {
            debug!(
                "ENF: {} frames, need at least {}",
                frames.len(),
                self.params.min_frames
            );
            return None;
        }

        let (mains_hz, band) = self.select_mains(&frames, pcm.sample_rate)?;

        let series: Vec<f64> = frames
            .iter()
            .map(|frame| {
                let bin = argmax(band.iter().map(|&b| frame[b])).map_or(band[0], |i| band[i]);
                self.stft.bin_frequency(bin, pcm.sample_rate)
            })
            .collect();

        let confidence = autocorrelation_confidence(&series);
        let hash = series_digest(&series);
        let spectrogram = EnfSpectrogram::from_magnitudes(
            &frames,
            self.stft.bin_frequency(1, pcm.sample_rate),
            self.params.spectrogram_max_freq,
        );

        debug!(
            "ENF: mains={} Hz, frames={}, confidence={:.3}",
            mains_hz,
            series.len(),
            confidence
        );

        Some(EnfAnalysis {
            hash,
            confidence,
            mains_hz,
            series,
            spectrogram,
        })
    }

    /// Pick the candidate whose band has the highest mean magnitude over
    /// its bins and all frames. Ties keep the earlier candidate; a candidate
    /// with no bins in range scores zero.
    fn select_mains(&self, frames: &[Vec<f64>], sample_rate: u32) -> Option<(f64, Vec<usize>)> {
        let mut best: Option<(f64, f64)> = None;

        for &candidate in &self.params.mains_candidates {
            let energy = mean_band_magnitude(frames, &self.exact_band(candidate, sample_rate));
            if best.map_or(true, |(_, e)| energy > e) {
                best = Some((candidate, energy));
            }
        }

        match best {
            Some((hz, energy)) if energy > 0.0 => Some((hz, self.band_bins(hz, sample_rate))),
            Some(_) => {
                debug!("ENF: no energy in any mains band");
                None
            }
            None => None,
        }
    }

    /// Bins within `band_half_width` of `center`.
    fn exact_band(&self, center: f64, sample_rate: u32) -> Vec<usize> {
        let half = self.params.band_half_width;
        self.bins_between(center - half, center + half, sample_rate)
    }

    fn bins_between(&self, lo: f64, hi: f64, sample_rate: u32) -> Vec<usize> {
        (0..self.stft.n_bins())
            .filter(|&b| {
                let f = self.stft.bin_frequency(b, sample_rate);
                f >= lo && f <= hi
            })
            .collect()
    }

    /// Bins within `band_half_width` of `center`; falls back to every bin
    /// up to `spectrogram_max_freq` when the resolution leaves the band empty.
    fn band_bins(&self, center: f64, sample_rate: u32) -> Vec<usize> {
        let band = self.exact_band(center, sample_rate);
        if band.is_empty() {
            self.bins_between(0.0, self.params.spectrogram_max_freq, sample_rate)
        } else {
            band
        }
    }
}

impl Default for EnfAnalyzer {
    fn default() -> Self {
        Self::new(EnfParams::default())
    }
}

/// Mean magnitude over `band` x every frame; zero for an empty band.
fn mean_band_magnitude(frames: &[Vec<f64>], band: &[usize]) -> f64 {
    let cells = frames.len() * band.len();
    if cells == 0 {
        return 0.0;
    }
    let total: f64 = frames
        .iter()
        .map(|frame| band.iter().map(|&b| frame[b]).sum::<f64>())
        .sum();
    total / cells as f64
}

/// Index of the first maximum.
fn argmax(values: impl Iterator<Item = f64>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, v) in values.enumerate() {
        if best.map_or(true, |(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}

/// Largest normalized autocorrelation of the de-meaned series over lags
/// `1..n`. Zero for constant or single-sample series.
pub fn autocorrelation_confidence(series: &[f64]) -> f64 {
    let n = series.len();
    if n < 2 {
        return 0.0;
    }
    let mean = series.iter().sum::<f64>() / n as f64;
    let x: Vec<f64> = series.iter().map(|v| v - mean).collect();

    let r0: f64 = x.iter().map(|v| v * v).sum();
    if r0 <= 0.0 {
        return 0.0;
    }

    (1..n)
        .map(|lag| x.iter().zip(&x[lag..]).map(|(a, b)| a * b).sum::<f64>() / r0)
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn hum(freq: f64, seconds: f64, amplitude: f64) -> PcmAudio {
        let sr = 1000u32;
        let n = (seconds * sr as f64) as usize;
        PcmAudio {
            samples: (0..n)
                .map(|i| (amplitude * (2.0 * PI * freq * i as f64 / sr as f64).sin()) as f32)
                .collect(),
            sample_rate: sr,
        }
    }

    #[test]
    fn test_detects_60hz_mains() {
        let analysis = EnfAnalyzer::default().analyze(&hum(60.0, 20.0, 0.2)).unwrap();
        assert_eq!(analysis.mains_hz, 60.0);
        assert_eq!(analysis.series.len(), 41);
        assert!(analysis.series.iter().all(|f| (f - 60.0).abs() <= 1.0));
        assert_eq!(analysis.hash.len(), 64);
    }

    #[test]
    fn test_detects_50hz_mains() {
        let analysis = EnfAnalyzer::default().analyze(&hum(50.0, 10.0, 0.2)).unwrap();
        assert_eq!(analysis.mains_hz, 50.0);
    }

    #[test]
    fn test_deterministic() {
        let pcm = hum(50.3, 12.0, 0.05);
        let analyzer = EnfAnalyzer::default();
        let a = analyzer.analyze(&pcm).unwrap();
        let b = analyzer.analyze(&pcm).unwrap();
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.series, b.series);
    }

    #[test]
    fn test_cancelled_analysis_yields_none() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        assert!(EnfAnalyzer::default()
            .analyze_until(&hum(60.0, 10.0, 0.2), &cancel)
            .is_none());
    }

    #[test]
    fn test_silence_yields_none() {
        let pcm = PcmAudio {
            samples: vec![0.0; 30_000],
            sample_rate: 1000,
        };
        assert!(EnfAnalyzer::default().analyze(&pcm).is_none());

        let quiet = hum(60.0, 10.0, 5e-5);
        assert!(EnfAnalyzer::default().analyze(&quiet).is_none());
    }

    #[test]
    fn test_too_few_frames_yields_none() {
        // 1.2 s at hop 500 gives 3 frames
        assert!(EnfAnalyzer::default().analyze(&hum(60.0, 1.2, 0.5)).is_none());
        // 1.5 s gives 4
        assert!(EnfAnalyzer::default().analyze(&hum(60.0, 1.5, 0.5)).is_some());
    }

    #[test]
    fn test_autocorrelation_confidence() {
        assert_eq!(autocorrelation_confidence(&[]), 0.0);
        assert_eq!(autocorrelation_confidence(&[60.0]), 0.0);
        assert_eq!(autocorrelation_confidence(&[60.0; 10]), 0.0);

        let periodic = [1.0, 2.0, 1.0, 2.0, 1.0, 2.0];
        let c = autocorrelation_confidence(&periodic);
        assert!((c - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_mains_chosen_by_mean_magnitude() {
        // sr 1000, n_fft 2048: 50 Hz band is bins 101..=104, 60 Hz band 121..=124.
        // A broad 50 Hz band beats a single loud 60 Hz bin on mean magnitude
        // even though the 60 Hz band has more total power.
        let analyzer = EnfAnalyzer::default();
        let mut frame = vec![0.0; analyzer.stft.n_bins()];
        for bin in 101..=104 {
            frame[bin] = 1.0;
        }
        frame[121] = 3.0;
        let frames = vec![frame; 6];

        let (mains_hz, band) = analyzer.select_mains(&frames, 1000).unwrap();
        assert_eq!(mains_hz, 50.0);
        assert_eq!(band, vec![101, 102, 103, 104]);
    }

    #[test]
    fn test_mains_selection_without_energy() {
        let analyzer = EnfAnalyzer::default();
        let frames = vec![vec![0.0; analyzer.stft.n_bins()]; 6];
        assert!(analyzer.select_mains(&frames, 1000).is_none());
    }

    #[test]
    fn test_argmax_first_max_wins() {
        assert_eq!(argmax([1.0, 3.0, 3.0, 2.0].into_iter()), Some(1));
        assert_eq!(argmax(std::iter::empty()), None);
    }
}
