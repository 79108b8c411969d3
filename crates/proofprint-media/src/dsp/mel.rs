//! Slaney-style mel filterbank.

const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

/// Slaney mel scale: linear below 1 kHz, logarithmic above.
pub fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// Triangular mel filters spanning 0 Hz to Nyquist, area-normalised.
#[derive(Debug, Clone)]
pub struct MelFilterBank {
    /// `[band][bin]`
    weights: Vec<Vec<f64>>,
}

impl MelFilterBank {
    pub fn new(sample_rate: u32, n_fft: usize, n_mels: usize) -> Self {
        let n_bins = n_fft / 2 + 1;
        let nyquist = sample_rate as f64 / 2.0;

        let fft_freqs: Vec<f64> = (0..n_bins)
            .map(|i| i as f64 * sample_rate as f64 / n_fft as f64)
            .collect();

        let mel_max = hz_to_mel(nyquist);
        let mel_points: Vec<f64> = (0..n_mels + 2)
            .map(|i| mel_to_hz(mel_max * i as f64 / (n_mels + 1) as f64))
            .collect();

        let weights = (0..n_mels)
            .map(|m| {
                let (lo, center, hi) = (mel_points[m], mel_points[m + 1], mel_points[m + 2]);
                let enorm = 2.0 / (hi - lo);
                fft_freqs
                    .iter()
                    .map(|&f| {
                        let lower = (f - lo) / (center - lo);
                        let upper = (hi - f) / (hi - center);
                        lower.min(upper).max(0.0) * enorm
                    })
                    .collect()
            })
            .collect();

        Self { weights }
    }

    pub fn n_mels(&self) -> usize {
        self.weights.len()
    }

    /// Project one power-spectrum frame onto the mel bands.
    pub fn apply(&self, power_frame: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .map(|band| band.iter().zip(power_frame).map(|(w, p)| w * p).sum())
            .collect()
    }
}
