//! Media decoding: mono PCM and sampled grayscale frames.

use std::path::Path;

use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::config::VideoHashParams;
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_media, MediaInfo};

/// Decoded mono PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PcmAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }
}

/// One 8-bit grayscale frame, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayFrame {
    /// Position of the frame in the decoded stream
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Decodes clips through the FFmpeg CLI.
///
/// Absent content is reported as `None` or an empty frame list. Decode
/// errors on streams FFmpeg claims to understand propagate as `MediaError`.
#[derive(Debug, Clone, Default)]
pub struct MediaDecoder {
    runner: FfmpegRunner,
}

impl MediaDecoder {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self { runner }
    }

    /// Decoder whose subprocesses are killed after `secs`.
    pub fn with_timeout(secs: u64) -> Self {
        Self::new(FfmpegRunner::new().with_timeout(secs))
    }

    pub async fn probe(&self, path: &Path) -> MediaResult<MediaInfo> {
        probe_media(path, &self.runner).await
    }

    /// Decode the first audio stream to mono f32 at `sample_rate`, reading
    /// at most `max_secs` of input.
    pub async fn decode_audio(
        &self,
        path: &Path,
        info: &MediaInfo,
        sample_rate: u32,
        max_secs: f64,
    ) -> MediaResult<Option<PcmAudio>> {
        let Some(stream) = info.audio.as_ref() else {
            debug!("No audio stream in {}", path.display());
            return Ok(None);
        };

        if !stream.is_decodable() {
            info!("Audio stream in {} has no known codec, skipping audio", path.display());
            return Ok(None);
        }

        let cmd = FfmpegCommand::new(path)
            .duration(max_secs)
            .map("0:a:0")
            .mono_f32le(sample_rate);

        let bytes = self.runner.capture(&cmd).await?;
        let samples = f32_samples(&bytes);

        if samples.is_empty() {
            debug!("Audio stream in {} decoded to zero samples", path.display());
            return Ok(None);
        }

        debug!(
            "Decoded {} samples at {} Hz from {}",
            samples.len(),
            sample_rate,
            path.display()
        );

        Ok(Some(PcmAudio {
            samples,
            sample_rate,
        }))
    }

    /// Decode the frames at `indices` (ascending) as grayscale, reading at
    /// most `max_secs` of input.
    ///
    /// Indices past the end of the stream are silently skipped, so the
    /// result may hold fewer frames than requested.
    pub async fn decode_frames(
        &self,
        path: &Path,
        info: &MediaInfo,
        indices: &[u64],
        max_secs: f64,
    ) -> MediaResult<Vec<GrayFrame>> {
        let Some(video) = info.video.as_ref() else {
            return Ok(Vec::new());
        };
        if indices.is_empty() {
            return Ok(Vec::new());
        }

        let frame_len = video.width as usize * video.height as usize;
        if frame_len == 0 {
            return Err(MediaError::invalid_media("Video stream has zero-sized frames"));
        }

        let cmd = frame_command(path, indices, max_secs);
        let bytes = self.runner.capture(&cmd).await?;

        let frames: Vec<GrayFrame> = bytes
            .chunks_exact(frame_len)
            .zip(indices.iter())
            .map(|(chunk, &index)| GrayFrame {
                index,
                width: video.width,
                height: video.height,
                pixels: chunk.to_vec(),
            })
            .collect();

        debug!(
            "Decoded {}/{} requested frames from {}",
            frames.len(),
            indices.len(),
            path.display()
        );

        Ok(frames)
    }
}

/// Frame indices to sample for the perceptual hash.
///
/// `N` evenly spaced indices: `step = max(count / (N + 1), 1)` and
/// `index_i = step * (i + 1)`. The count is clamped to the decode cap;
/// an unknown count samples only the first frame.
pub fn sample_frame_indices(info: &MediaInfo, params: &VideoHashParams) -> Vec<u64> {
    let Some(video) = info.video.as_ref() else {
        return Vec::new();
    };

    let cap_frames = (params.max_duration_secs * video.fps).floor().max(1.0) as u64;
    let count = match video.frame_count {
        Some(count) if count > 0 => count.min(cap_frames),
        _ => return vec![0],
    };

    let n = params.frames_to_sample as u64;
    let step = (count / (n + 1)).max(1);
    (0..n).map(|i| step * (i + 1)).collect()
}

/// Grayscale frame extraction; `-t` stops the demuxer at the cap instead of
/// letting `select` scan the rest of the stream.
fn frame_command(path: &Path, indices: &[u64], max_secs: f64) -> FfmpegCommand {
    FfmpegCommand::new(path)
        .duration(max_secs)
        .no_autorotate()
        .video_filter(select_filter(indices))
        .raw_gray_frames()
}

/// Build `select=eq(n\,a)+eq(n\,b)+...,format=gray`.
fn select_filter(indices: &[u64]) -> String {
    let terms: Vec<String> = indices.iter().map(|i| format!("eq(n\\,{})", i)).collect();
    format!("select={},format=gray", terms.join("+"))
}

/// Reinterpret little-endian f32 bytes; a trailing partial sample is dropped.
fn f32_samples(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
