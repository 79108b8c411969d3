//! FFprobe stream information.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::command::{check_ffprobe, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Container-level information needed by the decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds (0.0 when the container does not say)
    pub duration: f64,
    /// First audio stream, if any
    pub audio: Option<AudioStreamInfo>,
    /// First video stream, if any
    pub video: Option<VideoStreamInfo>,
}

/// First audio stream of a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    /// Codec name; `None` when FFprobe has no decoder for the stream
    pub codec: Option<String>,
    /// Native sample rate
    pub sample_rate: Option<u32>,
    /// Native channel count
    pub channels: Option<u32>,
}

impl AudioStreamInfo {
    /// Whether FFmpeg recognises the stream's codec.
    pub fn is_decodable(&self) -> bool {
        self.codec.as_deref().is_some_and(|c| !c.is_empty() && c != "none")
    }
}

/// First video stream of a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Video codec
    pub codec: String,
    /// Frame count reported by the container, or estimated from duration
    pub frame_count: Option<u64>,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
}

/// Probe a media file for its audio and video streams.
pub async fn probe_media(path: impl AsRef<Path>, runner: &FfmpegRunner) -> MediaResult<MediaInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let args = vec![
        "-v".to_string(),
        "error".to_string(),
        "-print_format".to_string(),
        "json".to_string(),
        "-show_format".to_string(),
        "-show_streams".to_string(),
        path.to_string_lossy().to_string(),
    ];

    let output = runner.run_program("ffprobe", &args).await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: "FFprobe failed".to_string(),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
    parse_probe(probe)
}

fn parse_probe(probe: FfprobeOutput) -> MediaResult<MediaInfo> {
    let duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let audio = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .map(|s| AudioStreamInfo {
            codec: s.codec_name.clone(),
            sample_rate: s.sample_rate.as_deref().and_then(|r| r.parse().ok()),
            channels: s.channels,
        });

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video") && s.width.unwrap_or(0) > 0)
        .map(|s| {
            let fps = s
                .avg_frame_rate
                .as_deref()
                .and_then(parse_frame_rate)
                .or_else(|| s.r_frame_rate.as_deref().and_then(parse_frame_rate))
                .unwrap_or(30.0);

            let stream_duration = s
                .duration
                .as_deref()
                .and_then(|d| d.parse::<f64>().ok())
                .unwrap_or(duration);

            let frame_count = s
                .nb_frames
                .as_deref()
                .and_then(|n| n.parse::<u64>().ok())
                .filter(|n| *n > 0)
                .or_else(|| {
                    let estimate = (stream_duration * fps).floor();
                    (estimate >= 1.0).then_some(estimate as u64)
                });

            VideoStreamInfo {
                width: s.width.unwrap_or(0),
                height: s.height.unwrap_or(0),
                fps,
                codec: s.codec_name.clone().unwrap_or_default(),
                frame_count,
            }
        });

    if audio.is_none() && video.is_none() {
        return Err(MediaError::invalid_media("No audio or video stream found"));
    }

    Ok(MediaInfo {
        duration,
        audio,
        video,
    })
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    let fps = if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            num / den
        } else {
            return None;
        }
    } else {
        s.parse().ok()?
    };

    (fps > 0.0 && fps.is_finite()).then_some(fps)
}
