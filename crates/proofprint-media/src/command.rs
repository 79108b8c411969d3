//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Output target that streams FFmpeg's result to our stdout pipe.
pub const PIPE_OUTPUT: &str = "pipe:1";

/// Number of stderr lines kept on failure.
const STDERR_TAIL_LINES: usize = 20;

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output target (file path or pipe)
    output: String,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a command that writes its output to stdout.
    pub fn new(input: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: PIPE_OUTPUT.to_string(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            log_level: "error".to_string(),
        }
    }

    /// Write to a file instead of stdout.
    pub fn output_path(mut self, output: impl AsRef<Path>) -> Self {
        self.output = output.as_ref().to_string_lossy().to_string();
        self
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Limit how much of the input is read.
    pub fn duration(self, seconds: f64) -> Self {
        self.input_arg("-t").input_arg(format!("{:.3}", seconds))
    }

    /// Ignore display-matrix rotation so frame sizes match the probe.
    pub fn no_autorotate(self) -> Self {
        self.input_arg("-noautorotate")
    }

    /// Select which input stream feeds the output.
    pub fn map(self, spec: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(spec)
    }

    /// Downmix/resample audio to mono 32-bit float little-endian PCM.
    pub fn mono_f32le(self, sample_rate: u32) -> Self {
        self.output_args([
            "-vn".to_string(),
            "-ac".to_string(),
            "1".to_string(),
            "-ar".to_string(),
            sample_rate.to_string(),
            "-f".to_string(),
            "f32le".to_string(),
        ])
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Emit 8-bit grayscale raw frames without frame-rate conversion.
    pub fn raw_gray_frames(self) -> Self {
        self.output_args(["-an", "-vsync", "0", "-f", "rawvideo", "-pix_fmt", "gray"])
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-nostdin".to_string(),
            "-y".to_string(),
            "-v".to_string(),
            self.log_level.clone(),
        ];

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.clone());

        args
    }
}

/// Runner for FFmpeg/FFprobe subprocesses with a wall-clock bound.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

impl FfmpegRunner {
    /// Create a new runner with no timeout.
    pub fn new() -> Self {
        Self { timeout_secs: None }
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run an FFmpeg command and return everything it wrote to stdout.
    pub async fn capture(&self, cmd: &FfmpegCommand) -> MediaResult<Vec<u8>> {
        check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let output = self.run_program("ffmpeg", &args).await?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                Some(stderr_tail(&output.stderr)),
                output.status.code(),
            ))
        }
    }

    /// Spawn `program`, collect its output, and kill it if the timeout expires.
    pub async fn run_program(&self, program: &str, args: &[String]) -> MediaResult<Output> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let wait = child.wait_with_output();

        match self.timeout_secs {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), wait).await {
                Ok(result) => Ok(result?),
                Err(_) => {
                    // Dropping the future drops the child, which kills it.
                    warn!("{} timed out after {} seconds, killing process", program, secs);
                    Err(MediaError::Timeout(secs))
                }
            },
            None => Ok(wait.await?),
        }
    }
}

/// Keep the last few lines of a subprocess's stderr for error reports.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}
