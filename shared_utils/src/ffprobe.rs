//! FFprobe wrapper module
//!
//! Runs `ffprobe -print_format json -show_format -show_streams` through a
//! [`CommandRunner`] and reduces the output to the handful of facts the
//! normalizer decides on: container, video codec, video bitrate, duration
//! and the ordered audio / subtitle streams.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::ffmpeg_process::{CommandRunner, ProcessError};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("cannot read {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("no video stream in {0}")]
    NoVideoStream(PathBuf),

    #[error("ffprobe timed out after {timeout:?} on {path}")]
    Timeout { path: PathBuf, timeout: Duration },
}

/// One audio/subtitle/video stream as reported by ffprobe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Absolute stream index inside the container (`-map 0:<index>`)
    pub index: u32,
    /// Lower-cased codec name, empty when ffprobe does not know it
    pub codec_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub container_format: String,
    pub video_codec: String,
    pub bitrate_kbps: u64,
    pub duration_secs: f64,
    pub size_bytes: u64,
    pub video_streams: Vec<StreamInfo>,
    pub audio_streams: Vec<StreamInfo>,
    pub subtitle_streams: Vec<StreamInfo>,
}

// ffprobe prints most numbers as JSON strings
#[derive(Debug, Deserialize)]
struct ProbeJson {
    #[serde(default)]
    format: Option<FormatJson>,
    #[serde(default)]
    streams: Vec<StreamJson>,
}

#[derive(Debug, Deserialize)]
struct FormatJson {
    #[serde(default)]
    format_name: Option<String>,
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamJson {
    index: Option<u32>,
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    codec_name: Option<String>,
    #[serde(default)]
    bit_rate: Option<String>,
    /// Matroska keeps per-stream rates in `BPS` / `BPS-eng` tags
    #[serde(default)]
    tags: HashMap<String, String>,
}

impl StreamJson {
    fn bits_per_second(&self) -> Option<u64> {
        parse_number::<u64>(self.bit_rate.as_deref())
            .or_else(|| parse_number(self.tags.get("BPS").map(String::as_str)))
            .or_else(|| parse_number(self.tags.get("BPS-eng").map(String::as_str)))
            .filter(|bps| *bps > 0)
    }
}

/// Prober bound to a runner, an ffprobe binary and a deadline.
pub struct Prober<'a> {
    runner: &'a dyn CommandRunner,
    ffprobe: PathBuf,
    timeout: Duration,
}

impl<'a> Prober<'a> {
    pub fn new(runner: &'a dyn CommandRunner, ffprobe: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            runner,
            ffprobe: ffprobe.into(),
            timeout,
        }
    }

    pub fn probe(&self, path: &Path) -> Result<MediaInfo, ProbeError> {
        let metadata = std::fs::metadata(path).map_err(|e| ProbeError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !metadata.is_file() {
            return Err(ProbeError::Unreadable {
                path: path.to_path_buf(),
                reason: "not a regular file".to_string(),
            });
        }

        let args = probe_args(path);
        let output = self
            .runner
            .run(&self.ffprobe, &args, self.timeout)
            .map_err(|e| match e {
                ProcessError::Timeout { timeout, .. } => ProbeError::Timeout {
                    path: path.to_path_buf(),
                    timeout,
                },
                other => ProbeError::Unreadable {
                    path: path.to_path_buf(),
                    reason: other.to_string(),
                },
            })?;

        if !output.success() || output.stdout.trim().is_empty() {
            let stderr = output.stderr.trim();
            let reason = if stderr.is_empty() {
                format!("ffprobe exit code {:?}", output.exit_code)
            } else {
                stderr.to_string()
            };
            return Err(ProbeError::Unreadable {
                path: path.to_path_buf(),
                reason,
            });
        }

        parse_probe_output(path, &output.stdout, metadata.len())
    }
}

pub fn probe_args(path: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-print_format".to_string(),
        "json".to_string(),
        "-show_format".to_string(),
        "-show_streams".to_string(),
        "--".to_string(),
        path.to_string_lossy().into_owned(),
    ]
}

/// Turn ffprobe JSON into [`MediaInfo`].
///
/// `file_size` is the on-disk size, used when the format section omits it.
pub fn parse_probe_output(path: &Path, json: &str, file_size: u64) -> Result<MediaInfo, ProbeError> {
    let parsed: ProbeJson = serde_json::from_str(json).map_err(|e| ProbeError::Unreadable {
        path: path.to_path_buf(),
        reason: format!("invalid ffprobe JSON: {}", e),
    })?;

    let mut video_streams = Vec::new();
    let mut audio_streams = Vec::new();
    let mut subtitle_streams = Vec::new();
    let mut video_bps = None;
    let mut audio_bps = 0u64;

    for stream in &parsed.streams {
        let Some(index) = stream.index else { continue };
        let info = StreamInfo {
            index,
            codec_name: stream.codec_name.clone().unwrap_or_default().to_lowercase(),
        };
        match stream.codec_type.as_deref() {
            Some("video") => {
                if video_streams.is_empty() {
                    video_bps = stream.bits_per_second();
                }
                video_streams.push(info)
            }
            Some("audio") => {
                audio_bps += stream.bits_per_second().unwrap_or(0);
                audio_streams.push(info)
            }
            Some("subtitle") => subtitle_streams.push(info),
            _ => {}
        }
    }

    let video_codec = match video_streams.first() {
        Some(first) => first.codec_name.clone(),
        None => return Err(ProbeError::NoVideoStream(path.to_path_buf())),
    };

    let format = parsed.format.ok_or_else(|| ProbeError::Unreadable {
        path: path.to_path_buf(),
        reason: "ffprobe reported no format section".to_string(),
    })?;

    let duration_secs = parse_number::<f64>(format.duration.as_deref()).unwrap_or(0.0);
    let size_bytes = parse_number::<u64>(format.size.as_deref())
        .filter(|s| *s > 0)
        .unwrap_or(file_size);
    let container_bps = parse_number::<u64>(format.bit_rate.as_deref()).unwrap_or(0);

    let bitrate_kbps = resolve_bitrate_kbps(
        BitrateSources {
            video_bps,
            container_bps,
            audio_bps,
        },
        size_bytes,
        duration_secs,
    )
    .ok_or_else(|| ProbeError::Unreadable {
        path: path.to_path_buf(),
        reason: "bitrate unknown (no bit_rate and no usable size/duration)".to_string(),
    })?;

    Ok(MediaInfo {
        container_format: format.format_name.unwrap_or_else(|| "unknown".to_string()),
        video_codec,
        bitrate_kbps,
        duration_secs,
        size_bytes,
        video_streams,
        audio_streams,
        subtitle_streams,
    })
}

/// Bit rates ffprobe reported, in bits per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BitrateSources {
    /// First video stream's own rate
    pub video_bps: Option<u64>,
    /// `format.bit_rate`, 0 when absent
    pub container_bps: u64,
    /// Sum of the audio streams that report a rate
    pub audio_bps: u64,
}

/// Video bitrate in kbps, first available of:
///
/// 1. the video stream's own bit rate
/// 2. container bit rate minus the known audio rates
/// 3. `floor(size * 8 / 1000 / duration)` minus the known audio rates
///
/// Audio is stream-copied and never capped by the encoder, so it stays out
/// of the figure the classifier compares against the bitrate band.
pub fn resolve_bitrate_kbps(sources: BitrateSources, size_bytes: u64, duration_secs: f64) -> Option<u64> {
    if let Some(video_bps) = sources.video_bps.filter(|bps| *bps > 0) {
        return Some(video_bps / 1000);
    }
    if sources.container_bps > 0 {
        return Some(sources.container_bps.saturating_sub(sources.audio_bps) / 1000);
    }
    if size_bytes == 0 || duration_secs <= 0.0 || !duration_secs.is_finite() {
        return None;
    }
    let total_kbps = (size_bytes as f64 * 8.0 / 1000.0 / duration_secs).floor() as u64;
    Some(total_kbps.saturating_sub(sources.audio_bps / 1000))
}

fn parse_number<T: std::str::FromStr>(raw: Option<&str>) -> Option<T> {
    raw.and_then(|s| s.trim().parse::<T>().ok())
}
