//! GPU acceleration module - H.264 encoder profiles
//!
//! | Profile | Encoder    | Rate control            |
//! |---------|------------|-------------------------|
//! | nvidia  | h264_nvenc | bitrate (VBR, capped)   |
//! | amdgpu  | h264_amf   | bitrate (VBR, capped)   |
//! | intel   | h264_qsv   | bitrate (VBR, capped)   |
//! | vaapi   | h264_vaapi | bitrate (VBR, capped)   |
//! | cpu     | libx264    | CRF, capped by maxrate  |
//!
//! The profile set is closed, so each profile maps to a static [`EncoderSpec`]
//! row rather than a trait object.
//!
//! ```rust
//! use shared_utils::gpu_accel::{EncoderProfile, RateControl};
//!
//! let spec = EncoderProfile::Nvidia.spec();
//! assert_eq!(spec.encoder, "h264_nvenc");
//! let rc = RateControl::Bitrate { target_kbps: 3000, max_kbps: 3300, bufsize_kbps: 6000 };
//! assert_eq!(rc.args()[1], "3000k");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::ffmpeg_process::{CommandRunner, ProcessError};

/// Render node used by the VA-API profile.
pub const VAAPI_DEVICE: &str = "/dev/dri/renderD128";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderProfile {
    /// NVIDIA NVENC
    Nvidia,
    /// AMD Advanced Media Framework
    AmdGpu,
    /// Intel Quick Sync Video
    Intel,
    /// VA-API (Linux)
    Vaapi,
    /// Software libx264
    Cpu,
}

impl EncoderProfile {
    pub const ALL: [EncoderProfile; 5] = [
        EncoderProfile::Nvidia,
        EncoderProfile::AmdGpu,
        EncoderProfile::Intel,
        EncoderProfile::Vaapi,
        EncoderProfile::Cpu,
    ];

    pub fn spec(self) -> &'static EncoderSpec {
        match self {
            EncoderProfile::Nvidia => &ENCODER_TABLE[0],
            EncoderProfile::AmdGpu => &ENCODER_TABLE[1],
            EncoderProfile::Intel => &ENCODER_TABLE[2],
            EncoderProfile::Vaapi => &ENCODER_TABLE[3],
            EncoderProfile::Cpu => &ENCODER_TABLE[4],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EncoderProfile::Nvidia => "nvidia",
            EncoderProfile::AmdGpu => "amdgpu",
            EncoderProfile::Intel => "intel",
            EncoderProfile::Vaapi => "vaapi",
            EncoderProfile::Cpu => "cpu",
        }
    }

    pub fn is_hardware(self) -> bool {
        !matches!(self, EncoderProfile::Cpu)
    }
}

impl Default for EncoderProfile {
    fn default() -> Self {
        EncoderProfile::Nvidia
    }
}

impl fmt::Display for EncoderProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncoderProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nvidia" | "nvidiagpu" | "nvenc" => Ok(EncoderProfile::Nvidia),
            "amdgpu" | "amd" | "amf" => Ok(EncoderProfile::AmdGpu),
            "intel" | "qsv" => Ok(EncoderProfile::Intel),
            "vaapi" => Ok(EncoderProfile::Vaapi),
            "cpu" | "software" | "libx264" => Ok(EncoderProfile::Cpu),
            other => Err(format!(
                "unknown encoder profile '{}' (expected nvidia, amdgpu, intel, vaapi or cpu)",
                other
            )),
        }
    }
}

/// Static description of one encoder profile.
#[derive(Debug)]
pub struct EncoderSpec {
    pub profile: EncoderProfile,
    /// ffmpeg encoder name passed to `-c:v`
    pub encoder: &'static str,
    /// Inserted before `-i`
    pub hwaccel_args: &'static [&'static str],
    /// Encoder-specific tuning inserted after `-c:v`
    pub extra_args: &'static [&'static str],
    /// Upload filter for encoders that want hardware frames
    pub video_filter: Option<&'static str>,
    /// Whether `-pix_fmt yuv420p` applies (not for hardware surfaces)
    pub sets_pix_fmt: bool,
    /// Quality-driven (CRF) instead of bitrate-driven rate control
    pub constant_quality: bool,
}

static ENCODER_TABLE: [EncoderSpec; 5] = [
    EncoderSpec {
        profile: EncoderProfile::Nvidia,
        encoder: "h264_nvenc",
        hwaccel_args: &["-hwaccel", "cuda"],
        extra_args: &["-preset", "p4", "-rc", "vbr"],
        video_filter: None,
        sets_pix_fmt: true,
        constant_quality: false,
    },
    EncoderSpec {
        profile: EncoderProfile::AmdGpu,
        encoder: "h264_amf",
        hwaccel_args: &[],
        extra_args: &["-quality", "balanced", "-rc", "vbr_peak"],
        video_filter: None,
        sets_pix_fmt: true,
        constant_quality: false,
    },
    EncoderSpec {
        profile: EncoderProfile::Intel,
        encoder: "h264_qsv",
        hwaccel_args: &[],
        extra_args: &["-preset", "medium"],
        video_filter: None,
        sets_pix_fmt: true,
        constant_quality: false,
    },
    EncoderSpec {
        profile: EncoderProfile::Vaapi,
        encoder: "h264_vaapi",
        hwaccel_args: &["-vaapi_device", VAAPI_DEVICE],
        extra_args: &[],
        video_filter: Some("format=nv12,hwupload"),
        sets_pix_fmt: false,
        constant_quality: false,
    },
    EncoderSpec {
        profile: EncoderProfile::Cpu,
        encoder: "libx264",
        hwaccel_args: &[],
        extra_args: &["-preset", "medium"],
        video_filter: None,
        sets_pix_fmt: true,
        constant_quality: true,
    },
];

/// Rate-control settings for one encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateControl {
    Bitrate {
        target_kbps: u32,
        max_kbps: u32,
        bufsize_kbps: u32,
    },
    /// CRF with a VBV ceiling so output never exceeds the bitrate cap
    ConstantQuality {
        crf: u8,
        max_kbps: u32,
        bufsize_kbps: u32,
    },
}

impl RateControl {
    pub fn args(&self) -> Vec<String> {
        match *self {
            RateControl::Bitrate {
                target_kbps,
                max_kbps,
                bufsize_kbps,
            } => vec![
                "-b:v".to_string(),
                format!("{}k", target_kbps),
                "-maxrate".to_string(),
                format!("{}k", max_kbps),
                "-bufsize".to_string(),
                format!("{}k", bufsize_kbps),
            ],
            RateControl::ConstantQuality {
                crf,
                max_kbps,
                bufsize_kbps,
            } => vec![
                "-crf".to_string(),
                crf.to_string(),
                "-maxrate".to_string(),
                format!("{}k", max_kbps),
                "-bufsize".to_string(),
                format!("{}k", bufsize_kbps),
            ],
        }
    }

    /// Ledger option tag, `br:<target>` or `crf:<n>`.
    pub fn option_tag(&self) -> String {
        match self {
            RateControl::Bitrate { target_kbps, .. } => format!("br:{}", target_kbps),
            RateControl::ConstantQuality { crf, .. } => format!("crf:{}", crf),
        }
    }
}

/// Video encoder names ffmpeg reports via `-encoders`.
pub fn available_encoders(
    runner: &dyn CommandRunner,
    ffmpeg: &Path,
    timeout: Duration,
) -> Result<Vec<String>, ProcessError> {
    let args = vec!["-hide_banner".to_string(), "-encoders".to_string()];
    let output = runner.run(ffmpeg, &args, timeout)?;
    Ok(parse_encoder_list(&output.stdout))
}

fn parse_encoder_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|line| line.starts_with(" V"))
        .filter_map(|line| line.split_whitespace().nth(1))
        .filter(|name| *name != "=")
        .map(str::to_string)
        .collect()
}
