//! Run settings
//!
//! Layered with figment: built-in defaults, then `vid_h264.toml` in the
//! working directory (or an explicit `--config` file), then the process
//! environment (`TARGET_BR`, `MAX_BR`, `BITRATE_TOLERANCE`, `BUFSIZE`,
//! `DEFAULT_CRF`, `FFMPEG_PATH`, `FFPROBE_PATH`), then CLI overrides.
//! Settings are loaded once and treated as immutable for the run.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use shared_utils::gpu_accel::{EncoderProfile, RateControl};

pub const DEFAULT_CONFIG_FILE: &str = "vid_h264.toml";

const ENV_KEYS: &[&str] = &[
    "TARGET_BR",
    "MAX_BR",
    "BITRATE_TOLERANCE",
    "BUFSIZE",
    "DEFAULT_CRF",
    "FFMPEG_PATH",
    "FFPROBE_PATH",
];

pub const MAX_CRF: u8 = 51;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to parse settings: {0}")]
    Parse(String),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Target video bitrate (kbps)
    pub target_br: u32,
    /// Ceiling; H.264 files above it are re-encoded
    pub max_br: u32,
    /// Files at or above `target_br - bitrate_tolerance` count as on target
    pub bitrate_tolerance: u32,
    /// VBV buffer (kbps)
    pub bufsize: u32,
    /// CRF for the software profile
    pub default_crf: u8,
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub probe_timeout_secs: u64,
    pub encode_timeout_secs: u64,
    /// Parallel files; `None` uses the video thread budget
    pub jobs: Option<usize>,
    /// Append-only record of converted files
    pub ledger_path: PathBuf,
    /// JSON Lines size report
    pub report_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_br: 3000,
            max_br: 3300,
            bitrate_tolerance: 300,
            bufsize: 6000,
            default_crf: 23,
            ffmpeg_path: None,
            ffprobe_path: None,
            probe_timeout_secs: 60,
            encode_timeout_secs: 6 * 60 * 60,
            jobs: None,
            ledger_path: PathBuf::from("done.txt"),
            report_path: PathBuf::from("size_report.jsonl"),
        }
    }
}

impl Settings {
    /// Defaults, config file, environment. An explicit `config_file` must
    /// exist; the default one is optional.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let figment = Self::base_figment(config_file)?.merge(Env::raw().only(ENV_KEYS));
        Self::extract(figment)
    }

    fn base_figment(config_file: Option<&Path>) -> Result<Figment, ConfigError> {
        let file = match config_file {
            Some(path) if !path.is_file() => return Err(ConfigError::FileNotFound(path.to_path_buf())),
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };
        Ok(Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file(file)))
    }

    pub fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let settings: Settings = figment
            .extract()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// `--bitrate N`: the cap becomes N and the target sits one tolerance below.
    pub fn apply_bitrate_override(&mut self, max_kbps: u32) {
        self.max_br = max_kbps;
        self.target_br = max_kbps.saturating_sub(self.bitrate_tolerance);
        self.bufsize = max_kbps.saturating_mul(2);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_br == 0 {
            return Err(ConfigError::Invalid("MAX_BR must be greater than 0".into()));
        }
        if self.bitrate_tolerance >= self.target_br {
            return Err(ConfigError::Invalid(format!(
                "BITRATE_TOLERANCE ({}) must be below TARGET_BR ({})",
                self.bitrate_tolerance, self.target_br
            )));
        }
        if self.target_br > self.max_br {
            return Err(ConfigError::Invalid(format!(
                "TARGET_BR ({}) must not exceed MAX_BR ({})",
                self.target_br, self.max_br
            )));
        }
        if self.default_crf > MAX_CRF {
            return Err(ConfigError::Invalid(format!(
                "DEFAULT_CRF ({}) must be within 0..={}",
                self.default_crf, MAX_CRF
            )));
        }
        if self.probe_timeout_secs == 0 || self.encode_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be greater than 0".into()));
        }
        Ok(())
    }

    /// `TARGET_BR - BITRATE_TOLERANCE`, the bottom of the on-target band.
    pub fn lower_bound(&self) -> u32 {
        self.target_br.saturating_sub(self.bitrate_tolerance)
    }

    /// Rate control for `profile`. The CRF only applies to quality-driven
    /// profiles.
    pub fn rate_control(&self, profile: EncoderProfile, crf_override: Option<u8>) -> RateControl {
        if profile.spec().constant_quality {
            RateControl::ConstantQuality {
                crf: crf_override.unwrap_or(self.default_crf),
                max_kbps: self.max_br,
                bufsize_kbps: self.bufsize,
            }
        } else {
            RateControl::Bitrate {
                target_kbps: self.target_br,
                max_kbps: self.max_br,
                bufsize_kbps: self.bufsize,
            }
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn encode_timeout(&self) -> Duration {
        Duration::from_secs(self.encode_timeout_secs)
    }
}
