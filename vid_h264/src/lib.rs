//! vid-h264 - bitrate-aware H.264 normalizer
//!
//! Walks a media tree, probes every video and re-encodes in place the ones
//! that are not H.264 or exceed the bitrate ceiling:
//! - `scan`: report what would be converted, touch nothing
//! - `convert`: encode to a temp file, validate, rename over the source,
//!   then append to the progress ledger and size report
//!
//! ```rust,ignore
//! use vid_h264::{Pipeline, RunOptions, Settings, Tools};
//! use shared_utils::{EncoderProfile, SystemRunner};
//!
//! let settings = Settings::load(None)?;
//! let tools = Tools { ffmpeg: "ffmpeg".into(), ffprobe: "ffprobe".into() };
//! let summary = Pipeline::new(&settings, &tools, &SystemRunner).run(&RunOptions {
//!     root: "/srv/media".into(),
//!     dry_run: true,
//!     profile: EncoderProfile::Nvidia,
//!     crf_override: None,
//!     show_progress: false,
//! })?;
//! ```

pub mod classifier;
pub mod config;
pub mod executor;
pub mod pipeline;
pub mod planner;

#[cfg(test)]
pub(crate) mod test_support;

pub use classifier::{classify, container_verdict, Action, Reason, Verdict};
pub use config::{ConfigError, Settings};
pub use executor::{ConversionOutcome, ConversionResult, Executor};
pub use pipeline::{Pipeline, RunOptions, RunSummary, Tools};
pub use planner::{plan, AudioMode, ConversionPlan, SubtitleMode};
