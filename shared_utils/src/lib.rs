//! Shared utilities for the vid-h264 normalizer
//!
//! - Subprocess capability with deadlines (ffmpeg / ffprobe)
//! - FFprobe wrapper and codec tables
//! - H.264 encoder profile table
//! - Progress ledger and size report (append-only)
//! - Directory walking, temp file sweep, safety checks
//! - Logging, progress bar and thread budget

pub mod batch;
pub mod checkpoint;
pub mod codecs;
pub mod common_utils;
pub mod errors;
pub mod ffmpeg_process;
pub mod ffprobe;
pub mod gpu_accel;
pub mod logging;
pub mod progress;
pub mod report;
pub mod safety;
pub mod thread_manager;
pub mod tools;

pub use batch::{sweep_temp_files, BatchResult, VideoWalker};
pub use checkpoint::{normalize_path, verify_output_integrity, LedgerEntry, ProgressLedger};
pub use codecs::{is_h264, subtitle_kind, SubtitleKind};
pub use common_utils::{
    get_extension_lowercase, is_h264_container, is_temp_file, is_video_candidate, temp_path_for,
    TEMP_MARKER,
};
pub use errors::{ConversionError, WalkError};
pub use ffmpeg_process::{format_ffmpeg_error, CommandOutput, CommandRunner, ProcessError, SystemRunner};
pub use ffprobe::{BitrateSources, MediaInfo, ProbeError, Prober, StreamInfo};
pub use gpu_accel::{available_encoders, EncoderProfile, EncoderSpec, RateControl};
pub use logging::{init_logging, LogConfig};
pub use progress::{create_progress_bar, format_bytes, format_duration};
pub use report::{print_summary_report, SizeReportRow, SizeReporter};
pub use safety::check_safe_for_destructive;
pub use thread_manager::{resolve_parallel_tasks, ThreadAllocation};
pub use tools::{resolve_tool, ToolError};
