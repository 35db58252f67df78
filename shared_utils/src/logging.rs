//! Logging Module - tracing setup shared by the tools
//!
//! - stderr output at INFO (or DEBUG with `--verbose`), overridable by `RUST_LOG`
//! - optional log file that always receives DEBUG and above, written through a
//!   non-blocking appender so slow disks never stall a worker
//! - helper for recording external tool invocations
//!
//! # Examples
//!
//! ```no_run
//! use shared_utils::logging::{LogConfig, init_logging};
//! use tracing::info;
//!
//! let _guard = init_logging("vid_h264", LogConfig::default()).expect("logging");
//! info!("Program started");
//! ```

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Logging configuration
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// DEBUG instead of INFO on stderr
    pub verbose: bool,
    /// Extra destination that mirrors everything at DEBUG level
    pub log_file: Option<PathBuf>,
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_log_file<P: AsRef<Path>>(mut self, path: Option<P>) -> Self {
        self.log_file = path.map(|p| p.as_ref().to_path_buf());
        self
    }

    /// Level used on stderr when `RUST_LOG` is not set.
    pub fn stderr_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        }
    }
}

/// Install the global subscriber.
///
/// The returned guard must stay alive for the life of the program; dropping it
/// flushes the file writer.
pub fn init_logging(program_name: &str, config: LogConfig) -> Result<Option<WorkerGuard>> {
    let stderr_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.stderr_level().to_string()));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(stderr_filter);

    let mut file_warning = None;
    let (file_layer, guard) = match config.log_file.as_deref() {
        Some(path) => match open_log_file(path) {
            Ok(file) => {
                let (writer, guard) = tracing_appender::non_blocking(file);
                let layer = fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_filter(LevelFilter::DEBUG);
                (Some(layer), Some(guard))
            }
            Err(e) => {
                file_warning = Some(format!("{:#}", e));
                (None, None)
            }
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    if let Some(warning) = file_warning {
        tracing::warn!(error = %warning, "⚠️ Could not open log file, logging to stderr only");
    }

    tracing::debug!(
        program = program_name,
        log_file = ?config.log_file,
        verbose = config.verbose,
        "Logging system initialized"
    );

    Ok(guard)
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))
}

/// Record an external tool invocation (ffmpeg, ffprobe).
pub fn log_external_tool(
    tool_name: &str,
    args: &[String],
    output: &str,
    exit_code: Option<i32>,
    duration: Duration,
) {
    let command = format!("{} {}", tool_name, args.join(" "));

    match exit_code {
        Some(0) => {
            tracing::debug!(
                tool = tool_name,
                command = %command,
                duration_secs = duration.as_secs_f64(),
                exit_code = 0,
                "External tool completed successfully"
            );
        }
        Some(code) => {
            tracing::debug!(
                tool = tool_name,
                command = %command,
                duration_secs = duration.as_secs_f64(),
                exit_code = code,
                output = %output,
                "External tool failed"
            );
        }
        None => {
            tracing::debug!(
                tool = tool_name,
                command = %command,
                duration_secs = duration.as_secs_f64(),
                output = %output,
                "External tool terminated without exit code"
            );
        }
    }
}
