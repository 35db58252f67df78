//! Conversion executor
//!
//! Runs one [`ConversionPlan`]: encode into the temp path, validate the
//! result, then rename it over the source. The source is only ever touched
//! by that final rename, so an interrupted run leaves it intact plus at most
//! one stray temp file, which the next attempt removes first.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use shared_utils::checkpoint::verify_output_integrity;
use shared_utils::codecs::is_h264;
use shared_utils::errors::ConversionError;
use shared_utils::ffmpeg_process::{command_line, format_ffmpeg_error, CommandRunner};
use shared_utils::ffprobe::Prober;

use crate::planner::ConversionPlan;

pub const REPLACE_ATTEMPTS: u32 = 12;
pub const REPLACE_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionOutcome {
    pub original_bytes: u64,
    pub new_bytes: u64,
}

pub type ConversionResult = Result<ConversionOutcome, ConversionError>;

pub struct Executor<'a> {
    runner: &'a dyn CommandRunner,
    ffmpeg: PathBuf,
    prober: Prober<'a>,
    encode_timeout: Duration,
    replace_attempts: u32,
    replace_delay: Duration,
}

impl<'a> Executor<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        ffmpeg: impl Into<PathBuf>,
        ffprobe: impl Into<PathBuf>,
        probe_timeout: Duration,
        encode_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            ffmpeg: ffmpeg.into(),
            prober: Prober::new(runner, ffprobe, probe_timeout),
            encode_timeout,
            replace_attempts: REPLACE_ATTEMPTS,
            replace_delay: REPLACE_DELAY,
        }
    }

    pub fn with_replace_policy(mut self, attempts: u32, delay: Duration) -> Self {
        self.replace_attempts = attempts.max(1);
        self.replace_delay = delay;
        self
    }

    pub fn execute(&self, plan: &ConversionPlan) -> ConversionResult {
        let mut state = AttemptState::Pending;
        transition(&plan.source, &mut state, AttemptState::Pending);

        let result = self.run_attempt(plan, &mut state);
        match &result {
            Ok(_) => transition(&plan.source, &mut state, AttemptState::Succeeded),
            Err(_) => transition(&plan.source, &mut state, AttemptState::Failed),
        }
        result
    }

    fn run_attempt(&self, plan: &ConversionPlan, state: &mut AttemptState) -> ConversionResult {
        let original_bytes = fs::metadata(&plan.source)
            .map_err(|e| ConversionError::EncodeFailed(format!("cannot read source: {}", e)))?
            .len();

        remove_stale_temp(&plan.temp_output)?;

        transition(&plan.source, state, AttemptState::Running);
        let args = plan.ffmpeg_args();
        debug!(command = %command_line(&self.ffmpeg, &args), "Encoding");

        let output = match self.runner.run(&self.ffmpeg, &args, self.encode_timeout) {
            Ok(output) => output,
            Err(e) => {
                discard_temp(&plan.temp_output);
                return Err(ConversionError::EncodeFailed(e.to_string()));
            }
        };
        if !output.success() {
            discard_temp(&plan.temp_output);
            return Err(ConversionError::EncodeFailed(format!(
                "exit code {:?}: {}",
                output.exit_code,
                format_ffmpeg_error(&output.stderr)
            )));
        }

        let new_bytes = match verify_output_integrity(&plan.temp_output, 1) {
            Ok(size) => size,
            Err(reason) => {
                discard_temp(&plan.temp_output);
                return Err(ConversionError::EncodeFailed(reason));
            }
        };

        if let Err(reason) = self.validate_output(plan) {
            discard_temp(&plan.temp_output);
            return Err(ConversionError::ValidationFailed(reason));
        }

        self.replace_source(plan)?;

        info!(
            path = %plan.source.display(),
            original_bytes,
            new_bytes,
            "✅ Converted"
        );
        Ok(ConversionOutcome {
            original_bytes,
            new_bytes,
        })
    }

    /// The output must open, be H.264 and carry every mapped audio stream.
    fn validate_output(&self, plan: &ConversionPlan) -> Result<(), String> {
        let info = self
            .prober
            .probe(&plan.temp_output)
            .map_err(|e| e.to_string())?;

        if !is_h264(&info.video_codec) {
            return Err(format!("output video codec is '{}', expected h264", info.video_codec));
        }
        if info.audio_streams.len() != plan.audio_streams.len() {
            return Err(format!(
                "output has {} audio stream(s), source has {}",
                info.audio_streams.len(),
                plan.audio_streams.len()
            ));
        }
        Ok(())
    }

    fn replace_source(&self, plan: &ConversionPlan) -> Result<(), ConversionError> {
        let mut last_error: Option<io::Error> = None;

        for attempt in 1..=self.replace_attempts {
            match fs::rename(&plan.temp_output, &plan.source) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(ConversionError::ReplaceFailed {
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    debug!(
                        path = %plan.source.display(),
                        attempt,
                        error = %e,
                        "Replace failed, retrying"
                    );
                    last_error = Some(e);
                    if attempt < self.replace_attempts {
                        thread::sleep(self.replace_delay);
                    }
                }
            }
        }

        discard_temp(&plan.temp_output);
        Err(ConversionError::ReplaceFailed {
            attempts: self.replace_attempts,
            reason: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string()),
        })
    }
}

fn transition(path: &Path, state: &mut AttemptState, next: AttemptState) {
    debug!(path = %path.display(), from = ?*state, to = ?next, "Attempt state");
    *state = next;
}

fn remove_stale_temp(temp: &Path) -> Result<(), ConversionError> {
    match fs::remove_file(temp) {
        Ok(()) => {
            warn!(path = %temp.display(), "🧹 Removed stale temp file from an earlier attempt");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ConversionError::TempFileCollision {
            path: temp.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

fn discard_temp(temp: &Path) {
    match fs::remove_file(temp) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %temp.display(), error = %e, "⚠️ Could not remove temp file"),
    }
}
