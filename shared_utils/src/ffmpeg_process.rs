//! External process runner for ffmpeg / ffprobe
//!
//! Every subprocess the normalizer launches goes through [`CommandRunner`], a
//! single-method capability: run a program with arguments under a deadline
//! and hand back exit code, stdout and stderr. The decision logic never sees
//! `std::process` directly, so tests can swap in a scripted runner.
//!
//! ## Pipe deadlock
//!
//! ffmpeg can emit far more than 64KB on stderr. If only one pipe is drained
//! the child blocks on the other and never exits. [`SystemRunner`] drains both
//! pipes on dedicated threads while the calling thread polls for exit.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

use crate::logging::log_external_tool;

/// Poll interval while waiting for a child to exit.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Captured result of a finished subprocess.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("{tool} exceeded {timeout:?} and was killed")]
    Timeout { tool: String, timeout: Duration },

    #[error("failed waiting for {tool}: {source}")]
    Wait {
        tool: String,
        #[source]
        source: io::Error,
    },
}

/// Capability interface for launching external tools.
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        program: &Path,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, ProcessError>;
}

/// Real runner backed by `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(
        &self,
        program: &Path,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, ProcessError> {
        let tool = program.display().to_string();
        let start = Instant::now();

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // own process group: a terminal Ctrl+C reaches only us, and in-flight
        // encodes keep running until we decide to stop
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                tool: tool.clone(),
                source,
            })?;

        let stdout_thread = drain(child.stdout.take());
        let stderr_thread = drain(child.stderr.take());

        let status = match wait_with_deadline(&mut child, timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                warn!(tool = %tool, timeout_secs = timeout.as_secs(), "⏱️ Deadline hit, killing process");
                let _ = child.kill();
                let _ = child.wait();
                let _ = join(stdout_thread);
                let _ = join(stderr_thread);
                return Err(ProcessError::Timeout { tool, timeout });
            }
            Err(source) => {
                let _ = child.kill();
                return Err(ProcessError::Wait { tool, source });
            }
        };

        let output = CommandOutput {
            exit_code: status.code(),
            stdout: join(stdout_thread),
            stderr: join(stderr_thread),
            duration: start.elapsed(),
        };

        log_external_tool(&tool, args, &output.stderr, output.exit_code, output.duration);
        Ok(output)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut reader| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = reader.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join(handle: Option<JoinHandle<String>>) -> String {
    handle
        .map(|t| t.join().unwrap_or_default())
        .unwrap_or_default()
}

/// Returns `Ok(None)` when the deadline passed before the child exited.
///
/// A timeout too large to represent as an `Instant` means no deadline.
fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> io::Result<Option<std::process::ExitStatus>> {
    let deadline = Instant::now().checked_add(timeout);
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Pick the most useful line out of ffmpeg's stderr for a one-line report.
///
/// Prefers the last line mentioning "error"; otherwise the last non-progress
/// line; otherwise a fixed placeholder.
pub fn format_ffmpeg_error(stderr: &str) -> String {
    if let Some(error_line) = stderr
        .lines()
        .rev()
        .find(|line| line.contains("Error") || line.contains("error"))
    {
        return error_line.trim().to_string();
    }

    stderr
        .lines()
        .rev()
        .find(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty()
                && !trimmed.starts_with("frame=")
                && !trimmed.starts_with("fps=")
                && !trimmed.starts_with("size=")
        })
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "Unknown FFmpeg error".to_string())
}

/// Render a command line for log output.
pub fn command_line(program: &Path, args: &[String]) -> String {
    let mut line = program.display().to_string();
    for arg in args {
        line.push(' ');
        if arg.contains(' ') {
            line.push('"');
            line.push_str(arg);
            line.push('"');
        } else {
            line.push_str(arg);
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_ffmpeg_error_with_error_line() {
        let stderr = "frame=  10 fps=0.0\n[h264_nvenc @ 0x1] Error: No capable devices found\nConversion failed!";
        assert_eq!(
            format_ffmpeg_error(stderr),
            "[h264_nvenc @ 0x1] Error: No capable devices found"
        );
    }

    #[test]
    fn test_format_ffmpeg_error_no_error_line() {
        let stderr = "Input #0, matroska\nframe=  100 fps=30\nConversion aborted";
        assert_eq!(format_ffmpeg_error(stderr), "Conversion aborted");
    }

    #[test]
    fn test_format_ffmpeg_error_empty() {
        assert_eq!(format_ffmpeg_error(""), "Unknown FFmpeg error");
        assert_eq!(format_ffmpeg_error("frame=1\nfps=2\n"), "Unknown FFmpeg error");
    }

    #[test]
    fn test_command_line_quotes_spaces() {
        let line = command_line(
            Path::new("ffmpeg"),
            &["-i".to_string(), "/media/my movie.mkv".to_string()],
        );
        assert_eq!(line, "ffmpeg -i \"/media/my movie.mkv\"");
    }

    #[test]
    fn test_command_output_success() {
        let ok = CommandOutput {
            exit_code: Some(0),
            ..Default::default()
        };
        let killed = CommandOutput::default();
        assert!(ok.success());
        assert!(!killed.success());
    }

    #[test]
    fn test_system_runner_missing_binary() {
        let result = SystemRunner.run(
            &PathBuf::from("nonexistent_command_xyz"),
            &[],
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(ProcessError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_captures_stdout() {
        let output = SystemRunner
            .run(
                Path::new("echo"),
                &["hello".to_string(), "world".to_string()],
                Duration::from_secs(5),
            )
            .unwrap();
        assert!(output.success());
        assert!(output.stdout.contains("hello world"));
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_kills_on_timeout() {
        let start = Instant::now();
        let result = SystemRunner.run(
            Path::new("sleep"),
            &["5".to_string()],
            Duration::from_millis(200),
        );
        assert!(matches!(result, Err(ProcessError::Timeout { .. })));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_unbounded_timeout() {
        let output = SystemRunner
            .run(Path::new("true"), &[], Duration::MAX)
            .unwrap();
        assert!(output.success());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_child_leads_its_own_process_group() {
        // field 5 of /proc/<pid>/stat is the process group id
        let output = SystemRunner
            .run(
                Path::new("sh"),
                &[
                    "-c".to_string(),
                    "echo $$ $(cut -d' ' -f5 /proc/$$/stat)".to_string(),
                ],
                Duration::from_secs(5),
            )
            .unwrap();
        let ids: Vec<&str> = output.stdout.split_whitespace().collect();
        assert_eq!(ids.len(), 2, "unexpected output: {:?}", output.stdout);
        assert_eq!(ids[0], ids[1]);
        assert_ne!(ids[1], std::process::id().to_string());
    }
}
