//! Scripted ffmpeg / ffprobe stand-in for tests
//!
//! Media files in tests are small text files of `key=value;` directives:
//!
//! ```text
//! codec=hevc;bitrate=5000;audio=2;audio_br=640;subs=subrip,hdmv_pgs_subtitle
//! ```
//!
//! The fake ffprobe reports those facts as ffprobe JSON: `bitrate` is the
//! video stream's rate, each audio stream carries `audio_br` (default 128),
//! and the container rate is their sum. `stream_rates=none` leaves only the
//! container rate, as many muxers do.
//!
//! The fake ffmpeg reads the directives of its `-i` input and writes an H.264
//! "encode" of it to the last argument, keeping the audio and `stream_rates`
//! directives. `encode=<mode>` on the source changes what the encoder does:
//! `fail`, `empty`, `none`, `corrupt`, `hevc`, `drop_audio`, `hang`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use shared_utils::ffmpeg_process::{CommandOutput, CommandRunner, ProcessError};

pub const FFMPEG: &str = "/fake/bin/ffmpeg";
pub const FFPROBE: &str = "/fake/bin/ffprobe";

#[derive(Default)]
pub struct FakeMediaRunner {
    calls: Mutex<Vec<(PathBuf, Vec<String>)>>,
}

impl FakeMediaRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoder invocations so far (excluding `-encoders` queries).
    pub fn encode_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(program, args)| {
                program.ends_with("ffmpeg") && !args.iter().any(|a| a == "-encoders")
            })
            .count()
    }

    pub fn last_encode_args(&self) -> Option<Vec<String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(program, args)| {
                program.ends_with("ffmpeg") && !args.iter().any(|a| a == "-encoders")
            })
            .map(|(_, args)| args.clone())
    }

    fn probe(&self, args: &[String]) -> CommandOutput {
        let Some(path) = args.last() else {
            return failure("no input");
        };
        let directives = match read_directives(Path::new(path)) {
            Some(d) => d,
            None => return failure("No such file or directory"),
        };
        if directives.get("probe").map(String::as_str) == Some("fail") {
            return failure("Invalid data found when processing input");
        }

        let video_kbps = count(&directives, "bitrate", 3000);
        let audio_kbps = count(&directives, "audio_br", 128);
        let audio_count = count(&directives, "audio", 1);
        let stream_rates = directives.get("stream_rates").map(String::as_str) != Some("none");
        let rate = |kbps: u64| {
            if stream_rates {
                serde_json::Value::String((kbps * 1000).to_string())
            } else {
                serde_json::Value::Null
            }
        };

        let mut streams = Vec::new();
        let mut index = 0u32;
        if directives.get("video").map(String::as_str) != Some("none") {
            let codec = directives.get("codec").cloned().unwrap_or_else(|| "h264".to_string());
            streams.push(serde_json::json!({
                "index": index, "codec_type": "video", "codec_name": codec, "bit_rate": rate(video_kbps)
            }));
            index += 1;
        }
        for _ in 0..audio_count {
            streams.push(serde_json::json!({
                "index": index, "codec_type": "audio", "codec_name": "ac3", "bit_rate": rate(audio_kbps)
            }));
            index += 1;
        }
        for sub in list(&directives, "subs") {
            streams.push(serde_json::json!({"index": index, "codec_type": "subtitle", "codec_name": sub}));
            index += 1;
        }

        let container_kbps = video_kbps + audio_kbps * audio_count;
        let json = serde_json::json!({
            "streams": streams,
            "format": {
                "format_name": "matroska,webm",
                "duration": "60.000000",
                "bit_rate": (container_kbps * 1000).to_string(),
            }
        });
        success(json.to_string())
    }

    fn encode(&self, args: &[String]) -> Result<CommandOutput, ProcessError> {
        if args.iter().any(|a| a == "-encoders") {
            return Ok(success(
                " V....D h264_nvenc  NVENC\n V....D h264_amf  AMF\n V....D h264_qsv  QSV\n V....D h264_vaapi  VAAPI\n V....D libx264  x264\n"
                    .to_string(),
            ));
        }

        let source = args
            .iter()
            .position(|a| a == "-i")
            .and_then(|i| args.get(i + 1))
            .map(PathBuf::from);
        let (Some(source), Some(output)) = (source, args.last().map(PathBuf::from)) else {
            return Ok(failure("bad arguments"));
        };
        let Some(directives) = read_directives(&source) else {
            return Ok(failure("No such file or directory"));
        };

        let audio = count(&directives, "audio", 1);
        let audio_br = count(&directives, "audio_br", 128);
        let muxer = match directives.get("stream_rates") {
            Some(rates) => format!(";stream_rates={}", rates),
            None => String::new(),
        };
        let mode = directives.get("encode").map(String::as_str).unwrap_or("ok");
        let write = |content: String| fs::write(&output, content).is_ok();

        let ok = match mode {
            "fail" => {
                write("partial".to_string());
                return Ok(CommandOutput {
                    exit_code: Some(1),
                    stderr: "[h264_nvenc @ 0x1] Error: No capable devices found".to_string(),
                    ..Default::default()
                });
            }
            "hang" => {
                write("partial".to_string());
                return Err(ProcessError::Timeout {
                    tool: "ffmpeg".to_string(),
                    timeout: Duration::from_secs(1),
                });
            }
            "none" => true,
            "empty" => write(String::new()),
            "corrupt" => write("probe=fail".to_string()),
            "hevc" => write(format!("codec=hevc;bitrate=3000;audio={};audio_br={}{}", audio, audio_br, muxer)),
            "drop_audio" => write("codec=h264;bitrate=3000;audio=0".to_string()),
            // video capped at the target, audio copied as-is
            _ => write(format!("codec=h264;bitrate=3000;audio={};audio_br={}{}", audio, audio_br, muxer)),
        };
        if ok {
            Ok(success(String::new()))
        } else {
            Ok(failure("could not write output"))
        }
    }
}

impl CommandRunner for FakeMediaRunner {
    fn run(&self, program: &Path, args: &[String], _: Duration) -> Result<CommandOutput, ProcessError> {
        self.calls
            .lock()
            .unwrap()
            .push((program.to_path_buf(), args.to_vec()));

        if program.ends_with("ffprobe") {
            Ok(self.probe(args))
        } else {
            self.encode(args)
        }
    }
}

/// Write a fake media file.
pub fn media_file(dir: &Path, name: &str, directives: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, directives).unwrap();
    path
}

fn read_directives(path: &Path) -> Option<HashMap<String, String>> {
    let content = fs::read_to_string(path).ok()?;
    Some(
        content
            .split(';')
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect(),
    )
}

fn count(directives: &HashMap<String, String>, key: &str, default: u64) -> u64 {
    directives
        .get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn list(directives: &HashMap<String, String>, key: &str) -> Vec<String> {
    directives
        .get(key)
        .map(|v| v.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

fn success(stdout: String) -> CommandOutput {
    CommandOutput {
        exit_code: Some(0),
        stdout,
        ..Default::default()
    }
}

fn failure(stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_code: Some(1),
        stderr: stderr.to_string(),
        ..Default::default()
    }
}
