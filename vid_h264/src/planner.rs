//! Conversion planner
//!
//! Builds the encoder invocation for one file: profile, rate control and
//! stream mapping. Every video and audio stream is mapped in input order,
//! audio is stream-copied, subtitles follow the target container:
//!
//! | container | subtitles                                        |
//! |-----------|--------------------------------------------------|
//! | mkv       | all copied                                       |
//! | mp4, mov  | text kept as `mov_text`, bitmap dropped (warned) |
//! | others    | dropped (`-sn`, warned)                          |

use std::path::{Path, PathBuf};
use tracing::warn;

use shared_utils::codecs::{subtitle_kind, SubtitleKind};
use shared_utils::common_utils::{get_extension_lowercase, temp_path_for};
use shared_utils::ffprobe::{MediaInfo, StreamInfo};
use shared_utils::gpu_accel::{EncoderProfile, RateControl};

use crate::config::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioMode {
    Copy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleMode {
    /// Every subtitle stream copied as-is
    CopyAll,
    /// Text subtitles re-muxed as `mov_text`
    CopyCompatible,
    Drop,
}

#[derive(Debug, Clone)]
pub struct ConversionPlan {
    pub source: PathBuf,
    pub temp_output: PathBuf,
    pub profile: EncoderProfile,
    pub rate_control: RateControl,
    pub audio_mode: AudioMode,
    pub subtitle_mode: SubtitleMode,
    pub video_streams: Vec<u32>,
    pub audio_streams: Vec<u32>,
    pub subtitle_streams: Vec<u32>,
    /// Subtitle streams left out, already warned about
    pub dropped_subtitles: Vec<StreamInfo>,
    /// `-threads` for the encoder; `None` lets ffmpeg decide
    pub encoder_threads: Option<usize>,
}

impl ConversionPlan {
    pub fn video_bitrate_target_kbps(&self) -> u32 {
        match self.rate_control {
            RateControl::Bitrate { target_kbps, .. } => target_kbps,
            RateControl::ConstantQuality { max_kbps, .. } => max_kbps,
        }
    }

    pub fn buffer_size_kbps(&self) -> u32 {
        match self.rate_control {
            RateControl::Bitrate { bufsize_kbps, .. }
            | RateControl::ConstantQuality { bufsize_kbps, .. } => bufsize_kbps,
        }
    }

    /// Full ffmpeg argument list; the temp output path is always last.
    pub fn ffmpeg_args(&self) -> Vec<String> {
        let spec = self.profile.spec();
        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-y"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        args.extend(spec.hwaccel_args.iter().map(|s| s.to_string()));
        args.push("-i".to_string());
        args.push(self.source.to_string_lossy().into_owned());

        for index in self
            .video_streams
            .iter()
            .chain(&self.audio_streams)
            .chain(&self.subtitle_streams)
        {
            args.push("-map".to_string());
            args.push(format!("0:{}", index));
        }

        args.push("-c:v".to_string());
        args.push(spec.encoder.to_string());
        args.extend(spec.extra_args.iter().map(|s| s.to_string()));
        args.push("-profile:v".to_string());
        args.push("high".to_string());
        if let Some(filter) = spec.video_filter {
            args.push("-vf".to_string());
            args.push(filter.to_string());
        }
        if spec.sets_pix_fmt {
            args.push("-pix_fmt".to_string());
            args.push("yuv420p".to_string());
        }
        args.extend(self.rate_control.args());
        if let Some(threads) = self.encoder_threads {
            args.push("-threads".to_string());
            args.push(threads.to_string());
        }

        match self.audio_mode {
            AudioMode::Copy => {
                args.push("-c:a".to_string());
                args.push("copy".to_string());
            }
        }

        match self.subtitle_mode {
            SubtitleMode::CopyAll => {
                args.push("-c:s".to_string());
                args.push("copy".to_string());
            }
            SubtitleMode::CopyCompatible => {
                args.push("-c:s".to_string());
                args.push("mov_text".to_string());
            }
            SubtitleMode::Drop => args.push("-sn".to_string()),
        }

        args.push("-max_muxing_queue_size".to_string());
        args.push("1024".to_string());
        args.push(self.temp_output.to_string_lossy().into_owned());
        args
    }
}

pub fn plan(
    path: &Path,
    info: &MediaInfo,
    settings: &Settings,
    profile: EncoderProfile,
    crf_override: Option<u8>,
) -> ConversionPlan {
    let (subtitle_mode, kept, dropped) = select_subtitles(path, &info.subtitle_streams);

    for stream in &dropped {
        warn!(
            path = %path.display(),
            stream = stream.index,
            codec = %stream.codec_name,
            "⚠️ Dropping subtitle stream incompatible with the container"
        );
    }

    ConversionPlan {
        source: path.to_path_buf(),
        temp_output: temp_path_for(path),
        profile,
        rate_control: settings.rate_control(profile, crf_override),
        audio_mode: AudioMode::Copy,
        subtitle_mode,
        video_streams: info.video_streams.iter().map(|s| s.index).collect(),
        audio_streams: info.audio_streams.iter().map(|s| s.index).collect(),
        subtitle_streams: kept.iter().map(|s| s.index).collect(),
        dropped_subtitles: dropped,
        encoder_threads: None,
    }
}

fn select_subtitles(
    path: &Path,
    subtitles: &[StreamInfo],
) -> (SubtitleMode, Vec<StreamInfo>, Vec<StreamInfo>) {
    match get_extension_lowercase(path).as_str() {
        "mkv" => (SubtitleMode::CopyAll, subtitles.to_vec(), Vec::new()),
        "mp4" | "mov" => {
            let (kept, dropped): (Vec<StreamInfo>, Vec<StreamInfo>) = subtitles
                .iter()
                .cloned()
                .partition(|s| subtitle_kind(&s.codec_name) == SubtitleKind::Text);
            let mode = if kept.is_empty() {
                SubtitleMode::Drop
            } else {
                SubtitleMode::CopyCompatible
            };
            (mode, kept, dropped)
        }
        _ => (SubtitleMode::Drop, Vec::new(), subtitles.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(index: u32, codec: &str) -> StreamInfo {
        StreamInfo {
            index,
            codec_name: codec.to_string(),
        }
    }

    fn media_with_subs(subs: Vec<StreamInfo>) -> MediaInfo {
        MediaInfo {
            container_format: "matroska,webm".to_string(),
            video_codec: "hevc".to_string(),
            bitrate_kbps: 5000,
            duration_secs: 100.0,
            size_bytes: 62_500_000,
            video_streams: vec![stream(0, "hevc")],
            audio_streams: vec![stream(1, "aac"), stream(2, "ac3")],
            subtitle_streams: subs,
        }
    }

    fn mixed_subs() -> Vec<StreamInfo> {
        vec![stream(3, "subrip"), stream(4, "hdmv_pgs_subtitle")]
    }

    fn position(args: &[String], flag: &str) -> usize {
        args.iter().position(|a| a == flag).unwrap()
    }

    #[test]
    fn test_mkv_copies_every_subtitle() {
        let plan = plan(
            Path::new("/m/show.mkv"),
            &media_with_subs(mixed_subs()),
            &Settings::default(),
            EncoderProfile::Nvidia,
            None,
        );
        assert_eq!(plan.subtitle_mode, SubtitleMode::CopyAll);
        assert_eq!(plan.subtitle_streams, vec![3, 4]);
        assert!(plan.dropped_subtitles.is_empty());

        let args = plan.ffmpeg_args();
        let cs = position(&args, "-c:s");
        assert_eq!(args[cs + 1], "copy");
    }

    #[test]
    fn test_mp4_keeps_text_drops_bitmap() {
        let plan = plan(
            Path::new("/m/show.mp4"),
            &media_with_subs(mixed_subs()),
            &Settings::default(),
            EncoderProfile::Nvidia,
            None,
        );
        assert_eq!(plan.subtitle_mode, SubtitleMode::CopyCompatible);
        assert_eq!(plan.subtitle_streams, vec![3]);
        assert_eq!(plan.dropped_subtitles, vec![stream(4, "hdmv_pgs_subtitle")]);

        let args = plan.ffmpeg_args();
        assert_eq!(args[position(&args, "-c:s") + 1], "mov_text");
        assert!(!args.contains(&"0:4".to_string()));
    }

    #[test]
    fn test_mp4_with_only_bitmap_drops_all() {
        let plan = plan(
            Path::new("/m/show.mov"),
            &media_with_subs(vec![stream(3, "dvd_subtitle")]),
            &Settings::default(),
            EncoderProfile::Intel,
            None,
        );
        assert_eq!(plan.subtitle_mode, SubtitleMode::Drop);
        assert!(plan.ffmpeg_args().contains(&"-sn".to_string()));
    }

    #[test]
    fn test_other_containers_drop_subtitles() {
        let plan = plan(
            Path::new("/m/show.avi"),
            &media_with_subs(vec![stream(3, "subrip")]),
            &Settings::default(),
            EncoderProfile::AmdGpu,
            None,
        );
        assert_eq!(plan.subtitle_mode, SubtitleMode::Drop);
        assert_eq!(plan.dropped_subtitles.len(), 1);
    }

    #[test]
    fn test_audio_streams_mapped_in_order_and_copied() {
        let plan = plan(
            Path::new("/m/show.mkv"),
            &media_with_subs(Vec::new()),
            &Settings::default(),
            EncoderProfile::Nvidia,
            None,
        );
        let args = plan.ffmpeg_args();
        let maps: Vec<&String> = args
            .iter()
            .enumerate()
            .filter(|(i, _)| *i > 0 && args[i - 1] == "-map")
            .map(|(_, a)| a)
            .collect();
        assert_eq!(maps, vec!["0:0", "0:1", "0:2"]);
        assert_eq!(args[position(&args, "-c:a") + 1], "copy");
    }

    #[test]
    fn test_nvidia_command_shape() {
        let plan = plan(
            Path::new("/m/show.mkv"),
            &media_with_subs(Vec::new()),
            &Settings::default(),
            EncoderProfile::Nvidia,
            Some(18),
        );
        let args = plan.ffmpeg_args();

        assert_eq!(&args[..4], &["-hide_banner", "-loglevel", "error", "-y"]);
        assert!(position(&args, "-hwaccel") < position(&args, "-i"));
        assert_eq!(args[position(&args, "-c:v") + 1], "h264_nvenc");
        assert_eq!(args[position(&args, "-preset") + 1], "p4");
        assert_eq!(args[position(&args, "-profile:v") + 1], "high");
        assert_eq!(args[position(&args, "-pix_fmt") + 1], "yuv420p");
        assert_eq!(args[position(&args, "-b:v") + 1], "3000k");
        assert_eq!(args[position(&args, "-maxrate") + 1], "3300k");
        assert_eq!(args[position(&args, "-bufsize") + 1], "6000k");
        assert!(!args.contains(&"-crf".to_string()));
        assert_eq!(args[position(&args, "-max_muxing_queue_size") + 1], "1024");
        assert_eq!(args.last().unwrap(), "/m/show.__transcoding__.mkv");
    }

    #[test]
    fn test_vaapi_uses_upload_filter() {
        let plan = plan(
            Path::new("/m/show.mkv"),
            &media_with_subs(Vec::new()),
            &Settings::default(),
            EncoderProfile::Vaapi,
            None,
        );
        let args = plan.ffmpeg_args();
        assert!(position(&args, "-vaapi_device") < position(&args, "-i"));
        assert_eq!(args[position(&args, "-vf") + 1], "format=nv12,hwupload");
        assert!(!args.contains(&"-pix_fmt".to_string()));
    }

    #[test]
    fn test_cpu_uses_crf_with_cap() {
        let plan = plan(
            Path::new("/m/show.mkv"),
            &media_with_subs(Vec::new()),
            &Settings::default(),
            EncoderProfile::Cpu,
            Some(20),
        );
        let args = plan.ffmpeg_args();
        assert_eq!(args[position(&args, "-c:v") + 1], "libx264");
        assert_eq!(args[position(&args, "-crf") + 1], "20");
        assert_eq!(args[position(&args, "-maxrate") + 1], "3300k");
        assert!(!args.contains(&"-b:v".to_string()));
        assert_eq!(plan.buffer_size_kbps(), 6000);
    }

    #[test]
    fn test_plan_accessors() {
        let plan = plan(
            Path::new("/m/show.ts"),
            &media_with_subs(Vec::new()),
            &Settings::default(),
            EncoderProfile::Nvidia,
            None,
        );
        assert_eq!(plan.video_bitrate_target_kbps(), 3000);
        assert_eq!(plan.buffer_size_kbps(), 6000);
        assert_eq!(plan.temp_output, PathBuf::from("/m/show.__transcoding__.ts"));
    }
}
