//! Eligibility classifier
//!
//! Pure mapping from probed metadata and thresholds to Skip / Convert.
//! Rules, first match wins:
//!
//! 1. H.264 with bitrate in `[TARGET_BR - TOLERANCE, MAX_BR]` → Skip (already compliant)
//! 2. H.264 above `MAX_BR` → Convert (bitrate exceeds max)
//! 3. Not H.264 → Convert (codec mismatch), whatever the bitrate
//! 4. H.264 at or below `TARGET_BR - TOLERANCE` → Skip (never raise bitrate)
//! 5. Anything else → Skip (unclassified); unreachable for valid settings
//!
//! Both band edges sit on the Skip side so borderline files never flip
//! between runs.

use serde::Serialize;
use std::fmt;
use std::path::Path;

use shared_utils::codecs::is_h264;
use shared_utils::common_utils::{get_extension_lowercase, is_h264_container};
use shared_utils::ffprobe::MediaInfo;

use crate::config::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Action {
    Skip,
    Convert,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Reason {
    AlreadyCompliant,
    BitrateExceedsMax,
    CodecMismatch,
    BelowTargetAlready,
    Unclassified,
    /// Container that is not re-encoded in place; carries the extension
    IncompatibleContainer(String),
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::AlreadyCompliant => f.write_str("already_compliant"),
            Reason::BitrateExceedsMax => f.write_str("bitrate_exceeds_max"),
            Reason::CodecMismatch => f.write_str("codec_mismatch"),
            Reason::BelowTargetAlready => f.write_str("below_target_already"),
            Reason::Unclassified => f.write_str("unclassified"),
            Reason::IncompatibleContainer(ext) => write!(f, "container_not_h264_ok(.{})", ext),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub action: Action,
    pub reason: Reason,
}

impl Verdict {
    pub fn skip(reason: Reason) -> Self {
        Self {
            action: Action::Skip,
            reason,
        }
    }

    pub fn convert(reason: Reason) -> Self {
        Self {
            action: Action::Convert,
            reason,
        }
    }

    pub fn is_convert(&self) -> bool {
        self.action == Action::Convert
    }
}

pub fn classify(info: &MediaInfo, settings: &Settings) -> Verdict {
    let h264 = is_h264(&info.video_codec);
    let bitrate = info.bitrate_kbps;
    let lower = u64::from(settings.lower_bound());
    let max = u64::from(settings.max_br);

    if h264 && bitrate >= lower && bitrate <= max {
        return Verdict::skip(Reason::AlreadyCompliant);
    }
    if h264 && bitrate > max {
        return Verdict::convert(Reason::BitrateExceedsMax);
    }
    if !h264 {
        return Verdict::convert(Reason::CodecMismatch);
    }
    if bitrate <= lower {
        return Verdict::skip(Reason::BelowTargetAlready);
    }
    Verdict::skip(Reason::Unclassified)
}

/// Pre-probe check: containers outside the in-place set are skipped.
pub fn container_verdict(path: &Path) -> Option<Verdict> {
    if is_h264_container(path) {
        None
    } else {
        Some(Verdict::skip(Reason::IncompatibleContainer(
            get_extension_lowercase(path),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn media(codec: &str, bitrate_kbps: u64) -> MediaInfo {
        MediaInfo {
            container_format: "matroska,webm".to_string(),
            video_codec: codec.to_string(),
            bitrate_kbps,
            duration_secs: 60.0,
            size_bytes: bitrate_kbps * 1000 * 60 / 8,
            video_streams: Vec::new(),
            audio_streams: Vec::new(),
            subtitle_streams: Vec::new(),
        }
    }

    fn settings() -> Settings {
        Settings {
            target_br: 3000,
            max_br: 3300,
            bitrate_tolerance: 300,
            ..Settings::default()
        }
    }

    #[test]
    fn test_h264_over_max_converts() {
        let verdict = classify(&media("h264", 3500), &settings());
        assert_eq!(verdict, Verdict::convert(Reason::BitrateExceedsMax));
    }

    #[test]
    fn test_codec_rule_dominates_low_bitrate() {
        let verdict = classify(&media("hevc", 2000), &settings());
        assert_eq!(verdict, Verdict::convert(Reason::CodecMismatch));
    }

    #[test]
    fn test_h264_in_band_skips() {
        let verdict = classify(&media("h264", 2750), &settings());
        assert_eq!(verdict, Verdict::skip(Reason::AlreadyCompliant));
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        let s = settings();
        assert_eq!(classify(&media("h264", 3300), &s), Verdict::skip(Reason::AlreadyCompliant));
        assert_eq!(classify(&media("h264", 3301), &s), Verdict::convert(Reason::BitrateExceedsMax));
        assert_eq!(classify(&media("h264", 2700), &s), Verdict::skip(Reason::AlreadyCompliant));
        assert_eq!(classify(&media("h264", 2699), &s), Verdict::skip(Reason::BelowTargetAlready));
    }

    #[test]
    fn test_codec_aliases() {
        let s = settings();
        assert_eq!(classify(&media("AVC", 3000), &s).action, Action::Skip);
        assert_eq!(classify(&media("", 3000), &s), Verdict::convert(Reason::CodecMismatch));
    }

    #[test]
    fn test_converted_output_with_surround_audio_is_compliant() {
        let json = r#"{
            "streams": [
                {"index": 0, "codec_type": "video", "codec_name": "h264", "bit_rate": "3000000"},
                {"index": 1, "codec_type": "audio", "codec_name": "ac3", "bit_rate": "640000"}
            ],
            "format": {"format_name": "matroska,webm", "duration": "60.0", "bit_rate": "3640000"}
        }"#;
        let info = shared_utils::ffprobe::parse_probe_output(Path::new("out.mkv"), json, 1).unwrap();
        assert_eq!(classify(&info, &Settings::default()), Verdict::skip(Reason::AlreadyCompliant));
    }

    #[test]
    fn test_container_verdict() {
        assert!(container_verdict(Path::new("/m/a.mkv")).is_none());
        assert!(container_verdict(Path::new("/m/a.TS")).is_none());
        let verdict = container_verdict(Path::new("/m/a.webm")).unwrap();
        assert_eq!(verdict.action, Action::Skip);
        assert_eq!(verdict.reason.to_string(), "container_not_h264_ok(.webm)");
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(Reason::BitrateExceedsMax.to_string(), "bitrate_exceeds_max");
        assert_eq!(Reason::CodecMismatch.to_string(), "codec_mismatch");
    }

    fn valid_settings() -> impl Strategy<Value = Settings> {
        (1u32..500, 0u32..2000, 0u32..5000).prop_map(|(tol, extra_target, extra_max)| {
            let target_br = tol + 1 + extra_target;
            Settings {
                target_br,
                max_br: target_br + extra_max,
                bitrate_tolerance: tol,
                ..Settings::default()
            }
        })
    }

    proptest! {
        #[test]
        fn prop_never_convert_h264_at_or_below_lower_bound(s in valid_settings(), frac in 0.0f64..=1.0) {
            let bitrate = (f64::from(s.lower_bound()) * frac).floor() as u64;
            prop_assert_eq!(classify(&media("h264", bitrate), &s).action, Action::Skip);
        }

        #[test]
        fn prop_h264_above_max_always_converts(s in valid_settings(), excess in 1u64..100_000) {
            let verdict = classify(&media("h264", u64::from(s.max_br) + excess), &s);
            prop_assert_eq!(verdict, Verdict::convert(Reason::BitrateExceedsMax));
        }

        #[test]
        fn prop_max_boundary(s in valid_settings()) {
            let max = u64::from(s.max_br);
            prop_assert_eq!(classify(&media("h264", max), &s).action, Action::Skip);
            prop_assert_eq!(classify(&media("h264", max + 1), &s).action, Action::Convert);
        }

        #[test]
        fn prop_non_h264_always_converts(s in valid_settings(), bitrate in 0u64..1_000_000,
                                         codec in prop::sample::select(vec!["hevc", "av1", "vp9", "mpeg4", "wmv3"])) {
            prop_assert_eq!(classify(&media(codec, bitrate), &s), Verdict::convert(Reason::CodecMismatch));
        }

        #[test]
        fn prop_never_unclassified(s in valid_settings(), bitrate in 0u64..1_000_000,
                                   codec in prop::sample::select(vec!["h264", "hevc", "av1"])) {
            prop_assert_ne!(classify(&media(codec, bitrate), &s).reason, Reason::Unclassified);
        }

        #[test]
        fn prop_deterministic(s in valid_settings(), bitrate in 0u64..100_000) {
            let info = media("h264", bitrate);
            prop_assert_eq!(classify(&info, &s), classify(&info, &s));
        }
    }
}
