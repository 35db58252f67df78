//! Codec Information Module
//!
//! Recognizes the H.264 spellings ffprobe and encoders use, and sorts
//! subtitle codecs into text and bitmap kinds.

/// ffprobe and encoder names that all mean H.264/AVC
const H264_ALIASES: &[&str] = &["h264", "avc", "avc1", "libx264"];

pub fn is_h264(codec_name: &str) -> bool {
    let lower = codec_name.to_lowercase();
    H264_ALIASES.contains(&lower.as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleKind {
    /// Text based; can be re-muxed as `mov_text`
    Text,
    /// Picture based (PGS, VobSub, DVB); only Matroska carries these
    Bitmap,
}

const TEXT_SUBTITLE_CODECS: &[&str] = &["subrip", "srt", "ass", "ssa", "webvtt", "mov_text", "text"];

pub fn subtitle_kind(codec_name: &str) -> SubtitleKind {
    let lower = codec_name.to_lowercase();
    if TEXT_SUBTITLE_CODECS.contains(&lower.as_str()) {
        SubtitleKind::Text
    } else {
        SubtitleKind::Bitmap
    }
}
