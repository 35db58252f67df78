//! Common Utilities Module
//!
//! Path helpers shared by the walker, planner and executor:
//! - extension handling (case-insensitive)
//! - the in-progress temp file naming scheme

use std::path::{Path, PathBuf};

/// Marker inserted before the extension of in-progress encoder output.
pub const TEMP_MARKER: &str = ".__transcoding__";

/// Extensions treated as video candidates.
pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "mov", "webm", "ts", "flv", "wmv"];

/// Containers that can hold H.264 and are re-encoded in place.
pub const H264_CONTAINERS: &[&str] = &["mkv", "mp4", "mov", "ts", "flv", "avi"];

/// Lower-cased extension, or an empty string.
///
/// ```
/// use std::path::Path;
/// use shared_utils::common_utils::get_extension_lowercase;
///
/// assert_eq!(get_extension_lowercase(Path::new("movie.MKV")), "mkv");
/// assert_eq!(get_extension_lowercase(Path::new("noext")), "");
/// ```
pub fn get_extension_lowercase(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

/// Case-insensitive extension membership test.
///
/// ```
/// use std::path::Path;
/// use shared_utils::common_utils::{has_extension, VIDEO_EXTENSIONS};
///
/// assert!(has_extension(Path::new("clip.MP4"), VIDEO_EXTENSIONS));
/// assert!(!has_extension(Path::new("notes.txt"), VIDEO_EXTENSIONS));
/// ```
pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    let ext = get_extension_lowercase(path);
    extensions.contains(&ext.as_str())
}

/// `<dir>/<stem>.__transcoding__.<ext>` next to `source`.
///
/// Same directory, so the final rename never crosses a filesystem.
///
/// ```
/// use std::path::Path;
/// use shared_utils::common_utils::temp_path_for;
///
/// assert_eq!(
///     temp_path_for(Path::new("/media/show.mkv")),
///     Path::new("/media/show.__transcoding__.mkv")
/// );
/// ```
pub fn temp_path_for(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match source.extension() {
        Some(ext) => format!("{}{}.{}", stem, TEMP_MARKER, ext.to_string_lossy()),
        None => format!("{}{}", stem, TEMP_MARKER),
    };
    source.with_file_name(name)
}

/// True for files produced by [`temp_path_for`].
pub fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().contains(TEMP_MARKER))
        .unwrap_or(false)
}

/// Video candidate: known extension and not an in-progress temp file.
pub fn is_video_candidate(path: &Path) -> bool {
    has_extension(path, VIDEO_EXTENSIONS) && !is_temp_file(path)
}

pub fn is_h264_container(path: &Path) -> bool {
    has_extension(path, H264_CONTAINERS)
}

/// Truncate for one-line display, keeping the tail of the string.
pub fn truncate_left(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let tail: String = s.chars().skip(count - keep).collect();
    format!("...{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_path_keeps_extension_and_dir() {
        let temp = temp_path_for(Path::new("/media/tv/Show S01E01.mp4"));
        assert_eq!(temp, PathBuf::from("/media/tv/Show S01E01.__transcoding__.mp4"));
        assert_eq!(temp.parent(), Some(Path::new("/media/tv")));
        assert_eq!(get_extension_lowercase(&temp), "mp4");
    }

    #[test]
    fn test_temp_path_without_extension() {
        assert_eq!(
            temp_path_for(Path::new("/media/raw")),
            PathBuf::from("/media/raw.__transcoding__")
        );
    }

    #[test]
    fn test_is_temp_file() {
        assert!(is_temp_file(&temp_path_for(Path::new("a.mkv"))));
        assert!(!is_temp_file(Path::new("a.mkv")));
        assert!(!is_temp_file(Path::new("transcoding.mkv")));
    }

    #[test]
    fn test_is_video_candidate() {
        assert!(is_video_candidate(Path::new("a.MKV")));
        assert!(is_video_candidate(Path::new("a.webm")));
        assert!(!is_video_candidate(Path::new("a.__transcoding__.mkv")));
        assert!(!is_video_candidate(Path::new("a.srt")));
        assert!(!is_video_candidate(Path::new("mkv")));
    }

    #[test]
    fn test_is_h264_container() {
        for ext in ["mkv", "mp4", "mov", "ts", "flv", "avi"] {
            assert!(is_h264_container(Path::new(&format!("x.{}", ext))), "{}", ext);
        }
        assert!(!is_h264_container(Path::new("x.webm")));
        assert!(!is_h264_container(Path::new("x.wmv")));
    }

    #[test]
    fn test_truncate_left() {
        assert_eq!(truncate_left("short", 10), "short");
        assert_eq!(truncate_left("/very/long/path/movie.mkv", 12), "...movie.mkv");
    }
}
