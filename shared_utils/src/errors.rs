use std::path::PathBuf;
use thiserror::Error;

/// Directory walk failures.
#[derive(Error, Debug)]
pub enum WalkError {
    #[error("root path not found or not a directory: {0}")]
    RootNotFound(PathBuf),

    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),
}

/// Per-file conversion failures. The source file is intact in every case.
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("encode failed: {0}")]
    EncodeFailed(String),

    #[error("output validation failed: {0}")]
    ValidationFailed(String),

    #[error("stale temp file could not be removed: {path}: {reason}")]
    TempFileCollision { path: PathBuf, reason: String },

    #[error("could not replace original after {attempts} attempts: {reason}")]
    ReplaceFailed { attempts: u32, reason: String },
}

impl ConversionError {
    /// Short tag for progress lines.
    pub fn tag(&self) -> &'static str {
        match self {
            ConversionError::EncodeFailed(_) => "encode_failed",
            ConversionError::ValidationFailed(_) => "validation_failed",
            ConversionError::TempFileCollision { .. } => "tmp_cleanup_failed",
            ConversionError::ReplaceFailed { .. } => "replace_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_error_tags() {
        assert_eq!(ConversionError::EncodeFailed("x".into()).tag(), "encode_failed");
        assert_eq!(
            ConversionError::ReplaceFailed {
                attempts: 12,
                reason: "busy".into()
            }
            .tag(),
            "replace_failed"
        );
    }

    #[test]
    fn test_error_display_includes_path() {
        let err = WalkError::RootNotFound(PathBuf::from("/nope"));
        assert!(err.to_string().contains("/nope"));
    }
}
