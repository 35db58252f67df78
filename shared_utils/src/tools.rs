//! External tool lookup (ffmpeg, ffprobe)

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{name} not found in PATH")]
    NotOnPath { name: String },

    #[error("configured {name} does not exist: {path}")]
    MissingConfigured { name: String, path: PathBuf },
}

/// Resolve a binary: an explicit path is checked as-is (bare names go
/// through `PATH`), otherwise `default_name` is looked up on `PATH`.
pub fn resolve_tool(default_name: &str, configured: Option<&Path>) -> Result<PathBuf, ToolError> {
    match configured {
        Some(path) if path.components().count() > 1 || path.is_absolute() => {
            if path.is_file() {
                Ok(path.to_path_buf())
            } else {
                Err(ToolError::MissingConfigured {
                    name: default_name.to_string(),
                    path: path.to_path_buf(),
                })
            }
        }
        Some(bare) => which::which(bare).map_err(|_| ToolError::NotOnPath {
            name: bare.display().to_string(),
        }),
        None => which::which(default_name).map_err(|_| ToolError::NotOnPath {
            name: default_name.to_string(),
        }),
    }
}
