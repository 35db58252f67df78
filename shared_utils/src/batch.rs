//! Batch Processing Module
//!
//! Directory walking for video candidates, the stray temp file sweep, and
//! the per-run outcome counters.

use crate::common_utils::{has_extension, is_temp_file, is_video_candidate, VIDEO_EXTENSIONS};
use crate::errors::WalkError;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Lazy, restartable walk over the video files below a root.
///
/// Every call to [`VideoWalker::iter`] starts a fresh traversal.
#[derive(Debug, Clone)]
pub struct VideoWalker {
    root: PathBuf,
}

impl VideoWalker {
    /// Fails with [`WalkError::RootNotFound`] unless `root` is a directory.
    pub fn new(root: &Path) -> Result<Self, WalkError> {
        if !root.is_dir() {
            return Err(WalkError::RootNotFound(root.to_path_buf()));
        }
        let root = root
            .canonicalize()
            .map_err(|_| WalkError::RootNotFound(root.to_path_buf()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Candidate paths and per-entry walk errors, in traversal order.
    pub fn iter(&self) -> impl Iterator<Item = Result<PathBuf, WalkError>> + '_ {
        WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(e) if e.file_type().is_file() && is_video_candidate(e.path()) => {
                    Some(Ok(e.into_path()))
                }
                Ok(_) => None,
                Err(err) => Some(Err(classify_walk_error(&self.root, err))),
            })
    }

    /// Sorted candidate list. Unreadable entries are logged and skipped.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .iter()
            .filter_map(|item| match item {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(error = %e, "⚠️ Skipping unreadable entry");
                    None
                }
            })
            .collect();
        files.sort();
        files
    }
}

fn classify_walk_error(root: &Path, err: walkdir::Error) -> WalkError {
    let path = err.path().unwrap_or(root).to_path_buf();
    match err.io_error().map(io::Error::kind) {
        Some(io::ErrorKind::NotFound) if path == root => WalkError::RootNotFound(path),
        _ => WalkError::PermissionDenied(path),
    }
}

/// Delete leftover `*.__transcoding__.*` video files below `root`.
///
/// Returns the number removed. Failures are logged, never fatal.
pub fn sweep_temp_files(root: &Path) -> usize {
    let mut deleted = 0;
    for entry in WalkDir::new(root).follow_links(false).into_iter().flatten() {
        let path = entry.path();
        if !entry.file_type().is_file() || !is_temp_file(path) || !has_extension(path, VIDEO_EXTENSIONS) {
            continue;
        }
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "Removed stray temp file");
                deleted += 1;
            }
            Err(e) => warn!(path = %path.display(), error = %e, "⚠️ Could not remove stray temp file"),
        }
    }
    if deleted > 0 {
        info!(count = deleted, "🧹 Cleanup: deleted leftover temp file(s)");
    }
    deleted
}

#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: Vec<(PathBuf, String)>,
}

impl BatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success(&mut self) {
        self.total += 1;
        self.succeeded += 1;
    }

    pub fn fail(&mut self, path: PathBuf, error: String) {
        self.total += 1;
        self.failed += 1;
        self.errors.push((path, error));
    }

    pub fn skip(&mut self) {
        self.total += 1;
        self.skipped += 1;
    }
}
