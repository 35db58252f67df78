//! Checkpoint & Resume Module
//!
//! - Progress ledger: append-only record of converted files, so a re-run skips
//!   them without probing
//! - Output integrity check used before an original is replaced
//!
//! # Ledger format
//!
//! One line per successful conversion:
//!
//! ```text
//! /abs/path/to/movie.mkv|br:3000|1760000000
//! ```
//!
//! The middle field is the rate-control option the file was converted with.
//! When a path appears more than once the latest line wins.
//!
//! # Usage
//! ```no_run
//! use shared_utils::checkpoint::ProgressLedger;
//! use std::path::Path;
//!
//! fn main() -> std::io::Result<()> {
//!     let mut ledger = ProgressLedger::open(Path::new("converted.log"))?;
//!     let file = Path::new("/media/movie.mkv");
//!     if !ledger.is_done(file, "br:3000") {
//!         // ... convert ...
//!         ledger.record(file, "br:3000")?;
//!     }
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

const FIELD_SEPARATOR: char = '|';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Normalized absolute path
    pub path: String,
    /// `br:<kbps>` or `crf:<n>`; empty for bare-path lines
    pub option: String,
    /// Unix seconds at append time
    pub timestamp: i64,
}

impl LedgerEntry {
    fn to_line(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}\n",
            self.path,
            self.option,
            self.timestamp,
            sep = FIELD_SEPARATOR
        )
    }

    fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.trim().is_empty() || trimmed.trim_start().starts_with('#') {
            return None;
        }

        let mut fields = trimmed.rsplitn(3, FIELD_SEPARATOR);
        let last = fields.next()?;
        match (fields.next(), fields.next()) {
            (Some(option), Some(path)) if !path.is_empty() => Some(Self {
                path: path.to_string(),
                option: option.to_string(),
                timestamp: last.trim().parse().ok()?,
            }),
            (Some(path), None) if !path.is_empty() => Some(Self {
                path: path.to_string(),
                option: last.to_string(),
                timestamp: 0,
            }),
            (None, None) => Some(Self {
                path: last.to_string(),
                option: String::new(),
                timestamp: 0,
            }),
            _ => None,
        }
    }
}

/// Append-only record of converted files.
pub struct ProgressLedger {
    ledger_file: PathBuf,
    /// Latest entry per normalized path
    entries: HashMap<String, LedgerEntry>,
}

impl ProgressLedger {
    /// Load the ledger, creating its parent directory if needed. A missing
    /// file is an empty ledger.
    pub fn open(ledger_file: &Path) -> io::Result<Self> {
        if let Some(parent) = ledger_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let entries = Self::load(ledger_file)?;
        Ok(Self {
            ledger_file: ledger_file.to_path_buf(),
            entries,
        })
    }

    /// True when any entry exists for `path`.
    pub fn has(&self, path: &Path) -> bool {
        self.entries.contains_key(&normalize_path(path))
    }

    /// True when the latest entry for `path` was made with `option`.
    pub fn is_done(&self, path: &Path, option: &str) -> bool {
        self.entries
            .get(&normalize_path(path))
            .is_some_and(|entry| entry.option == option)
    }

    pub fn latest(&self, path: &Path) -> Option<&LedgerEntry> {
        self.entries.get(&normalize_path(path))
    }

    /// Append an entry and update the in-memory view.
    ///
    /// The line is written with a single `write_all` and synced before the
    /// in-memory map changes.
    pub fn record(&mut self, path: &Path, option: &str) -> io::Result<()> {
        let entry = LedgerEntry {
            path: normalize_path(path),
            option: option.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.ledger_file)?;
        file.write_all(entry.to_line().as_bytes())?;
        file.sync_data()?;

        self.entries.insert(entry.path.clone(), entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ledger_file(&self) -> &Path {
        &self.ledger_file
    }

    fn load(ledger_file: &Path) -> io::Result<HashMap<String, LedgerEntry>> {
        let file = match File::open(ledger_file) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e),
        };

        let mut entries = HashMap::new();
        for (line_no, line) in BufReader::new(file).lines().map_while(Result::ok).enumerate() {
            match LedgerEntry::parse(&line) {
                Some(entry) => {
                    entries.insert(entry.path.clone(), entry);
                }
                None if line.trim().is_empty() || line.trim_start().starts_with('#') => {}
                None => warn!(
                    ledger = %ledger_file.display(),
                    line = line_no + 1,
                    "⚠️ Ignoring malformed ledger line"
                ),
            }
        }
        Ok(entries)
    }
}

/// Canonical absolute form used as ledger key.
///
/// Falls back to joining with the current directory when the file no longer
/// exists.
pub fn normalize_path(path: &Path) -> String {
    if let Ok(canonical) = path.canonicalize() {
        return canonical.to_string_lossy().into_owned();
    }
    if path.is_absolute() {
        return path.to_string_lossy().into_owned();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

/// Verify output file integrity before it replaces an original.
pub fn verify_output_integrity(output: &Path, min_size: u64) -> Result<u64, String> {
    let metadata =
        fs::metadata(output).map_err(|e| format!("Cannot read output metadata: {}", e))?;

    if !metadata.is_file() {
        return Err("Output is not a regular file".to_string());
    }
    if metadata.len() == 0 {
        return Err("Output file is empty (0 bytes)".to_string());
    }
    if metadata.len() < min_size {
        return Err(format!(
            "Output file too small: {} < {} bytes",
            metadata.len(),
            min_size
        ));
    }

    // non-empty, so the first byte must be readable
    let mut file = File::open(output).map_err(|e| format!("Cannot open output file: {}", e))?;
    let mut first = [0u8; 1];
    file.read_exact(&mut first)
        .map_err(|e| format!("Cannot read output file: {}", e))?;

    Ok(metadata.len())
}
