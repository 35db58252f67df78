//! Report Module
//!
//! - Size report: one JSON line per converted file, appended and never
//!   rewritten
//! - Bordered end-of-run summary

use crate::batch::BatchResult;
use crate::progress::{format_bytes, format_duration, format_signed_bytes};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeReportRow {
    pub file_path: String,
    pub original_bytes: u64,
    pub new_bytes: u64,
    /// Negative when the output grew
    pub saved_bytes: i64,
    pub saved_percent: f64,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

impl SizeReportRow {
    pub fn new(path: &Path, original_bytes: u64, new_bytes: u64) -> Self {
        let saved_bytes = original_bytes as i64 - new_bytes as i64;
        let saved_percent = if original_bytes > 0 {
            (saved_bytes as f64 / original_bytes as f64) * 100.0
        } else {
            0.0
        };
        Self {
            file_path: path.display().to_string(),
            original_bytes,
            new_bytes,
            saved_bytes,
            saved_percent: (saved_percent * 100.0).round() / 100.0,
            recorded_at: chrono::Utc::now(),
        }
    }
}

/// Append-only JSON Lines sink for [`SizeReportRow`]s.
pub struct SizeReporter {
    report_file: PathBuf,
}

impl SizeReporter {
    pub fn new(report_file: &Path) -> io::Result<Self> {
        if let Some(parent) = report_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            report_file: report_file.to_path_buf(),
        })
    }

    pub fn record(&mut self, path: &Path, original_bytes: u64, new_bytes: u64) -> io::Result<SizeReportRow> {
        let row = SizeReportRow::new(path, original_bytes, new_bytes);
        let mut line = serde_json::to_string(&row)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.report_file)?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        Ok(row)
    }

    pub fn report_file(&self) -> &Path {
        &self.report_file
    }
}

/// Read every row back; unparseable lines are skipped.
pub fn read_size_report(report_file: &Path) -> io::Result<Vec<SizeReportRow>> {
    let content = match fs::read_to_string(report_file) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    Ok(content
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}

pub fn print_summary_report(
    result: &BatchResult,
    duration: Duration,
    input_bytes: u64,
    output_bytes: u64,
    operation_name: &str,
) {
    let saved = input_bytes as i64 - output_bytes as i64;
    let reduction = if input_bytes > 0 {
        (1.0 - output_bytes as f64 / input_bytes as f64) * 100.0
    } else {
        0.0
    };

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  📊 {:<57}║", format!("{} Summary Report", operation_name));
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  📁 Files Processed:    {:>12}                         ║", result.total);
    println!("║  ✅ Converted:          {:>12}                         ║", result.succeeded);
    println!("║  ⏭️  Skipped:            {:>12}                         ║", result.skipped);
    println!("║  ❌ Failed:             {:>12}                         ║", result.failed);
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  💾 Input Size:         {:>12}                         ║", format_bytes(input_bytes));
    println!("║  💾 Output Size:        {:>12}                         ║", format_bytes(output_bytes));
    println!("║  💰 Bytes Saved:        {:>12}                         ║", format_signed_bytes(saved));
    println!("║  📉 Size Reduction:     {:>11.1}%                         ║", reduction);
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  ⏱️  Total Time:         {:>12}                         ║", format_duration(duration));
    println!("╚══════════════════════════════════════════════════════════════╝");

    if !result.errors.is_empty() {
        println!();
        println!("❌ Errors encountered:");
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        for (path, error) in &result.errors {
            println!("   {} → {}", path.display(), error);
        }
    }
}

pub fn print_simple_summary(result: &BatchResult) {
    println!(
        "\n✅ Complete: {} to convert, {} skipped, {} failed (total: {})",
        result.succeeded, result.skipped, result.failed, result.total
    );
}
