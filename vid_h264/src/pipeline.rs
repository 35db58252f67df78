//! Walk → probe → classify → (plan → execute → record)
//!
//! One pipeline serves both modes. `dry_run` (scan) stops after the
//! classifier and prints the files that would be converted; convert mode
//! runs the executor and appends to the ledger and size report, each behind
//! its own lock. Files run on a bounded rayon pool; once the shutdown flag
//! is set no new file is started.

use anyhow::{anyhow, Context, Result};
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use shared_utils::batch::{sweep_temp_files, BatchResult, VideoWalker};
use shared_utils::checkpoint::ProgressLedger;
use shared_utils::ffmpeg_process::CommandRunner;
use shared_utils::ffprobe::Prober;
use shared_utils::gpu_accel::{available_encoders, EncoderProfile};
use shared_utils::progress::{create_progress_bar, file_message};
use shared_utils::report::SizeReporter;
use shared_utils::safety::check_safe_for_destructive;
use shared_utils::thread_manager::{resolve_parallel_tasks, video_thread_config};

use crate::classifier::{classify, container_verdict, Reason};
use crate::config::Settings;
use crate::executor::{ConversionOutcome, Executor};
use crate::planner::plan;

/// Resolved binary locations.
#[derive(Debug, Clone)]
pub struct Tools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub root: PathBuf,
    /// Scan mode: classify only, no side effects
    pub dry_run: bool,
    pub profile: EncoderProfile,
    pub crf_override: Option<u8>,
    pub show_progress: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// In scan mode `succeeded` counts files that would be converted
    pub result: BatchResult,
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub elapsed: Duration,
    /// Shutdown requested before every file was started
    pub interrupted: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum FileOutcome {
    Converted {
        reason: Reason,
        outcome: ConversionOutcome,
    },
    WouldConvert(Reason),
    Skipped(String),
    Failed(String),
    NotStarted,
}

struct Sinks {
    ledger: Mutex<ProgressLedger>,
    reporter: Mutex<SizeReporter>,
}

struct RunContext<'a> {
    options: &'a RunOptions,
    option_tag: String,
    encoder_threads: Option<usize>,
    prober: Prober<'a>,
    executor: Executor<'a>,
    sinks: Option<Sinks>,
}

pub struct Pipeline<'a> {
    settings: &'a Settings,
    tools: &'a Tools,
    runner: &'a dyn CommandRunner,
    shutdown: Arc<AtomicBool>,
}

impl<'a> Pipeline<'a> {
    pub fn new(settings: &'a Settings, tools: &'a Tools, runner: &'a dyn CommandRunner) -> Self {
        Self {
            settings,
            tools,
            runner,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn run(&self, options: &RunOptions) -> Result<RunSummary> {
        let start = Instant::now();
        let walker = VideoWalker::new(&options.root)?;

        if !options.dry_run {
            check_safe_for_destructive(walker.root(), "convert").map_err(|e| anyhow!(e))?;
            sweep_temp_files(walker.root());
            self.check_encoder(options.profile);
        }

        let files = walker.candidates();
        let total = files.len();
        info!(root = %walker.root().display(), files = total, dry_run = options.dry_run, "📂 Found candidate files");

        let ctx = self.context(options)?;
        let parallel_tasks = resolve_parallel_tasks(self.settings.jobs);
        debug!(parallel_tasks, encoder_threads = ?ctx.encoder_threads, "🔧 Thread strategy");

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(parallel_tasks)
            .build()
            .map_err(|e| anyhow!("Failed to create thread pool: {}", e))?;

        let label = if options.dry_run { "Scanning" } else { "Converting" };
        let pb = create_progress_bar(total as u64, label, !options.show_progress || options.dry_run);
        let processed = AtomicUsize::new(0);

        let outcomes: Vec<(PathBuf, FileOutcome)> = pool.install(|| {
            files
                .par_iter()
                .map(|path| {
                    pb.set_message(file_message(path));
                    let outcome = self.process_file(path, &ctx);
                    if outcome != FileOutcome::NotStarted {
                        let current = processed.fetch_add(1, Ordering::Relaxed) + 1;
                        report_line(&pb, current, total, path, &outcome);
                    }
                    pb.inc(1);
                    (path.clone(), outcome)
                })
                .collect()
        });
        pb.finish_and_clear();

        let mut summary = RunSummary::default();
        for (path, outcome) in outcomes {
            match outcome {
                FileOutcome::Converted { outcome, .. } => {
                    summary.result.success();
                    summary.input_bytes += outcome.original_bytes;
                    summary.output_bytes += outcome.new_bytes;
                }
                FileOutcome::WouldConvert(_) => summary.result.success(),
                FileOutcome::Skipped(_) => summary.result.skip(),
                FileOutcome::Failed(reason) => summary.result.fail(path, reason),
                FileOutcome::NotStarted => summary.interrupted = true,
            }
        }
        summary.elapsed = start.elapsed();

        if summary.interrupted {
            warn!("🛑 Shutdown requested, remaining files were not started");
        }
        Ok(summary)
    }

    fn context<'r>(&'r self, options: &'r RunOptions) -> Result<RunContext<'r>> {
        let rate_control = self
            .settings
            .rate_control(options.profile, options.crf_override);

        let sinks = if options.dry_run {
            None
        } else {
            let ledger = ProgressLedger::open(&self.settings.ledger_path).with_context(|| {
                format!("cannot open ledger {}", self.settings.ledger_path.display())
            })?;
            let reporter = SizeReporter::new(&self.settings.report_path).with_context(|| {
                format!("cannot open size report {}", self.settings.report_path.display())
            })?;
            debug!(entries = ledger.len(), ledger = %ledger.ledger_file().display(), "Ledger loaded");
            Some(Sinks {
                ledger: Mutex::new(ledger),
                reporter: Mutex::new(reporter),
            })
        };

        // hardware encoders ignore -threads
        let encoder_threads = match (options.profile.is_hardware(), self.settings.jobs) {
            (false, None) => Some(video_thread_config().child_threads),
            _ => None,
        };

        Ok(RunContext {
            options,
            option_tag: rate_control.option_tag(),
            encoder_threads,
            prober: Prober::new(self.runner, &self.tools.ffprobe, self.settings.probe_timeout()),
            executor: Executor::new(
                self.runner,
                &self.tools.ffmpeg,
                &self.tools.ffprobe,
                self.settings.probe_timeout(),
                self.settings.encode_timeout(),
            ),
            sinks,
        })
    }

    fn process_file(&self, path: &Path, ctx: &RunContext<'_>) -> FileOutcome {
        if self.shutdown.load(Ordering::SeqCst) {
            return FileOutcome::NotStarted;
        }

        if let Some(sinks) = &ctx.sinks {
            let ledger = sinks.ledger.lock().unwrap_or_else(|e| e.into_inner());
            if ledger.is_done(path, &ctx.option_tag) {
                return FileOutcome::Skipped("already_done".to_string());
            }
        }

        if let Some(verdict) = container_verdict(path) {
            return FileOutcome::Skipped(verdict.reason.to_string());
        }

        let info = match ctx.prober.probe(path) {
            Ok(info) => info,
            Err(e) => return FileOutcome::Failed(format!("probe_failed: {}", e)),
        };

        let verdict = classify(&info, self.settings);
        debug!(
            path = %path.display(),
            codec = %info.video_codec,
            bitrate_kbps = info.bitrate_kbps,
            reason = %verdict.reason,
            "Classified"
        );
        if !verdict.is_convert() {
            return FileOutcome::Skipped(verdict.reason.to_string());
        }

        let Some(sinks) = &ctx.sinks else {
            return FileOutcome::WouldConvert(verdict.reason);
        };

        let mut conversion = plan(
            path,
            &info,
            self.settings,
            ctx.options.profile,
            ctx.options.crf_override,
        );
        conversion.encoder_threads = ctx.encoder_threads;

        match ctx.executor.execute(&conversion) {
            Ok(outcome) => {
                record(sinks, path, &ctx.option_tag, outcome);
                FileOutcome::Converted {
                    reason: verdict.reason,
                    outcome,
                }
            }
            Err(e) => FileOutcome::Failed(format!("{}: {}", e.tag(), e)),
        }
    }

    fn check_encoder(&self, profile: EncoderProfile) {
        let encoder = profile.spec().encoder;
        match available_encoders(self.runner, &self.tools.ffmpeg, self.settings.probe_timeout()) {
            Ok(list) if list.iter().any(|e| e == encoder) => {
                debug!(encoder, "Encoder available");
            }
            Ok(_) => warn!(
                encoder,
                profile = %profile,
                "⚠️ ffmpeg does not list this encoder, conversions will likely fail"
            ),
            Err(e) => debug!(error = %e, "Could not query ffmpeg encoders"),
        }
    }
}

/// The source is already replaced at this point; a failed append only
/// means the file is re-probed (and skipped) next run.
fn record(sinks: &Sinks, path: &Path, option_tag: &str, outcome: ConversionOutcome) {
    {
        let mut ledger = sinks.ledger.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = ledger.record(path, option_tag) {
            error!(path = %path.display(), error = %e, "❌ Could not append to ledger");
        }
    }
    let mut reporter = sinks.reporter.lock().unwrap_or_else(|e| e.into_inner());
    if let Err(e) = reporter.record(path, outcome.original_bytes, outcome.new_bytes) {
        error!(path = %path.display(), error = %e, "❌ Could not append to size report");
    }
}

fn report_line(pb: &ProgressBar, current: usize, total: usize, path: &Path, outcome: &FileOutcome) {
    let prefix = format!("[{}/{}]", current, total);
    pb.suspend(|| match outcome {
        FileOutcome::Converted { reason, .. } => {
            info!("{} OK: {} :: {}", prefix, path.display(), reason)
        }
        FileOutcome::WouldConvert(reason) => {
            println!("{}  ->  {}", path.display(), reason)
        }
        FileOutcome::Skipped(reason) => {
            info!("{} SKIP: {} :: {}", prefix, path.display(), reason)
        }
        FileOutcome::Failed(reason) => {
            warn!("{} FAIL: {} :: {}", prefix, path.display(), reason)
        }
        FileOutcome::NotStarted => {}
    });
}
