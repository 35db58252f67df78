use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use shared_utils::gpu_accel::EncoderProfile;
use shared_utils::logging::{init_logging, LogConfig};
use shared_utils::report::{print_simple_summary, print_summary_report};
use shared_utils::tools::resolve_tool;
use shared_utils::SystemRunner;

use vid_h264::config::MAX_CRF;
use vid_h264::{Pipeline, RunOptions, RunSummary, Settings, Tools};

const EXIT_FATAL: u8 = 1;
const EXIT_FILES_FAILED: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "vid-h264")]
#[command(version, about = "Bitrate-aware H.264 normalizer for video libraries", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List files that would be converted, without touching anything
    Scan {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Re-encode oversized or non-H.264 videos in place
    Convert {
        #[command(flatten)]
        common: CommonArgs,
        /// Encoder profile: nvidia, amdgpu, intel, vaapi, cpu
        #[arg(long = "use", value_name = "PROFILE", default_value_t = EncoderProfile::Nvidia)]
        profile: EncoderProfile,
        /// Bitrate cap in kbps; target becomes N - BITRATE_TOLERANCE
        #[arg(long, value_name = "KBPS", value_parser = clap::value_parser!(u32).range(1..))]
        bitrate: Option<u32>,
        /// CRF for the cpu profile
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=MAX_CRF as i64))]
        crf: Option<u8>,
        /// Files converted in parallel
        #[arg(short, long)]
        jobs: Option<usize>,
    },
}

#[derive(Args)]
struct CommonArgs {
    #[arg(value_name = "ROOT", default_value = ".")]
    root: PathBuf,
    /// Settings file (default: ./vid_h264.toml when present)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    #[arg(short, long)]
    verbose: bool,
    /// Also write a debug-level log to this file
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let common = match &cli.command {
        Commands::Scan { common } | Commands::Convert { common, .. } => common,
    };

    let _guard = match init_logging(
        "vid_h264",
        LogConfig::new()
            .with_verbose(common.verbose)
            .with_log_file(common.log_file.as_ref()),
    ) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("❌ Could not initialise logging: {:#}", e);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("❌ {:#}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Scan { common } => {
            let settings = Settings::load(common.config.as_deref())?;
            let tools = resolve_tools(&settings)?;
            let options = RunOptions {
                root: common.root,
                dry_run: true,
                profile: EncoderProfile::default(),
                crf_override: None,
                show_progress: false,
            };

            info!("🔍 Scan mode (read-only)");
            let summary = Pipeline::new(&settings, &tools, &SystemRunner).run(&options)?;
            print_simple_summary(&summary.result);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Convert {
            common,
            profile,
            bitrate,
            crf,
            jobs,
        } => {
            let mut settings = Settings::load(common.config.as_deref())?;
            if let Some(max_kbps) = bitrate {
                settings.apply_bitrate_override(max_kbps);
                settings
                    .validate()
                    .with_context(|| format!("--bitrate {} is not usable", max_kbps))?;
            }
            if jobs.is_some() {
                settings.jobs = jobs;
            }
            if crf.is_some() && profile.is_hardware() {
                warn!(profile = %profile, "⚠️ --crf only applies to the cpu profile, ignoring it");
            }
            let tools = resolve_tools(&settings)?;

            let shutdown = Arc::new(AtomicBool::new(false));
            install_shutdown_handler(Arc::clone(&shutdown))?;

            let rate_control = settings.rate_control(profile, crf);
            info!("🎬 Convert mode");
            info!("   Encoder: {} ({})", profile, profile.spec().encoder);
            info!("   Rate control: {}", rate_control.option_tag());
            info!(
                "   Bitrate band: {}-{} kbps, buffer {} kbps",
                settings.lower_bound(),
                settings.max_br,
                settings.bufsize
            );

            let options = RunOptions {
                root: common.root,
                dry_run: false,
                profile,
                crf_override: crf,
                show_progress: !common.verbose,
            };
            let summary = Pipeline::new(&settings, &tools, &SystemRunner)
                .with_shutdown(shutdown)
                .run(&options)?;

            print_summary_report(
                &summary.result,
                summary.elapsed,
                summary.input_bytes,
                summary.output_bytes,
                "H.264 Conversion",
            );
            Ok(convert_exit_code(&summary))
        }
    }
}

fn resolve_tools(settings: &Settings) -> Result<Tools> {
    Ok(Tools {
        ffmpeg: resolve_tool("ffmpeg", settings.ffmpeg_path.as_deref())?,
        ffprobe: resolve_tool("ffprobe", settings.ffprobe_path.as_deref())?,
    })
}

fn install_shutdown_handler(shutdown: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        if shutdown.swap(true, Ordering::SeqCst) {
            std::process::exit(i32::from(EXIT_INTERRUPTED));
        }
        eprintln!("\n🛑 Ctrl+C received, finishing in-flight files (press again to abort)");
    })
    .context("failed to install Ctrl+C handler")
}

fn convert_exit_code(summary: &RunSummary) -> ExitCode {
    if summary.interrupted {
        ExitCode::from(EXIT_INTERRUPTED)
    } else if summary.result.failed > 0 {
        ExitCode::from(EXIT_FILES_FAILED)
    } else {
        ExitCode::SUCCESS
    }
}
