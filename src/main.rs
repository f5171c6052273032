//! camrec — scheduled multi-camera recorder for live HLS streams
//!
//! Usage:
//!   camrec record   --config config.toml [--duration 600]   # one fixed-length recording per camera
//!   camrec schedule --config config.toml                    # record inside today's windows
//!   camrec fetch    --config config.toml                    # download the current live segments
//!   camrec list     --config config.toml                    # print the configured cameras

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use camrec::camera::GstBackend;
use camrec::config::Config;
use camrec::fetcher::SegmentFetcher;
use camrec::layout::RecordingLayout;
use camrec::orchestrator::{fetch_sources, SourceOrchestrator, UnitMode, UnitOutcome, UnitReport};
use camrec::playlist::PlaylistResolver;

#[derive(Parser)]
#[command(name = "camrec", about = "Scheduled multi-camera HLS recorder", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record every configured camera once, in parallel.
    Record {
        /// Path to the TOML configuration file.
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// Override the recording duration, in seconds.
        #[arg(long)]
        duration: Option<u64>,
    },
    /// Record every camera inside the configured windows until midnight.
    Schedule {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Download the segments currently listed in each camera's playlist.
    Fetch {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Print the configured cameras and their effective settings.
    List {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!(error = %e, "camrec failed");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Record { config, duration } => {
            let cfg = load(&config)?;
            init_logging(&cfg)?;
            run_record(cfg, duration).await
        }
        Command::Schedule { config } => {
            let cfg = load(&config)?;
            init_logging(&cfg)?;
            run_schedule(cfg).await
        }
        Command::Fetch { config } => {
            let cfg = load(&config)?;
            init_logging(&cfg)?;
            run_fetch(cfg).await
        }
        Command::List { config } => run_list(&load(&config)?),
    }
}

fn load(path: &Path) -> anyhow::Result<Config> {
    Config::from_file(path).with_context(|| format!("loading {}", path.display()))
}

fn init_logging(cfg: &Config) -> anyhow::Result<()> {
    let log_file = camrec::logging::init(&cfg.logging).context("setting up logging")?;
    info!(log_file = ?log_file, "Logging setup complete");
    Ok(())
}

fn gst_backend(cfg: &Config) -> anyhow::Result<Arc<GstBackend>> {
    let backend = GstBackend::new(
        Duration::from_secs(cfg.recording.open_timeout_secs),
        Duration::from_secs(cfg.recording.read_timeout_secs),
    )?;
    Ok(Arc::new(backend))
}

fn layout(cfg: &Config) -> RecordingLayout {
    RecordingLayout::new(&cfg.recording.output_dir, &cfg.recording.container)
}

async fn run_record(cfg: Config, duration: Option<u64>) -> anyhow::Result<()> {
    let mut sources = cfg.camera_sources()?;
    if let Some(secs) = duration {
        if secs == 0 {
            bail!("--duration must be > 0");
        }
        for source in &mut sources {
            source.duration = Duration::from_secs(secs);
        }
    }

    info!(
        cameras = sources.len(),
        output_dir = ?cfg.recording.output_dir,
        "Starting fixed-duration recording"
    );

    let orchestrator = SourceOrchestrator::new(gst_backend(&cfg)?, layout(&cfg), UnitMode::Once);
    let reports = orchestrator.launch(sources).await;
    log_reports(&reports);
    Ok(())
}

async fn run_schedule(cfg: Config) -> anyhow::Result<()> {
    let windows = cfg.schedule_windows()?;
    if windows.is_empty() {
        bail!("no schedule windows configured");
    }
    let sources = cfg.camera_sources()?;

    info!(
        cameras = sources.len(),
        windows = windows.len(),
        poll_secs = cfg.schedule.poll_interval_secs,
        "Starting scheduled recording"
    );

    let mode = UnitMode::Scheduled {
        windows,
        poll_interval: Duration::from_secs(cfg.schedule.poll_interval_secs),
    };
    let orchestrator = SourceOrchestrator::new(gst_backend(&cfg)?, layout(&cfg), mode);
    let reports = orchestrator.launch(sources).await;
    log_reports(&reports);
    Ok(())
}

async fn run_fetch(cfg: Config) -> anyhow::Result<()> {
    let sources = cfg.camera_sources()?;
    let client = reqwest::Client::builder().build().context("building HTTP client")?;
    let resolver = PlaylistResolver::new(client.clone());
    let fetcher = SegmentFetcher::new(client, cfg.fetch.chunk_size);

    let reports = fetch_sources(resolver, fetcher, sources, &cfg.fetch.segment_dir).await;
    log_reports(&reports);
    Ok(())
}

fn run_list(cfg: &Config) -> anyhow::Result<()> {
    let sources = cfg.camera_sources()?;
    println!("=== camrec cameras ===");
    println!("Output dir : {}", cfg.recording.output_dir.display());
    println!("Container  : {}", cfg.recording.container);
    println!("Windows    : {}", cfg.schedule.windows.len());
    for (start, end) in &cfg.schedule.windows {
        println!("  {start} - {end}");
    }
    println!("Cameras    : {}", sources.len());
    for s in &sources {
        println!(
            "  {:<16} {} [{} @ {} fps, {}s, skip {}, display {}]",
            s.id,
            s.url,
            s.codec,
            s.frame_rate,
            s.duration.as_secs(),
            s.frame_skip,
            s.display
        );
    }
    Ok(())
}

fn log_reports(reports: &[UnitReport]) {
    for report in reports {
        match &report.outcome {
            UnitOutcome::Recorded(r) => info!(
                camera = report.source_id,
                status = ?r.status,
                frames_written = r.frames_written,
                output = ?r.output,
                "Unit finished"
            ),
            UnitOutcome::Scheduled(s) => info!(
                camera = report.source_id,
                ticks = s.ticks,
                recordings = s.recordings.len(),
                "Unit finished"
            ),
            UnitOutcome::Fetched(f) => info!(
                camera = report.source_id,
                segments = f.written.len(),
                failed = f.failed.len(),
                bytes = f.total_bytes(),
                "Unit finished"
            ),
            UnitOutcome::Failed(e) | UnitOutcome::Panicked(e) => {
                warn!(camera = report.source_id, error = e, "Unit failed")
            }
        }
    }
}
