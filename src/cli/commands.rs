//! CLI command definitions for staff-runner.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, TimeDelta, Utc};
use clap::Parser;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::{parse_date, AppConfig};
use crate::job::ProcessRunner;
use crate::locator::{FitsHeaderReader, HeaderReader, DEFAULT_QUALITY_KEYWORD};
use crate::metrics::init_metrics;
use crate::pipeline::StepStatus;
use crate::quality::{IgnoreSet, QualityGate, QualityMask, Verdict};
use crate::report::SummaryWriter;
use crate::scheduler::{ScheduleSettings, Scheduler, StateStore, SystemClock};

/// Runs the SPoCA segmentation and STAFF statistics programs on SDO/AIA images.
#[derive(Parser)]
#[command(name = "staff-runner")]
#[command(about = "Run segmentation and statistics programs on a cadence of SDO/AIA images")]
#[command(version)]
#[command(
    long_about = "staff-runner waits for SDO/AIA images of each tick to be available, picks the best quality file per wavelength, and runs the configured pipeline of external programs on them.\n\nExample usage:\n  staff-runner run --config staff.yaml --log-file staff.log"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Also append logs to this file. Alerts point operators to it.
    #[arg(long, global = true, env = "STAFF_RUNNER_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the scheduler loop until interrupted.
    Run(RunArgs),

    /// Run the pipeline over a past date range, without waiting or saving state.
    Backfill(BackfillArgs),

    /// Print the file that would be used for a date and channel.
    Locate(LocateArgs),

    /// Print the quality verdict of FITS files.
    #[command(alias = "q")]
    Quality(QualityArgs),
}

/// Arguments for `staff-runner run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Configuration file.
    #[arg(short, long)]
    pub config: PathBuf,

    /// State file, overriding the configuration.
    #[arg(short, long)]
    pub state_file: Option<PathBuf>,

    /// Run a single tick and exit.
    #[arg(long)]
    pub once: bool,
}

/// Arguments for `staff-runner backfill`.
#[derive(Parser, Debug)]
pub struct BackfillArgs {
    /// Configuration file.
    #[arg(short, long)]
    pub config: PathBuf,

    /// First date to process.
    #[arg(long)]
    pub start: String,

    /// Date to stop at, not processed itself (default: now).
    #[arg(long)]
    pub end: Option<String>,

    /// Hours between dates (default: the configured cadence).
    #[arg(long)]
    pub interval_hours: Option<u32>,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `staff-runner locate`.
#[derive(Parser, Debug)]
pub struct LocateArgs {
    /// Configuration file.
    #[arg(short, long)]
    pub config: PathBuf,

    /// Date of the image.
    pub date: String,

    /// Channel (wavelength) of the image.
    pub channel: Option<u32>,
}

/// Arguments for `staff-runner quality`.
#[derive(Parser, Debug)]
pub struct QualityArgs {
    /// Files or glob patterns.
    #[arg(required = true)]
    pub files: Vec<String>,

    /// Comma-separated quality bits to tolerate (default: 0,1,2,3,4,8).
    #[arg(short, long, value_delimiter = ',', conflicts_with = "strict")]
    pub ignore: Option<Vec<u8>>,

    /// Tolerate no quality bit at all.
    #[arg(long)]
    pub strict: bool,

    /// HDU holding the quality keyword.
    #[arg(long, default_value = "1")]
    pub hdu: usize,

    /// Header keyword holding the quality bits.
    #[arg(long, default_value = DEFAULT_QUALITY_KEYWORD)]
    pub keyword: String,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_scheduler_command(args, cli.log_file).await,
        Commands::Backfill(args) => run_backfill_command(args).await,
        Commands::Locate(args) => run_locate_command(args).await,
        Commands::Quality(args) => run_quality_command(args),
    }
}

// ============================================================================
// Run / Backfill
// ============================================================================

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    AppConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration {}", path.display()))
}

fn build_scheduler(config: &AppConfig, settings: ScheduleSettings) -> anyhow::Result<Scheduler> {
    if let Err(e) = init_metrics() {
        warn!(error = %e, "Could not register metrics");
    }

    let mut scheduler = Scheduler::new(
        settings,
        Arc::new(config.build_locator()?),
        config.build_pipeline()?,
        Arc::new(ProcessRunner::new()),
        Arc::new(SystemClock),
        config.build_notifier()?,
    );
    if let Some(dir) = &config.report.summary_directory {
        scheduler = scheduler.with_summary_writer(SummaryWriter::new(dir));
    }
    if let Some(path) = &config.report.metrics_file {
        scheduler = scheduler.with_metrics_file(path);
    }
    Ok(scheduler)
}

async fn run_scheduler_command(args: RunArgs, log_file: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(&args.config)?;
    let settings = config.schedule_settings(log_file.as_deref())?;
    let state_file = args.state_file.unwrap_or_else(|| config.state_file());

    let mut scheduler =
        build_scheduler(&config, settings)?.with_state_store(StateStore::new(&state_file));

    let shutdown = spawn_shutdown_listener();
    let completed = scheduler.run(shutdown, args.once.then_some(1)).await;

    info!(
        completed = completed,
        next = %scheduler.cursor(),
        failures = scheduler.failures().value(),
        "Exiting"
    );
    Ok(())
}

#[derive(Debug, Serialize)]
struct BackfillTick {
    date: DateTime<Utc>,
    status: &'static str,
    problem: Option<String>,
}

#[derive(Debug, Serialize)]
struct BackfillOutput {
    succeeded: usize,
    failed: usize,
    ticks: Vec<BackfillTick>,
}

async fn run_backfill_command(args: BackfillArgs) -> anyhow::Result<()> {
    let config = load_config(&args.config)?;
    let (start, end) = backfill_range(&args.start, args.end.as_deref(), Utc::now())?;
    let interval = match args.interval_hours {
        Some(0) => anyhow::bail!("--interval-hours must be greater than 0"),
        Some(hours) => TimeDelta::hours(i64::from(hours)),
        None => config.cadence()?,
    };

    let settings = ScheduleSettings::new(config.name.clone(), start).with_cadence(interval);
    let scheduler = build_scheduler(&config, settings)?;

    let mut shutdown = spawn_shutdown_listener();
    let reports = scheduler.backfill(start, end, interval, &mut shutdown).await;

    let ticks: Vec<BackfillTick> = reports
        .iter()
        .map(|report| BackfillTick {
            date: report.date,
            status: if report.is_success() { "succeeded" } else { "failed" },
            problem: report.first_problem().map(|step| {
                format!("{}: {}", step.name, step_detail(&step.status))
            }),
        })
        .collect();
    let succeeded = ticks.iter().filter(|t| t.status == "succeeded").count();
    let output = BackfillOutput {
        succeeded,
        failed: ticks.len() - succeeded,
        ticks,
    };

    if args.json {
        let json_output = serde_json::to_string_pretty(&output)
            .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
        println!("{}", json_output);
    } else {
        for tick in &output.ticks {
            match &tick.problem {
                Some(problem) => println!("{}  {}  {}", tick.date, tick.status, problem),
                None => println!("{}  {}", tick.date, tick.status),
            }
        }
        println!(
            "Processed {} dates: {} succeeded, {} failed",
            output.ticks.len(),
            output.succeeded,
            output.failed
        );
    }
    Ok(())
}

/// Resolves the `[start, end)` range of a backfill. `end` defaults to `now`.
fn backfill_range(
    start: &str,
    end: Option<&str>,
    now: DateTime<Utc>,
) -> anyhow::Result<(DateTime<Utc>, DateTime<Utc>)> {
    let start = parse_date(start).ok_or_else(|| anyhow::anyhow!("Invalid start date: {}", start))?;
    let end = match end {
        Some(end) => parse_date(end).ok_or_else(|| anyhow::anyhow!("Invalid end date: {}", end))?,
        None => now,
    };
    if end <= start {
        anyhow::bail!("End date {} must be after start date {}", end, start);
    }
    Ok((start, end))
}

fn step_detail(status: &StepStatus) -> String {
    match status {
        StepStatus::Failed { error, .. } => error.to_string(),
        StepStatus::Skipped(reason) => reason.to_string(),
        StepStatus::Succeeded { .. } => "succeeded".to_string(),
    }
}

/// Fans SIGINT and SIGTERM out to a broadcast receiver.
fn spawn_shutdown_listener() -> broadcast::Receiver<()> {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        // No receiver left means the command already finished.
        let _ = shutdown_tx.send(());
    });
    shutdown_rx
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!(error = %e, "Could not listen for Ctrl-C");
                        terminate.recv().await;
                    }
                }
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "Could not install SIGTERM handler");
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// Locate / Quality
// ============================================================================

async fn run_locate_command(args: LocateArgs) -> anyhow::Result<()> {
    let config = load_config(&args.config)?;
    let date =
        parse_date(&args.date).ok_or_else(|| anyhow::anyhow!("Invalid date: {}", args.date))?;
    let locator = config.build_locator()?;

    match locator.locate(date, args.channel).await? {
        Some(path) => println!("{}", path.display()),
        None => println!("No file found!"),
    }
    Ok(())
}

fn run_quality_command(args: QualityArgs) -> anyhow::Result<()> {
    let ignore = if args.strict {
        IgnoreSet::empty()
    } else {
        match &args.ignore {
            Some(bits) => IgnoreSet::new(bits.iter().copied())?,
            None => IgnoreSet::default(),
        }
    };
    let gate = QualityGate::new(ignore);
    let reader = FitsHeaderReader::new(args.hdu);

    let mut files = Vec::new();
    for arg in &args.files {
        files.extend(expand_file_arg(arg)?);
    }
    if files.is_empty() {
        anyhow::bail!("No file matches {}", args.files.join(" "));
    }

    for file in files {
        let line = inspect_file(&file, &reader, &gate, &args.keyword);
        println!("{}: {}", file.display(), line);
    }
    Ok(())
}

/// Returns the paths named by `arg`, globbing when it holds a wildcard.
fn expand_file_arg(arg: &str) -> anyhow::Result<Vec<PathBuf>> {
    if !arg.contains(['*', '?', '[']) {
        return Ok(vec![PathBuf::from(arg)]);
    }
    let mut paths: Vec<PathBuf> = glob::glob(arg)
        .with_context(|| format!("Invalid glob pattern {}", arg))?
        .filter_map(Result::ok)
        .collect();
    paths.sort();
    Ok(paths)
}

/// One-line verdict for `path`.
fn inspect_file(
    path: &Path,
    reader: &dyn HeaderReader,
    gate: &QualityGate,
    keyword: &str,
) -> String {
    let header = match reader.read_header(path) {
        Ok(header) => header,
        Err(e) => return format!("error: {}", e),
    };
    let value = match header.integer(keyword) {
        Ok(Some(value)) => value,
        Ok(None) => return format!("bad: no {} keyword", keyword),
        Err(e) => return format!("error: {}", e),
    };

    let mask = QualityMask::from_header_value(value);
    match gate.assess(mask) {
        Verdict::Good => "good".to_string(),
        Verdict::GoodWithIgnored(ignored) => format!("good, ignoring: {}", ignored.join("; ")),
        Verdict::Bad(defects) => format!("bad ({}): {}", mask, defects.join("; ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::header::testing::write_fits;
    use chrono::TimeZone;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parses() {
        // Verify CLI definition is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_command_defaults() {
        let cli = Cli::try_parse_from(["staff-runner", "run", "--config", "staff.yaml"])
            .expect("should parse");
        assert_eq!(cli.log_level, "info");
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, PathBuf::from("staff.yaml"));
                assert!(args.state_file.is_none());
                assert!(!args.once);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_backfill_command() {
        let cli = Cli::try_parse_from([
            "staff-runner",
            "backfill",
            "-c",
            "staff.yaml",
            "--start",
            "2015-10-16",
            "--interval-hours",
            "12",
            "--log-level",
            "debug",
        ])
        .expect("should parse");
        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Commands::Backfill(args) => {
                assert_eq!(args.start, "2015-10-16");
                assert!(args.end.is_none());
                assert_eq!(args.interval_hours, Some(12));
            }
            _ => panic!("Expected Backfill command"),
        }
    }

    #[test]
    fn test_backfill_range() {
        let now = Utc.with_ymd_and_hms(2015, 10, 20, 9, 30, 0).unwrap();
        let start = Utc.with_ymd_and_hms(2015, 10, 16, 0, 0, 0).unwrap();

        let (from, to) = backfill_range("2015-10-16", None, now).unwrap();
        assert_eq!((from, to), (start, now));

        let (_, to) = backfill_range("2015-10-16", Some("2015-10-17T12:00:00"), now).unwrap();
        assert_eq!(to, Utc.with_ymd_and_hms(2015, 10, 17, 12, 0, 0).unwrap());

        assert!(backfill_range("2015-10-16", Some("2015-10-16"), now).is_err());
        assert!(backfill_range("2015-10-16", Some("2015-10-15"), now).is_err());
        assert!(backfill_range("yesterday", None, now).is_err());
    }

    #[test]
    fn test_quality_command_ignore_list() {
        let cli = Cli::try_parse_from(["staff-runner", "q", "-i", "0,8", "a.fits", "b.fits"])
            .expect("should parse");
        match cli.command {
            Commands::Quality(args) => {
                assert_eq!(args.ignore, Some(vec![0, 8]));
                assert_eq!(args.files, vec!["a.fits", "b.fits"]);
                assert_eq!(args.keyword, "QUALITY");
            }
            _ => panic!("Expected Quality command"),
        }
        assert!(
            Cli::try_parse_from(["staff-runner", "quality", "--strict", "-i", "0", "a"]).is_err()
        );
    }

    #[test]
    fn test_inspect_file_verdicts() {
        let dir = TempDir::new().unwrap();
        let reader = FitsHeaderReader::default();
        let gate = QualityGate::default();

        let good = dir.path().join("good.fits");
        write_fits(&good, Some(0));
        assert_eq!(inspect_file(&good, &reader, &gate, "QUALITY"), "good");

        let ignored = dir.path().join("ignored.fits");
        write_fits(&ignored, Some(1));
        assert!(inspect_file(&ignored, &reader, &gate, "QUALITY").starts_with("good, ignoring: "));

        let bad = dir.path().join("bad.fits");
        write_fits(&bad, Some(1 << 31));
        let line = inspect_file(&bad, &reader, &gate, "QUALITY");
        assert!(line.starts_with("bad (0x80000000)"), "{}", line);

        let missing = dir.path().join("missing.fits");
        write_fits(&missing, None);
        assert_eq!(inspect_file(&missing, &reader, &gate, "QUALITY"), "bad: no QUALITY keyword");

        let absent = dir.path().join("absent.fits");
        assert!(inspect_file(&absent, &reader, &gate, "QUALITY").starts_with("error: "));
    }

    #[test]
    fn test_expand_file_arg_sorted() {
        let dir = TempDir::new().unwrap();
        for name in ["b.fits", "a.fits", "c.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let pattern = format!("{}/*.fits", dir.path().display());
        let paths = expand_file_arg(&pattern).unwrap();
        assert_eq!(
            paths,
            vec![dir.path().join("a.fits"), dir.path().join("b.fits")]
        );
        assert_eq!(expand_file_arg("plain.fits").unwrap(), vec![PathBuf::from("plain.fits")]);
    }
}
