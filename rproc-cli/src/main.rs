mod progress;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::HumanBytes;
use rproc::{
    CliOverrides, Field, FileOutcome, MatchMode, ProcessError, ProcessResult, Processor,
    ProcessorConfig, RunSummary,
};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use progress::IndicatifObserver;

#[derive(Parser)]
#[command(name = "rproc", author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (INI or YAML)
    #[arg(short, long, default_value = "config.ini")]
    config: PathBuf,

    /// Maximum number of files processed at once
    #[arg(short = 'j', long)]
    threads: Option<NonZeroUsize>,

    /// Directory tree holding the .zst inputs
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Directory receiving the .ndjson outputs
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Record field to match (subreddit|author|title|selftext|body|domain)
    #[arg(short, long)]
    field: Option<Field>,

    /// Value to match (can be specified multiple times, replaces the configured list)
    #[arg(short = 'v', long = "value")]
    values: Vec<String>,

    /// How values are compared (exact|partial|regex)
    #[arg(short, long)]
    match_mode: Option<MatchMode>,

    /// Regex tested against input file names
    #[arg(long)]
    file_filter: Option<String>,

    /// How long a graceful shutdown waits for running workers (e.g. 30s, 2m)
    #[arg(long, value_parser = humantime::parse_duration)]
    shutdown_timeout: Option<Duration>,

    /// Log level, ignored when RUST_LOG is set
    #[arg(long)]
    log_level: Option<String>,

    /// Only list the files that would be processed
    #[arg(long)]
    list: bool,

    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            threads: self.threads,
            input: self.input.clone(),
            output: self.output.clone(),
            field: self.field,
            values: self.values.clone(),
            match_mode: self.match_mode,
            file_filter: self.file_filter.clone(),
            shutdown_timeout: self.shutdown_timeout,
            log_level: self.log_level.clone(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ProcessorConfig::load_from(&cli.config)
        .context("failed to load configuration")?
        .merge_with_cli(cli.overrides());
    init_logging(&config.log_level)?;
    config.validate().context("invalid configuration")?;

    if cli.list {
        let processor = Processor::new(config)?;
        return list_files(&processor);
    }

    let observer = Arc::new(IndicatifObserver::new(!cli.no_progress));
    let processor = Arc::new(Processor::new(config)?.with_observer(observer.clone()));
    let shutdown_result = spawn_signal_listener(Arc::clone(&processor))?;

    match processor.process_and_serve() {
        Ok(summary) => {
            observer.finish();
            print_summary(&summary);
            Ok(())
        }
        Err(ProcessError::Closed) => {
            observer.finish();
            let result = shutdown_result
                .recv()
                .context("signal listener stopped before shutdown finished")?;
            result.context("graceful shutdown failed")?;

            info!("stopped processor");
            print_interrupted(&processor);
            Ok(())
        }
        Err(e) => {
            observer.finish();
            Err(e.into())
        }
    }
}

/// RUST_LOG wins over the configured level
fn init_logging(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid log level '{}'", level))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to initialize logging: {}", e))
}

/// Exit status after a forced exit, as a shell reports death by SIGINT
const FORCED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalAction {
    Shutdown,
    ForceExit,
    Ignore,
}

/// The first signal starts a graceful shutdown; a later SIGINT gives up on it
fn next_action(signal: i32, shutdown_requested: bool) -> SignalAction {
    match (shutdown_requested, signal) {
        (false, _) => SignalAction::Shutdown,
        (true, SIGINT) => SignalAction::ForceExit,
        (true, _) => SignalAction::Ignore,
    }
}

/// Requests shutdown on the first SIGINT or SIGTERM and reports how it went.
/// A second SIGINT while workers drain exits the process at once.
fn spawn_signal_listener(processor: Arc<Processor>) -> Result<mpsc::Receiver<ProcessResult<()>>> {
    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("failed to register signal listeners")?;
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("rproc-signal-listener".to_string())
        .spawn(move || {
            let mut shutdown_requested = false;
            for signal in signals.forever() {
                match next_action(signal, shutdown_requested) {
                    SignalAction::Shutdown => {
                        shutdown_requested = true;
                        info!(signal, "received signal, initiating graceful shutdown");
                        request_shutdown(&processor, &tx);
                    }
                    SignalAction::ForceExit => {
                        warn!(signal, "received second interrupt, exiting immediately");
                        std::process::exit(FORCED_EXIT_CODE);
                    }
                    SignalAction::Ignore => {
                        debug!(signal, "shutdown already in progress");
                    }
                }
            }
        })
        .context("failed to start signal listener thread")?;

    Ok(rx)
}

/// Waits for the workers off the listener thread so it can still see signals
fn request_shutdown(processor: &Arc<Processor>, tx: &mpsc::Sender<ProcessResult<()>>) {
    let deadline = processor.config().shutdown_timeout;
    let waiter = {
        let processor = Arc::clone(processor);
        let tx = tx.clone();
        thread::Builder::new()
            .name("rproc-shutdown".to_string())
            .spawn(move || {
                let _ = tx.send(processor.shutdown(deadline));
            })
    };

    if let Err(e) = waiter {
        warn!(error = %e, "failed to start shutdown thread, waiting on the listener");
        let _ = tx.send(processor.shutdown(deadline));
    }
}

fn list_files(processor: &Processor) -> Result<()> {
    let tasks = processor.discover()?;
    if tasks.is_empty() {
        println!(
            "No input files found in {}",
            processor.config().input.display()
        );
        return Ok(());
    }

    let mut total = 0;
    for task in &tasks {
        println!(
            "{}  {}",
            task.path.display().to_string().blue(),
            HumanBytes(task.size)
        );
        total += task.size;
    }
    println!("\n{} files, {}", tasks.len(), HumanBytes(total));
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    if summary.reports.is_empty() {
        println!("No input files matched the file filter");
        return;
    }

    for report in &summary.reports {
        let path = report.path.display().to_string();
        match &report.outcome {
            FileOutcome::Completed => println!(
                "{}: {} lines, {} matched",
                path.blue(),
                report.lines_read,
                report.lines_matched.to_string().green()
            ),
            FileOutcome::Failed(e) => println!("{}: {}", path.blue(), e.to_string().red()),
            FileOutcome::Cancelled => println!("{}: {}", path.blue(), "cancelled".yellow()),
            FileOutcome::Skipped => println!("{}: {}", path.blue(), "skipped".yellow()),
        }
    }

    println!(
        "\nProcessed {} files: {} lines read, {} lines matched",
        summary.files_completed, summary.total_lines, summary.total_matches
    );
    if summary.files_failed > 0 {
        println!("{}", format!("{} files failed", summary.files_failed).red());
    }
    if summary.total_write_failures > 0 {
        println!(
            "{}",
            format!("{} matched lines could not be written", summary.total_write_failures)
                .yellow()
        );
    }
}

fn print_interrupted(processor: &Processor) {
    let stats = processor.metrics().get_stats();
    println!(
        "{}",
        format!(
            "Interrupted: {} files completed, {} cancelled, {} not started",
            stats.files_completed, stats.files_cancelled, stats.files_skipped
        )
        .yellow()
    );
    println!(
        "{} lines read, {} lines matched",
        stats.lines_read, stats.lines_matched
    );
}
