//! rt - request throttling scheduler
//!
//! CLI entry point for running synthetic or HTTP workloads through the
//! scheduler.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info};
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use reqthrottle::cli::{Cli, Command, OutputFormat};
use reqthrottle::config::Config;
use reqthrottle::domain::Priority;
use reqthrottle::fetch::{FetchError, FetchResponse, submit_fetch};
use reqthrottle::scheduler::{RequestError, Scheduler, SchedulerConfig};
use reqthrottle::simulate::{self, JobOutcome, JobSpec, SimulationReport};

fn parse_level(level: Option<&str>) -> tracing::Level {
    match level.map(|s| s.to_uppercase()).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    }
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Priority: CLI --log-level > config file > INFO
    let level = parse_level(cli_log_level.or(config_log_level));

    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reqthrottle")
        .join("logs");

    let writer = match fs::create_dir_all(&log_dir).and_then(|_| fs::File::create(log_dir.join("rt.log"))) {
        Ok(file) => BoxMakeWriter::new(Arc::new(file)),
        Err(e) => {
            eprintln!("Warning: cannot open log file in {} ({}), logging to stderr", log_dir.display(), e);
            BoxMakeWriter::new(std::io::stderr)
        }
    };

    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to install subscriber: {}", e))?;

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Log level from config file first, before the full load can log anything
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(scheduler = ?config.scheduler, "rt loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Simulate {
            jobs,
            clear_after_ms,
            max_concurrent,
            delay_ms,
            format,
        } => {
            let scheduler_config = SchedulerConfig {
                max_concurrent: max_concurrent.unwrap_or(config.scheduler.max_concurrent),
                dispatch_delay_ms: delay_ms.unwrap_or(config.scheduler.dispatch_delay_ms),
                ..config.scheduler.clone()
            };
            cmd_simulate(scheduler_config, jobs, clear_after_ms, format).await
        }
        Command::Fetch { urls, priority, format } => cmd_fetch(&config, &urls, priority, format).await,
        Command::Config => cmd_config(&config),
    }
}

async fn cmd_simulate(
    scheduler_config: SchedulerConfig,
    jobs: Vec<JobSpec>,
    clear_after_ms: Option<u64>,
    format: OutputFormat,
) -> Result<()> {
    debug!(?scheduler_config, jobs = jobs.len(), ?clear_after_ms, "cmd_simulate: called");
    scheduler_config.validate()?;

    let jobs = if jobs.is_empty() { simulate::default_jobs() } else { jobs };
    let scheduler = Scheduler::spawn(scheduler_config.clone());

    let report = simulate::run_simulation(&scheduler, &jobs, clear_after_ms.map(Duration::from_millis)).await?;
    scheduler.shutdown()?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_simulation(&scheduler_config, &report),
    }
    Ok(())
}

fn colored_priority(priority: Priority) -> ColoredString {
    let label = format!("{:<10}", priority.to_string());
    match priority {
        Priority::High => label.red().bold(),
        Priority::Medium => label.yellow(),
        Priority::Low => label.cyan(),
        Priority::Background => label.dimmed(),
    }
}

fn print_simulation(config: &SchedulerConfig, report: &SimulationReport) {
    println!(
        "{} max-concurrent={} dispatch-delay={}ms",
        "Scheduler".bold(),
        config.max_concurrent,
        config.dispatch_delay_ms
    );
    println!();
    println!("{:<6} {:<10} {:>8} {:>8} {:>8}  OUTCOME", "ORDER", "PRIORITY", "JOB", "START", "SETTLED");

    let started = report.start_sequence();
    let never_started = report.jobs.iter().filter(|j| j.start_order.is_none());

    for job in started.into_iter().chain(never_started) {
        let order = job.start_order.map(|o| (o + 1).to_string()).unwrap_or_else(|| "-".to_string());
        let start = job
            .started_at_ms
            .map(|ms| format!("{}ms", ms))
            .unwrap_or_else(|| "-".to_string());
        let outcome = match job.outcome {
            JobOutcome::Succeeded => job.outcome.to_string().green(),
            JobOutcome::Failed | JobOutcome::TimedOut => job.outcome.to_string().red(),
            JobOutcome::Cancelled => job.outcome.to_string().yellow(),
        };
        println!(
            "{:<6} {} {:>8} {:>8} {:>8}  {}",
            order,
            colored_priority(job.priority),
            format!("#{}", job.index),
            start,
            format!("{}ms", job.settled_at_ms),
            outcome
        );
    }

    println!();
    println!(
        "Peak concurrency: {}   Elapsed: {}ms   Dispatched: {}   Cancelled: {}",
        report.peak_concurrent, report.elapsed_ms, report.stats.total_dispatched, report.stats.total_cancelled
    );
}

async fn cmd_fetch(config: &Config, urls: &[String], priority: Priority, format: OutputFormat) -> Result<()> {
    debug!(urls = urls.len(), %priority, "cmd_fetch: called");
    config.scheduler.validate()?;
    let client = config.http.build_client().context("Failed to build HTTP client")?;
    let scheduler = Scheduler::spawn(config.scheduler.clone());

    let outcomes: Vec<_> = urls
        .iter()
        .map(|url| submit_fetch(&scheduler, &client, url, priority))
        .collect();
    let results = futures::future::join_all(outcomes).await;
    scheduler.shutdown()?;

    match format {
        OutputFormat::Json => {
            let rows: Vec<_> = urls
                .iter()
                .zip(&results)
                .map(|(url, result)| fetch_json_row(url, result))
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Text => {
            for (url, result) in urls.iter().zip(&results) {
                match result {
                    Ok(response) => println!(
                        "{} {} {} ({} bytes, {}ms)",
                        "✓".green(),
                        response.status.to_string().green(),
                        url,
                        response.bytes,
                        response.elapsed_ms
                    ),
                    Err(e) => println!("{} {} {}", "✗".red(), url, e.to_string().red()),
                }
            }
        }
    }

    let failures = results.iter().filter(|r| r.is_err()).count();
    eyre::ensure!(failures == 0, "{} of {} fetches failed", failures, urls.len());
    Ok(())
}

fn fetch_json_row(url: &str, result: &Result<FetchResponse, RequestError<FetchError>>) -> serde_json::Value {
    match result {
        Ok(response) => serde_json::to_value(response).unwrap_or_else(|_| serde_json::json!({ "url": url })),
        Err(e) => serde_json::json!({
            "url": url,
            "error": e.to_string(),
            "status": match e {
                RequestError::Operation(op) => op.status(),
                _ => None,
            },
        }),
    }
}

fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    print!("{}", config.to_yaml()?);
    Ok(())
}
