//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::domain::Priority;
use crate::simulate::JobSpec;

/// rt - priority-ordered, concurrency-bounded request runner
#[derive(Parser, Debug)]
#[command(name = "rt", author, version, about = "Run requests through a throttling priority scheduler", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run synthetic jobs and show dispatch order and concurrency
    Simulate {
        /// Jobs as PRIORITY:MILLIS[:fail] (default: a mixed workload)
        #[arg(value_name = "JOB")]
        jobs: Vec<JobSpec>,

        /// Clear the queue this many milliseconds after submitting
        #[arg(long)]
        clear_after_ms: Option<u64>,

        /// Override the configured concurrency ceiling
        #[arg(short = 'j', long)]
        max_concurrent: Option<usize>,

        /// Override the configured inter-dispatch delay
        #[arg(short, long)]
        delay_ms: Option<u64>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Fetch URLs through the scheduler
    Fetch {
        /// URLs to GET
        #[arg(required = true)]
        urls: Vec<String>,

        /// Priority for every URL
        #[arg(short, long, default_value = "medium")]
        priority: Priority,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the effective configuration
    Config,
}

/// Output format for report commands
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
