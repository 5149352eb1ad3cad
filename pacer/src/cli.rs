//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// Pacer - bounded queues and rate limits for bursty work
#[derive(Parser)]
#[command(
    name = "pacer",
    about = "Drive pacing primitives against synthetic workloads",
    version
)]
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
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Push synthetic items through an async queue and report the counters
    Simulate(SimulateArgs),

    /// Print the effective configuration
    Config {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Overrides for `pacer simulate`; unset flags fall back to the config file
#[derive(Debug, Default, clap::Args)]
pub struct SimulateArgs {
    /// Number of items to enqueue
    #[arg(short = 'n', long)]
    pub items: Option<usize>,

    /// Milliseconds each worker invocation takes
    #[arg(short, long)]
    pub duration_ms: Option<u64>,

    /// Random extra milliseconds per invocation
    #[arg(short, long)]
    pub jitter_ms: Option<u64>,

    /// Fail every item whose index is a multiple of K
    #[arg(long, value_name = "K")]
    pub fail_every: Option<usize>,

    /// Maximum concurrent worker invocations
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Maximum pending items
    #[arg(short, long)]
    pub max_size: Option<usize>,

    /// Milliseconds between dispatches
    #[arg(short, long)]
    pub wait_ms: Option<u64>,

    /// Dequeue newest first
    #[arg(long)]
    pub lifo: bool,

    /// Time-to-live for pending items in milliseconds
    #[arg(short, long)]
    pub expiration_ms: Option<u64>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Output format for reports
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
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
