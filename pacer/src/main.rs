//! Pacer - pacing primitives
//!
//! CLI entry point for running synthetic workloads through a queue.

use clap::Parser;
use eyre::{Context, Result};
use tracing::{debug, info};

use pacer::cli::{Cli, Command, OutputFormat, SimulateArgs};
use pacer::config::Config;
use pacer::simulate;

fn parse_level(level_str: Option<&str>) -> tracing::Level {
    let Some(s) = level_str else {
        return tracing::Level::WARN;
    };
    match s.to_uppercase().as_str() {
        "TRACE" => tracing::Level::TRACE,
        "DEBUG" => tracing::Level::DEBUG,
        "INFO" => tracing::Level::INFO,
        "WARN" | "WARNING" => tracing::Level::WARN,
        "ERROR" => tracing::Level::ERROR,
        _ => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to WARN", s);
            tracing::Level::WARN
        }
    }
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Priority: CLI --log-level > config file > WARN
    let level = parse_level(cli_log_level.or(config_log_level));

    // stderr keeps stdout clean for --format json
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to install tracing subscriber: {}", e))?;

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Simulate(args)) => cmd_simulate(&config, &args).await,
        Some(Command::Config { format }) => cmd_config(&config, format),
        None => cmd_simulate(&config, &SimulateArgs::default()).await,
    }
}

async fn cmd_simulate(config: &Config, args: &SimulateArgs) -> Result<()> {
    debug!(?args, "cmd_simulate: called");
    let (queue, simulation) = simulate::resolve(args, config);
    queue.validate().context("Invalid queue settings")?;

    let report = simulate::run(queue, simulation).await?;
    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
            println!("{}", json);
        }
        OutputFormat::Text => print!("{}", report.render_text()),
    }
    Ok(())
}

fn cmd_config(config: &Config, format: OutputFormat) -> Result<()> {
    debug!(%format, "cmd_config: called");
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(config).context("Failed to serialize config")?,
        OutputFormat::Text => serde_yaml::to_string(config).context("Failed to serialize config")?,
    };
    println!("{}", rendered.trim_end());
    Ok(())
}
