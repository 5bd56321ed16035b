// CloudEngineered rate limiter - Main Entry Point
//
// `ce-ratelimit` runs the rate limiting HTTP service and inspects its
// configuration:
// - serve         start the HTTP server
// - limits        print the resolved quota table
// - check-config  validate the configuration file

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cloudengineered_ratelimit::config::Config;
use cloudengineered_ratelimit::rate_limit::QuotaTable;
use cloudengineered_ratelimit::{logging, server};
use std::path::PathBuf;
use tracing::info;

/// CloudEngineered tiered rate limiting service
#[derive(Parser, Debug)]
#[command(name = "ce-ratelimit")]
#[command(author = "CloudEngineered Contributors")]
#[command(version)]
#[command(about = "Tiered sliding-window rate limiting for CloudEngineered", long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Override the configured listen port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the resolved quota table
    Limits {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Validate the configuration and exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            Config::load_from_path(path)?
        }
        None => Config::load()?,
    };

    logging::init(&config.logging, args.verbose)?;

    match args.command {
        Commands::Serve { port } => {
            let mut config = config;
            if let Some(port) = port {
                config.server.port = port;
            }
            info!("CloudEngineered rate limiter v{} starting...", env!("CARGO_PKG_VERSION"));
            server::serve(config).await?;
        }
        Commands::Limits { json } => print_limits(&config, json)?,
        Commands::CheckConfig => {
            let source = args
                .config
                .unwrap_or_else(Config::config_path);
            println!("Configuration OK ({})", source.display());
            println!(
                "  rate limiting: {}, failure mode: {}, windows: {}s / {}s",
                if config.rate_limit.enabled { "enabled" } else { "disabled" },
                config.rate_limit.failure_mode,
                config.rate_limit.rate_window_secs,
                config.rate_limit.burst_window_secs,
            );
        }
    }

    Ok(())
}

fn print_limits(config: &Config, json: bool) -> Result<()> {
    let rows = QuotaTable::resolve(&config.rate_limit).rows();

    if json {
        let out = serde_json::to_string_pretty(&rows).context("Failed to serialize quotas")?;
        println!("{}", out);
        return Ok(());
    }

    println!(
        "{:<14} {:>8} {:>8} {:>8} {:>8} {:>8}",
        "TIER", "DEFAULT", "API", "SEARCH", "VIEW", "BURST"
    );
    for row in rows {
        println!(
            "{:<14} {:>8} {:>8} {:>8} {:>8} {:>8}",
            row.tier.as_str(),
            row.default,
            row.api,
            row.search,
            row.view,
            row.burst
        );
    }
    println!(
        "\nHourly limits per {}s window, burst per {}s window",
        config.rate_limit.rate_window_secs, config.rate_limit.burst_window_secs
    );
    Ok(())
}
