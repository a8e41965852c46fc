//! lsc - logical session cache node
//!
//! Main entry point for the lsc CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{config, run, simulate};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// lsc - logical session cache node and workload simulator
#[derive(Parser)]
#[command(name = "lsc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Directory holding config.toml (default: platform config dir)
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a cache node until interrupted
    Run(run::RunArgs),

    /// Run a scripted session workload and print the cache statistics
    Simulate(simulate::SimulateArgs),

    /// Show or save the effective configuration
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = lsc_config::ConfigPaths::resolve(None, cli.config_dir.as_deref()).load();
    let logging = loaded.config.logging_or_default();

    // Console logs go to stderr so JSON output on stdout stays parseable
    let filter = if cli.verbose {
        "lsc=debug,lsc_cache=debug,lsc_config=debug,info"
    } else {
        "lsc=info,lsc_cache=info,warn"
    };

    let log_dir = logging
        .directory
        .clone()
        .or_else(|| {
            cli.config_dir
                .clone()
                .or_else(lsc_config::user_config_dir)
                .map(|d| d.join("logs"))
        })
        .unwrap_or_else(|| PathBuf::from("logs"));

    use tracing_subscriber::prelude::*;
    let (file_layer, _guard) = if logging.json {
        let file_appender = tracing_appender::rolling::daily(&log_dir, "lsc.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_filter(tracing_subscriber::EnvFilter::new(
                "lsc=trace,lsc_cache=trace,lsc_config=trace,info",
            ));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(file_layer)
        .init();

    for warning in loaded.warnings() {
        tracing::warn!("{warning}");
    }

    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
        loaded,
    };

    match cli.command {
        Commands::Run(args) => run::run(args, &ctx).await,
        Commands::Simulate(args) => simulate::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
