//! plugdeps - runtime dependency loader for plugins
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use plugdeps::cli::{Cli, Commands};
use plugdeps::config::ConfigManager;
use plugdeps::error::PlugdepsResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            for failure in e.failures() {
                eprintln!("  {} {}: {}", style("•").red(), failure.coordinate, failure.error);
            }
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> PlugdepsResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let config = config_manager.load().await?;

    // Initialize logging: 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("plugdeps=warn"),
        1 => EnvFilter::new("plugdeps=info"),
        _ => EnvFilter::new("plugdeps=debug"),
    };

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .init();
    }
    debug!("Using config {}", config_manager.path().display());

    // Dispatch to command
    match cli.command {
        Commands::Resolve(args) => plugdeps::cli::commands::resolve(args, &config).await,
        Commands::Fetch(args) => plugdeps::cli::commands::fetch(args, &config).await,
        Commands::Config(args) => {
            plugdeps::cli::commands::config(args, &config_manager, &config).await
        }
        Commands::Cache(args) => plugdeps::cli::commands::cache(args, &config).await,
    }
}
