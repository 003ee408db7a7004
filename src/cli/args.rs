//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// plugdeps - runtime dependency loader for plugins
///
/// Fetches Maven artifacts with mirror fallback, verifies them, caches them
/// and relocates their packages.
#[derive(Parser, Debug)]
#[command(name = "plugdeps")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "PLUGDEPS_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve a request file into local artifact paths
    Resolve(ResolveArgs),

    /// Fetch coordinates given on the command line
    Fetch(FetchArgs),

    /// Show or edit configuration
    Config(ConfigArgs),

    /// Inspect and manage the artifact cache
    Cache(CacheArgs),
}

/// Arguments for the resolve command
#[derive(Parser, Debug)]
pub struct ResolveArgs {
    /// Request file (TOML)
    pub request: PathBuf,

    /// Write a java @argfile with the resolved classpath
    #[arg(long)]
    pub classpath_file: Option<PathBuf>,

    /// Override the request's timeout (seconds)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Output format
    #[arg(short, long, default_value = "plain")]
    pub format: OutputFormat,
}

/// Arguments for the fetch command
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Coordinates (group:artifact:version[:classifier][@extension])
    #[arg(required = true)]
    pub coordinates: Vec<String>,

    /// Repository URL, tried in the order given (default: from config)
    #[arg(short, long)]
    pub repository: Vec<String>,

    /// Expected checksum; only valid with a single coordinate
    #[arg(long)]
    pub checksum: Option<String>,

    /// Also fetch runtime dependencies
    #[arg(short, long)]
    pub transitive: bool,

    /// Relocation rule (FROM=TO), repeatable
    #[arg(long, value_parser = parse_relocation)]
    pub relocate: Vec<(String, String)>,

    /// Output format
    #[arg(short, long, default_value = "plain")]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., download.max_concurrent)
        key: String,
        /// Value to set
        value: String,
    },
}

/// Output format for listings and results
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached artifacts
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show the cache directory
    Path,

    /// Remove one coordinate, including relocated copies and failure markers
    Invalidate {
        /// Coordinate to remove
        coordinate: String,
    },

    /// Remove everything from the cache
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Parse a relocation rule in FROM=TO format
fn parse_relocation(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid FROM=TO format: no '=' found in '{s}'"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}
