//! CloudNodes CLI - cloud account node inventory
//!
//! A command-line interface for listing the nodes of a cloud account,
//! checking a configuration, and watching the inventory refresh.
//!
//! # Usage
//!
//! ```bash
//! # Write a starter configuration
//! cloudnodes config init
//!
//! # List nodes as YAML
//! cloudnodes nodes --format yaml
//!
//! # Validate configuration and run one refresh
//! cloudnodes check
//!
//! # Keep the inventory fresh and report metrics until Ctrl-C
//! cloudnodes watch --poll 30
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use cloudnodes_config::{ConfigOverrides, LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

mod commands;

/// CloudNodes - cloud resources as a flat node inventory
#[derive(Parser, Debug)]
#[command(name = "cloudnodes")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Path to configuration file
    #[arg(long, short = 'c', global = true, env = "CLOUDNODES_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Credential identity
    #[arg(long, global = true, env = "CLOUDNODES_IDENTITY")]
    identity: Option<String>,

    /// Credential secret
    #[arg(long, global = true, env = "CLOUDNODES_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// API endpoint URL
    #[arg(long, global = true, env = "CLOUDNODES_ENDPOINT")]
    endpoint: Option<String>,

    /// Seconds before the node set is stale (<= 0: always stale)
    #[arg(long, global = true, env = "CLOUDNODES_INTERVAL", allow_hyphen_values = true)]
    interval: Option<i64>,

    /// Fetch every resource kind instead of the minimal set
    #[arg(long, global = true)]
    full_fetch: bool,
}

impl GlobalOptions {
    /// Convert global options to config overrides
    pub fn to_config_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            identity: self.identity.clone(),
            secret: self.secret.clone(),
            endpoint: self.endpoint.clone(),
            interval_secs: self.interval,
            full_fetch: self.full_fetch.then_some(true),
            log_level: None,
        }
    }

    /// Log filter directive from the verbosity flags and configuration.
    fn log_level(&self, logging: &LoggingConfig) -> String {
        if self.quiet {
            "error".to_string()
        } else if self.verbose {
            "debug".to_string()
        } else {
            logging.level.clone()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Refresh once and print the node inventory
    Nodes(commands::nodes::NodesArgs),

    /// Validate configuration and test a refresh
    Check(commands::check::CheckArgs),

    /// Keep the inventory fresh and report metrics until interrupted
    Watch(commands::watch::WatchArgs),

    /// View and manage configuration
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),
}

fn init_logging(global: &GlobalOptions) -> Result<()> {
    // An unreadable config must not stop `config init` from running
    let logging = commands::load_config(global)
        .map(|config| config.logging)
        .unwrap_or_default();

    let level = global.log_level(&logging);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.with_ansi(true).try_init(),
    }
    .map_err(|e| anyhow::anyhow!(e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.global)?;

    match cli.command {
        Commands::Nodes(args) => commands::nodes::execute(args, cli.global).await,
        Commands::Check(args) => commands::check::execute(args, cli.global).await,
        Commands::Watch(args) => commands::watch::execute(args, cli.global).await,
        Commands::Config(cmd) => commands::config::execute(cmd, cli.global).await,
    }
}
