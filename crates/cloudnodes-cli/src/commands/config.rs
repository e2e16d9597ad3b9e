//! Config command - View and manage configuration
//!
//! Provides commands for viewing and creating CloudNodes configuration:
//! - Show the effective configuration (secret redacted)
//! - Write a starter configuration file
//! - Show configuration file paths

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use cloudnodes_config::{ConfigLoader, NodeSourceConfig};
use serde::Serialize;

use super::load_config;
use crate::GlobalOptions;

const REDACTED: &str = "<redacted>";

/// Config management commands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show(ShowArgs),

    /// Write a starter configuration file
    Init(InitArgs),

    /// Show configuration file paths
    Path(PathArgs),
}

/// Arguments for the show command
#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Arguments for the init command
#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// File to create (defaults to --config, then the global config file)
    path: Option<PathBuf>,
}

/// Arguments for the path command
#[derive(clap::Args, Debug)]
pub struct PathArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Configuration paths
#[derive(Debug, Clone, Serialize)]
pub struct ConfigPaths {
    /// Global config file path
    pub global: Option<PathBuf>,
    /// Explicit config file path
    pub explicit: Option<PathBuf>,
    /// Whether global config exists
    pub global_exists: bool,
    /// Whether the explicit config exists
    pub explicit_exists: bool,
}

/// Execute the config command
pub async fn execute(cmd: ConfigCommand, global: GlobalOptions) -> Result<()> {
    match cmd {
        ConfigCommand::Show(args) => execute_show(args, global),
        ConfigCommand::Init(args) => execute_init(args, global),
        ConfigCommand::Path(args) => execute_path(args, global),
    }
}

fn execute_show(args: ShowArgs, global: GlobalOptions) -> Result<()> {
    let config = redacted(load_config(&global)?);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print!("{}", toml::to_string_pretty(&config)?);
    }

    if let Err(e) = config.validate() {
        eprintln!("warning: {}", e);
    }

    Ok(())
}

fn execute_init(args: InitArgs, global: GlobalOptions) -> Result<()> {
    let target = args.path.or(global.config);
    let existed = target.as_deref().is_some_and(|p| p.exists());

    let path = ConfigLoader::new()
        .init(target.as_deref())
        .context("Failed to write configuration")?;

    if existed {
        println!("Config already exists at {}", path.display());
    } else {
        println!("Wrote starter config to {}", path.display());
    }

    Ok(())
}

fn execute_path(args: PathArgs, global: GlobalOptions) -> Result<()> {
    let global_path = ConfigLoader::new().global_config_path();
    let paths = ConfigPaths {
        global_exists: global_path.as_deref().is_some_and(|p| p.exists()),
        global: global_path,
        explicit_exists: global.config.as_deref().is_some_and(|p| p.exists()),
        explicit: global.config,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&paths)?);
        return Ok(());
    }

    match paths.global {
        Some(ref p) => println!("global:   {} ({})", p.display(), presence(paths.global_exists)),
        None => println!("global:   <no home directory>"),
    }
    if let Some(ref p) = paths.explicit {
        println!("explicit: {} ({})", p.display(), presence(paths.explicit_exists));
    }

    Ok(())
}

fn redacted(mut config: NodeSourceConfig) -> NodeSourceConfig {
    if !config.account.secret.is_empty() {
        config.account.secret = REDACTED.to_string();
    }
    config
}

fn presence(exists: bool) -> &'static str {
    if exists {
        "exists"
    } else {
        "missing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_is_redacted() {
        let mut config = NodeSourceConfig::default();
        config.account.secret = "hunter2".to_string();

        let shown = toml::to_string_pretty(&redacted(config)).unwrap();
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains(REDACTED));
    }

    #[test]
    fn test_empty_secret_stays_empty() {
        let config = redacted(NodeSourceConfig::default());
        assert!(config.account.secret.is_empty());
    }
}
