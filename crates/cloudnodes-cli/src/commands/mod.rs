//! CLI command implementations
//!
//! This module contains all CloudNodes CLI command implementations.

pub mod check;
pub mod config;
pub mod nodes;
pub mod watch;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use cloudnodes_config::{ConfigLoader, NodeSourceConfig};
use cloudnodes_source::{FixtureFetcher, NodeSource};

use crate::GlobalOptions;

/// Load configuration: global file, then `--config`, then CLI overrides.
///
/// The result is not validated.
pub fn load_config(global: &GlobalOptions) -> Result<NodeSourceConfig> {
    let overrides = global.to_config_overrides();
    ConfigLoader::new()
        .load(global.config.as_deref(), Some(&overrides))
        .context("Failed to load configuration")
}

/// Create a node source, served from a fixture file when one is given.
pub fn create_source(global: &GlobalOptions, fixture: Option<&Path>) -> Result<NodeSource> {
    let config = load_config(global)?;

    let source = match fixture {
        Some(path) => {
            let fetcher = FixtureFetcher::load(path)?;
            NodeSource::with_fetcher(config, Arc::new(fetcher))
        }
        None => NodeSource::from_config(config),
    };

    source.context("Failed to create node source")
}

/// Print an info message (respects quiet flag).
pub fn print_info(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("{}", message);
    }
}

/// Print a warning message to stderr.
pub fn print_warning(message: &str) {
    eprintln!("warning: {}", message);
}
