//! Check command - Validate configuration and test a refresh

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use super::{create_source, load_config};
use crate::GlobalOptions;

/// Arguments for the check command
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Only validate the configuration, do not fetch
    #[arg(long)]
    offline: bool,

    /// Serve resources from a JSON fixture file instead of the API
    #[arg(long, value_name = "FILE")]
    fixture: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Result of a check run
#[derive(Debug, Serialize)]
struct CheckReport {
    account: String,
    endpoint: String,
    interval_secs: i64,
    strategy: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    node_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u128>,
}

/// Execute the check command
pub async fn execute(args: CheckArgs, global: GlobalOptions) -> Result<()> {
    let config = load_config(&global)?;
    config.validate().context("Invalid configuration")?;

    let mut report = CheckReport {
        account: config.account.id.clone(),
        endpoint: config.endpoint().to_string(),
        interval_secs: config.interval_secs()?,
        strategy: if config.refresh.full_fetch {
            "full"
        } else {
            "minimal"
        },
        node_count: None,
        duration_ms: None,
    };

    if !args.offline {
        let source = create_source(&global, args.fixture.as_deref())?;
        let started = Instant::now();
        let nodes = source.refresh().await.context("Refresh failed")?;
        report.node_count = Some(nodes.len());
        report.duration_ms = Some(started.elapsed().as_millis());
        source.shutdown().await;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Configuration OK");
    println!("  account:  {}", report.account);
    println!("  endpoint: {}", report.endpoint);
    println!("  interval: {}s", report.interval_secs);
    println!("  strategy: {}", report.strategy);
    if let (Some(count), Some(ms)) = (report.node_count, report.duration_ms) {
        println!("Refresh OK: {} nodes in {}ms", count, ms);
    }

    Ok(())
}
