//! Watch command - Keep the inventory fresh until interrupted
//!
//! Polls the node source on a fixed period. Each poll returns the current
//! snapshot at once; a stale snapshot starts a background refresh whose
//! result shows up on a later poll.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{debug, info};

use super::{create_source, print_info, print_warning};
use crate::GlobalOptions;

/// Arguments for the watch command
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Seconds between polls
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    poll: u64,

    /// Serve resources from a JSON fixture file instead of the API
    #[arg(long, value_name = "FILE")]
    fixture: Option<PathBuf>,
}

/// Execute the watch command
pub async fn execute(args: WatchArgs, global: GlobalOptions) -> Result<()> {
    let source = create_source(&global, args.fixture.as_deref())?;
    let reporter = source.spawn_metrics_reporter();

    let nodes = source.nodes().await.context("Initial refresh failed")?;
    print_info(
        &format!("Watching {} nodes, polling every {}s (Ctrl-C to stop)", nodes.len(), args.poll),
        global.quiet,
    );

    let mut last_seen = nodes;
    let mut ticker = tokio::time::interval(Duration::from_secs(args.poll));
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted");
                break;
            }
            _ = ticker.tick() => {
                let nodes = match source.nodes().await {
                    Ok(nodes) => nodes,
                    Err(e) => {
                        print_warning(&format!("{:#}", anyhow::Error::from(e)));
                        continue;
                    }
                };

                if let Some(err) = source.last_error() {
                    print_warning(&format!("serving stale nodes: {}", err));
                }

                if !Arc::ptr_eq(&nodes, &last_seen) {
                    info!(
                        node_count = nodes.len(),
                        refreshed_at = %nodes.refreshed_at().to_rfc3339(),
                        "Node set replaced"
                    );
                    println!("{} nodes at {}", nodes.len(), nodes.refreshed_at().to_rfc3339());
                    last_seen = nodes;
                }
            }
        }
    }

    if let Some(handle) = reporter {
        handle.abort();
    }
    source.shutdown().await;
    print_info("Stopped", global.quiet);

    Ok(())
}
