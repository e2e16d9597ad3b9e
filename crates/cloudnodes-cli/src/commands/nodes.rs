//! Nodes command - Refresh once and print the node inventory

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use cloudnodes_core::NodeSet;

use super::{create_source, print_info};
use crate::GlobalOptions;

/// Output format for the node inventory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One block per node
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
    /// YAML document
    Yaml,
}

/// Arguments for the nodes command
#[derive(Args, Debug)]
pub struct NodesArgs {
    /// Output format
    #[arg(long, short = 'f', value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Serve resources from a JSON fixture file instead of the API
    #[arg(long, value_name = "FILE")]
    fixture: Option<PathBuf>,
}

/// Execute the nodes command
pub async fn execute(args: NodesArgs, global: GlobalOptions) -> Result<()> {
    let source = create_source(&global, args.fixture.as_deref())?;
    let nodes = source.nodes().await.context("Failed to build node inventory")?;

    println!("{}", render(&nodes, args.format)?);
    print_info(
        &format!(
            "{} nodes, refreshed at {}",
            nodes.len(),
            nodes.refreshed_at().to_rfc3339()
        ),
        global.quiet,
    );

    source.shutdown().await;
    Ok(())
}

/// Render a node set in the requested format.
pub fn render(nodes: &NodeSet, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(nodes)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(nodes)?),
        OutputFormat::Text => Ok(render_text(nodes)),
    }
}

fn render_text(nodes: &NodeSet) -> String {
    let mut out = String::new();
    for node in nodes.iter() {
        out.push_str(&node.name);
        out.push('\n');
        for (name, value) in &node.attributes {
            out.push_str(&format!("  {}: {}\n", name, value));
        }
        if !node.tags.is_empty() {
            let tags: Vec<&str> = node.tags.iter().map(String::as_str).collect();
            out.push_str(&format!("  tags: {}\n", tags.join(", ")));
        }
    }
    out.trim_end().to_string()
}
