//! Host-facing node source.
//!
//! Validates configuration, builds the fetcher and the refresh orchestrator,
//! and exposes the current node set.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use cloudnodes_config::{keys, ConfigError, NodeSourceConfig};
use cloudnodes_core::{
    spawn_reporter, NamePattern, NodeSet, PipelineSettings, RefreshError, RefreshMetrics,
    RefreshOrchestrator, RefreshSettings, ResourceFetcher,
};

use crate::error::SourceError;
use crate::http::HttpFetcher;

fn compile(key: &str, pattern: &str) -> Result<NamePattern, ConfigError> {
    NamePattern::new(pattern).map_err(|e| {
        ConfigError::invalid_value(key, format!("'{}' is not a valid regex: {}", pattern, e))
    })
}

/// Derive orchestrator settings from a validated configuration.
pub fn refresh_settings(config: &NodeSourceConfig) -> Result<RefreshSettings, ConfigError> {
    let pipeline = PipelineSettings {
        username: config.node.username.clone(),
        endpoint: config.endpoint().to_string(),
        account_id: config.account.id.clone(),
        input_pattern: compile(keys::FILTER_INPUT_PATTERN, config.input_pattern()?)?,
        tag_pattern: compile(keys::FILTER_TAG_PATTERN, &config.filters.tag_pattern)?,
        tag_attributes: config.filters.tag_attributes,
    };

    Ok(RefreshSettings {
        interval_secs: config.interval_secs()?,
        cache_ttl_ms: config.refresh.cache_ttl_ms,
        full_fetch: config.refresh.full_fetch,
        pipeline,
    })
}

/// Node inventory for one account, kept fresh in the background.
#[derive(Clone)]
pub struct NodeSource {
    config: Arc<NodeSourceConfig>,
    orchestrator: RefreshOrchestrator,
}

impl NodeSource {
    /// Create a source talking to the configured API endpoint.
    pub fn from_config(config: NodeSourceConfig) -> Result<Self, SourceError> {
        config.validate()?;
        let fetcher = HttpFetcher::from_config(&config)?;
        Self::with_fetcher(config, Arc::new(fetcher))
    }

    /// Create a source from the flat property form used by plugin hosts.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self, SourceError> {
        Self::from_config(NodeSourceConfig::from_properties(properties)?)
    }

    /// Create a source with a specific fetcher.
    pub fn with_fetcher(
        config: NodeSourceConfig,
        fetcher: Arc<dyn ResourceFetcher>,
    ) -> Result<Self, SourceError> {
        config.validate()?;
        let settings = refresh_settings(&config)?;
        let metrics = Arc::new(RefreshMetrics::new());

        info!(
            account = %config.account.id,
            interval_secs = settings.interval_secs,
            full_fetch = settings.full_fetch,
            "Node source configured"
        );

        Ok(Self {
            config: Arc::new(config),
            orchestrator: RefreshOrchestrator::new(settings, fetcher, metrics),
        })
    }

    /// The current node set; waits only on the very first call.
    pub async fn nodes(&self) -> Result<Arc<NodeSet>, SourceError> {
        Ok(self.orchestrator.nodes().await?)
    }

    /// Run a refresh cycle now, ignoring staleness.
    pub async fn refresh(&self) -> Result<Arc<NodeSet>, SourceError> {
        Ok(self.orchestrator.refresh_now().await?)
    }

    /// The current node set without refreshing.
    pub fn snapshot(&self) -> Option<Arc<NodeSet>> {
        self.orchestrator.snapshot()
    }

    /// The last background refresh failure, if the latest cycle failed.
    pub fn last_error(&self) -> Option<Arc<RefreshError>> {
        self.orchestrator.last_error()
    }

    pub fn metrics(&self) -> &Arc<RefreshMetrics> {
        self.orchestrator.metrics()
    }

    pub fn config(&self) -> &NodeSourceConfig {
        &self.config
    }

    /// Start periodic metrics logging if `metrics.report_interval_mins` is set.
    pub fn spawn_metrics_reporter(&self) -> Option<JoinHandle<()>> {
        let every = self.config.report_interval()?;
        Some(spawn_reporter(Arc::clone(self.metrics()), every))
    }

    /// Wait for an in-flight background refresh to finish.
    pub async fn shutdown(&self) {
        self.orchestrator.join_background().await;
    }
}
