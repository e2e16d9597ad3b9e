//! CloudNodes Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.cloudnodes/config.toml`
//! - An explicit config file (e.g. passed with `--config`)
//! - CLI overrides via `ConfigOverrides`
//! - The flat `key -> value` property map handed over by plugin hosts
//!
//! Configuration is merged in order: global → explicit file → CLI overrides,
//! and validated eagerly before any resource is fetched.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Dotted configuration keys, shared by the TOML layout and the flat property form.
pub mod keys {
    pub const ACCOUNT_IDENTITY: &str = "account.identity";
    pub const ACCOUNT_SECRET: &str = "account.secret";
    pub const ACCOUNT_ID: &str = "account.id";
    pub const ACCOUNT_ENDPOINT: &str = "account.endpoint";
    pub const REFRESH_INTERVAL: &str = "refresh.interval_secs";
    pub const REFRESH_FULL_FETCH: &str = "refresh.full_fetch";
    pub const REFRESH_FETCH_TIMEOUT: &str = "refresh.fetch_timeout_ms";
    pub const REFRESH_CACHE_TTL: &str = "refresh.cache_ttl_ms";
    pub const FILTER_INPUT_PATTERN: &str = "filters.input_pattern";
    pub const FILTER_TAG_PATTERN: &str = "filters.tag_pattern";
    pub const FILTER_TAG_ATTRIBUTES: &str = "filters.tag_attributes";
    pub const NODE_USERNAME: &str = "node.username";
    pub const METRICS_REPORT_INTERVAL: &str = "metrics.report_interval_mins";
    pub const LOGGING_LEVEL: &str = "logging.level";
    pub const LOGGING_FORMAT: &str = "logging.format";
}

/// Default tag filter: every tag name passes.
pub const DEFAULT_TAG_PATTERN: &str = ".*";

/// Longest accepted metrics reporting period: one week.
pub const MAX_REPORT_INTERVAL_MINS: u64 = 7 * 24 * 60;

/// Root configuration for a node source.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NodeSourceConfig {
    /// Account credentials and API endpoint
    pub account: AccountConfig,

    /// Refresh and cache behaviour
    pub refresh: RefreshConfig,

    /// Input and tag filters
    pub filters: FilterConfig,

    /// Node defaults
    pub node: NodeConfig,

    /// Metrics reporting
    pub metrics: MetricsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Account credentials and the API endpoint.
#[derive(Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AccountConfig {
    /// Credential identity (user or key id)
    pub identity: String,

    /// Credential secret
    pub secret: String,

    /// Account identifier scoping every fetch
    pub id: String,

    /// API base URL, also the base of node edit URLs
    pub endpoint: String,
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Refresh and cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RefreshConfig {
    /// Seconds after which the node set is stale (<= 0: always stale)
    pub interval_secs: Option<i64>,

    /// Fetch every resource kind instead of the minimal set
    pub full_fetch: bool,

    /// Per-request fetch timeout in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_timeout_ms: Option<u64>,

    /// Resource cache time-to-live in milliseconds (<= 0: never fresh)
    pub cache_ttl_ms: i64,
}

/// Input and tag filter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Inputs whose name fully matches this pattern become node attributes
    pub input_pattern: Option<String>,

    /// Tags whose name fully matches this pattern are kept
    pub tag_pattern: String,

    /// Turn `key=value` tags into node attributes
    pub tag_attributes: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            input_pattern: None,
            tag_pattern: DEFAULT_TAG_PATTERN.to_string(),
            tag_attributes: false,
        }
    }
}

/// Node defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NodeConfig {
    /// Login username set on every node
    pub username: String,
}

/// Metrics reporting configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MetricsConfig {
    /// Dump metrics every N minutes (unset or 0: disabled)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_interval_mins: Option<u64>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON structured logging
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::invalid_value(
                keys::LOGGING_FORMAT,
                format!("unknown log format '{}'. Valid values: text, json", other),
            )),
        }
    }
}

/// CLI overrides for configuration values.
///
/// Used to apply command-line arguments (and their environment fallbacks)
/// over file-based config.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override credential identity
    pub identity: Option<String>,

    /// Override credential secret
    pub secret: Option<String>,

    /// Override API endpoint
    pub endpoint: Option<String>,

    /// Override refresh interval
    pub interval_secs: Option<i64>,

    /// Force the full fetch strategy
    pub full_fetch: Option<bool>,

    /// Override log level
    pub log_level: Option<String>,
}

impl NodeSourceConfig {
    /// Apply CLI overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref identity) = overrides.identity {
            self.account.identity = identity.clone();
        }

        if let Some(ref secret) = overrides.secret {
            self.account.secret = secret.clone();
        }

        if let Some(ref endpoint) = overrides.endpoint {
            self.account.endpoint = endpoint.clone();
        }

        if let Some(interval) = overrides.interval_secs {
            self.refresh.interval_secs = Some(interval);
        }

        if let Some(full_fetch) = overrides.full_fetch {
            self.refresh.full_fetch = full_fetch;
        }

        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Build a configuration from the flat property map a plugin host provides.
    ///
    /// Keys are the dotted names in [`keys`]. Unknown keys are ignored. The
    /// result is validated before it is returned.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for (key, value) in properties {
            match key.as_str() {
                keys::ACCOUNT_IDENTITY => config.account.identity = value.clone(),
                keys::ACCOUNT_SECRET => config.account.secret = value.clone(),
                keys::ACCOUNT_ID => config.account.id = value.clone(),
                keys::ACCOUNT_ENDPOINT => config.account.endpoint = value.clone(),
                keys::REFRESH_INTERVAL => {
                    config.refresh.interval_secs = Some(parse_number(key, value)?)
                }
                keys::REFRESH_FULL_FETCH => config.refresh.full_fetch = parse_bool(key, value)?,
                keys::REFRESH_FETCH_TIMEOUT => {
                    config.refresh.fetch_timeout_ms = optional_number(key, value)?
                }
                keys::REFRESH_CACHE_TTL => config.refresh.cache_ttl_ms = parse_number(key, value)?,
                keys::FILTER_INPUT_PATTERN => config.filters.input_pattern = Some(value.clone()),
                keys::FILTER_TAG_PATTERN => {
                    if !value.trim().is_empty() {
                        config.filters.tag_pattern = value.clone();
                    }
                }
                keys::FILTER_TAG_ATTRIBUTES => {
                    config.filters.tag_attributes = parse_bool(key, value)?
                }
                keys::NODE_USERNAME => config.node.username = value.clone(),
                keys::METRICS_REPORT_INTERVAL => {
                    config.metrics.report_interval_mins = optional_number(key, value)?
                }
                keys::LOGGING_LEVEL => config.logging.level = value.clone(),
                keys::LOGGING_FORMAT => config.logging.format = value.parse()?,
                _ => tracing::debug!("Ignoring unknown configuration property '{}'", key),
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Checks every required key is present and every pattern compiles.
    /// The error names the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(keys::ACCOUNT_IDENTITY, &self.account.identity)?;
        require(keys::ACCOUNT_SECRET, &self.account.secret)?;
        require(keys::ACCOUNT_ID, &self.account.id)?;

        if self.refresh.interval_secs.is_none() {
            return Err(ConfigError::missing(keys::REFRESH_INTERVAL));
        }

        match self.filters.input_pattern.as_deref() {
            None => return Err(ConfigError::missing(keys::FILTER_INPUT_PATTERN)),
            Some(pattern) => check_pattern(keys::FILTER_INPUT_PATTERN, pattern)?,
        }
        check_pattern(keys::FILTER_TAG_PATTERN, &self.filters.tag_pattern)?;

        require(keys::ACCOUNT_ENDPOINT, &self.account.endpoint)?;
        let endpoint = self.account.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ConfigError::invalid_value(
                keys::ACCOUNT_ENDPOINT,
                format!("'{}' is not an http(s) URL", endpoint),
            ));
        }

        require(keys::NODE_USERNAME, &self.node.username)?;

        if self.refresh.fetch_timeout_ms == Some(0) {
            return Err(ConfigError::invalid_value(
                keys::REFRESH_FETCH_TIMEOUT,
                "'0' must be greater than zero",
            ));
        }

        if let Some(mins) = self.metrics.report_interval_mins {
            if mins > MAX_REPORT_INTERVAL_MINS {
                return Err(ConfigError::invalid_value(
                    keys::METRICS_REPORT_INTERVAL,
                    format!("'{}' exceeds the maximum of {} minutes", mins, MAX_REPORT_INTERVAL_MINS),
                ));
            }
        }

        Ok(())
    }

    /// The configured refresh interval in seconds.
    pub fn interval_secs(&self) -> Result<i64, ConfigError> {
        self.refresh
            .interval_secs
            .ok_or_else(|| ConfigError::missing(keys::REFRESH_INTERVAL))
    }

    /// The configured input filter pattern.
    pub fn input_pattern(&self) -> Result<&str, ConfigError> {
        self.filters
            .input_pattern
            .as_deref()
            .ok_or_else(|| ConfigError::missing(keys::FILTER_INPUT_PATTERN))
    }

    /// Per-request fetch timeout, if configured.
    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.refresh.fetch_timeout_ms.map(Duration::from_millis)
    }

    /// Metrics reporting period, if reporting is enabled.
    pub fn report_interval(&self) -> Option<Duration> {
        self.metrics
            .report_interval_mins
            .filter(|mins| *mins > 0)
            .map(|mins| Duration::from_secs(mins.min(MAX_REPORT_INTERVAL_MINS) * 60))
    }

    /// Endpoint without a trailing slash.
    pub fn endpoint(&self) -> &str {
        self.account.endpoint.trim().trim_end_matches('/')
    }
}

/// Path of the global configuration file, if a home directory exists.
pub fn global_config_path() -> Option<PathBuf> {
    ConfigLoader::new().global_config_path()
}

fn require(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::missing(key))
    } else {
        Ok(())
    }
}

fn check_pattern(key: &str, pattern: &str) -> Result<(), ConfigError> {
    Regex::new(&format!("^(?:{})$", pattern))
        .map(|_| ())
        .map_err(|e| ConfigError::invalid_value(key, format!("'{}' is not a valid regex: {}", pattern, e)))
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| {
        ConfigError::invalid_value(key, format!("'{}' is not a valid integer", value))
    })
}

fn optional_number<T: FromStr>(key: &str, value: &str) -> Result<Option<T>, ConfigError> {
    if value.trim().is_empty() {
        Ok(None)
    } else {
        parse_number(key, value).map(Some)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" | "" => Ok(false),
        _ => Err(ConfigError::invalid_value(
            key,
            format!("'{}' is not a valid boolean", value),
        )),
    }
}
