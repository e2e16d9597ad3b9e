//! Configuration loader with inheritance support.
//!
//! Loads configuration from multiple sources and merges them:
//! 1. Global config: `~/.cloudnodes/config.toml`
//! 2. Explicit config file
//! 3. CLI overrides
//!
//! Later sources override earlier ones, key by key.

use crate::error::ConfigError;
use crate::{ConfigOverrides, NodeSourceConfig};
use std::path::{Path, PathBuf};
use toml::Table;
use tracing::{debug, trace};

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Global configuration directory name.
const GLOBAL_CONFIG_DIR: &str = ".cloudnodes";

/// Starter file written by [`ConfigLoader::init`].
const STARTER_CONFIG: &str = r#"# CloudNodes configuration

[account]
identity = ""
secret = ""
id = ""
endpoint = "https://my.example.com"

[refresh]
# Seconds before the node set is considered stale (<= 0: always stale)
interval_secs = 300
# Fetch every resource kind instead of the minimal set
full_fetch = false
# Reuse clouds, images, ... fetched less than this many ms ago
cache_ttl_ms = 0
# fetch_timeout_ms = 30000

[filters]
# Inputs whose name fully matches become `input.<name>` attributes
input_pattern = ""
tag_pattern = ".*"
tag_attributes = false

[node]
username = ""

[metrics]
# report_interval_mins = 5

[logging]
level = "info"
format = "text"
"#;

/// Configuration loader with caching and inheritance support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Global config directory (e.g., `~/.cloudnodes`)
    global_config_dir: Option<PathBuf>,

    /// Cached global config table
    global_table: Option<Table>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    ///
    /// Automatically detects the global config directory (`~/.cloudnodes`).
    pub fn new() -> Self {
        let global_config_dir = dirs::home_dir().map(|h| h.join(GLOBAL_CONFIG_DIR));

        Self {
            global_config_dir,
            global_table: None,
        }
    }

    /// Create a loader with a custom global config directory.
    ///
    /// Useful for testing.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_config_dir: Some(global_dir.into()),
            global_table: None,
        }
    }

    /// Get the global config file path.
    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    /// Load configuration with an optional explicit file and CLI overrides.
    ///
    /// Merges config in order: global → explicit file → overrides. The
    /// result is not validated; call [`NodeSourceConfig::validate`].
    pub fn load(
        &mut self,
        config_path: Option<&Path>,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<NodeSourceConfig, ConfigError> {
        let mut table = self.load_global()?.unwrap_or_default();

        if let Some(path) = config_path {
            debug!("Loading config from {:?}", path);
            merge_tables(&mut table, read_table(path)?);
        }

        let mut config: NodeSourceConfig = toml::Value::Table(table)
            .try_into()
            .map_err(ConfigError::Decode)?;

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        Ok(config)
    }

    /// Load only the global configuration table.
    fn load_global(&mut self) -> Result<Option<Table>, ConfigError> {
        if let Some(ref table) = self.global_table {
            return Ok(Some(table.clone()));
        }

        let Some(global_path) = self.global_config_path() else {
            debug!("No home directory found, skipping global config");
            return Ok(None);
        };

        if !global_path.exists() {
            trace!("Global config not found at {:?}", global_path);
            return Ok(None);
        }

        debug!("Loading global config from {:?}", global_path);
        let table = read_table(&global_path)?;
        self.global_table = Some(table.clone());

        Ok(Some(table))
    }

    /// Save configuration to a file, creating parent directories.
    pub fn save(&self, path: &Path, config: &NodeSourceConfig) -> Result<(), ConfigError> {
        ensure_parent(path)?;
        let content = toml::to_string_pretty(config)?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
    }

    /// Write a commented starter configuration.
    ///
    /// Targets `path`, or the global config file when `path` is `None`.
    /// An existing file is left untouched.
    pub fn init(&self, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => self.global_config_path().ok_or(ConfigError::NoHomeDir)?,
        };

        if !config_path.exists() {
            ensure_parent(&config_path)?;
            std::fs::write(&config_path, STARTER_CONFIG)
                .map_err(|e| ConfigError::write_file(&config_path, e))?;
        }

        Ok(config_path)
    }

    /// Clear cached global configuration.
    ///
    /// Forces reload on next `load()` call.
    pub fn clear_cache(&mut self) {
        self.global_table = None;
    }
}

fn read_table(path: &Path) -> Result<Table, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    content
        .parse::<Table>()
        .map_err(|e| ConfigError::parse_toml(path, e))
}

fn ensure_parent(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
    }
    Ok(())
}

/// Merge `overlay` into `base`; nested tables merge key by key.
fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming)
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_default_config() {
        let temp = TempDir::new().unwrap();
        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        let config = loader.load(None, None).unwrap();

        assert_eq!(config.filters.tag_pattern, ".*");
        assert_eq!(config.refresh.interval_secs, None);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_file_overrides_global_per_key() {
        let temp = TempDir::new().unwrap();
        let global_dir = temp.path().join("global");
        write(
            &global_dir,
            "config.toml",
            r#"
            [account]
            identity = "global-user"
            secret = "global-secret"
            id = "1"

            [logging]
            level = "debug"
            "#,
        );
        let explicit = write(
            &temp.path().join("site"),
            "nodes.toml",
            r#"
            [account]
            id = "42"
            endpoint = "https://api.example.com"

            [refresh]
            interval_secs = 120
            "#,
        );

        let mut loader = ConfigLoader::with_global_dir(&global_dir);
        let config = loader.load(Some(&explicit), None).unwrap();

        assert_eq!(config.account.identity, "global-user");
        assert_eq!(config.account.secret, "global-secret");
        assert_eq!(config.account.id, "42");
        assert_eq!(config.account.endpoint, "https://api.example.com");
        assert_eq!(config.refresh.interval_secs, Some(120));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_overrides_all() {
        let temp = TempDir::new().unwrap();
        let explicit = write(
            temp.path(),
            "config.toml",
            r#"
            [refresh]
            interval_secs = 600
            "#,
        );

        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));
        let overrides = ConfigOverrides {
            interval_secs: Some(10),
            log_level: Some("trace".to_string()),
            ..Default::default()
        };

        let config = loader.load(Some(&explicit), Some(&overrides)).unwrap();

        assert_eq!(config.refresh.interval_secs, Some(10));
        assert_eq!(config.logging.level, "trace");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        let err = loader
            .load(Some(&temp.path().join("absent.toml")), None)
            .unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_type_mismatch_is_decode_error() {
        let temp = TempDir::new().unwrap();
        let explicit = write(
            temp.path(),
            "config.toml",
            r#"
            [refresh]
            interval_secs = "soon"
            "#,
        );

        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));
        let err = loader.load(Some(&explicit), None).unwrap_err();
        assert!(matches!(err, ConfigError::Decode(_)));
    }

    #[test]
    fn test_save_and_load_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");
        let loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        let mut config = NodeSourceConfig::default();
        config.account.id = "77".to_string();
        config.refresh.interval_secs = Some(45);
        loader.save(&path, &config).unwrap();

        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));
        let loaded = loader.load(Some(&path), None).unwrap();

        assert_eq!(loaded.account.id, "77");
        assert_eq!(loaded.refresh.interval_secs, Some(45));
    }

    #[test]
    fn test_init_writes_parseable_starter() {
        let temp = TempDir::new().unwrap();
        let loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        let config_path = loader.init(None).unwrap();

        assert!(config_path.exists());
        assert!(config_path.ends_with("global/config.toml"));
        let content = std::fs::read_to_string(&config_path).unwrap();
        let parsed: NodeSourceConfig = toml::from_str(&content).unwrap();
        assert_eq!(parsed.refresh.interval_secs, Some(300));
    }

    #[test]
    fn test_merge_tables_nested() {
        let mut base: Table = toml::from_str("[a]\nx = 1\ny = 2\n").unwrap();
        let overlay: Table = toml::from_str("[a]\ny = 3\n[b]\nz = 4\n").unwrap();

        merge_tables(&mut base, overlay);

        let expected: Table = toml::from_str("[a]\nx = 1\ny = 3\n[b]\nz = 4\n").unwrap();
        assert_eq!(base, expected);
    }

    #[test]
    fn test_cache_clearing() {
        let temp = TempDir::new().unwrap();
        let global_dir = temp.path().join("global");
        write(&global_dir, "config.toml", "[logging]\nlevel = \"debug\"\n");

        let mut loader = ConfigLoader::with_global_dir(&global_dir);
        let _ = loader.load(None, None).unwrap();
        assert!(loader.global_table.is_some());

        loader.clear_cache();
        assert!(loader.global_table.is_none());
    }
}
