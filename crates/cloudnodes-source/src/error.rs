//! Node source error types.

use std::path::PathBuf;
use thiserror::Error;

use cloudnodes_config::ConfigError;
use cloudnodes_core::{FetchError, RefreshError};

/// Errors that can occur while building or querying a node source.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A refresh cycle failed
    #[error("refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    /// Fetcher construction or request failed
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Fixture file could not be read
    #[error("failed to read fixture '{path}': {source}")]
    FixtureRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Fixture file is not valid
    #[error("invalid fixture '{path}': {source}")]
    FixtureParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl SourceError {
    /// Create a FixtureRead error.
    pub fn fixture_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FixtureRead {
            path: path.into(),
            source,
        }
    }

    /// Create a FixtureParse error.
    pub fn fixture_parse(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::FixtureParse {
            path: path.into(),
            source,
        }
    }
}
