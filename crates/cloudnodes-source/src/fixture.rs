//! Fixture fetcher serving resources from a JSON file.
//!
//! The file is an array of entries, one per collection:
//!
//! ```json
//! [
//!   {"kind": "server", "scope": "account", "resources": [
//!     {"href": "/api/servers/1", "attributes": {"state": "operational"},
//!      "links": {"cloud": "/api/clouds/1", "current_instance": "/api/clouds/1/instances/A"}}
//!   ]},
//!   {"kind": "instance", "scope": {"cloud": "1"}, "resources": []}
//! ]
//! ```
//!
//! Resource ids default to the last segment of their href.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use cloudnodes_core::{
    FetchError, FetchScope, MemoryFetcher, Resource, ResourceCollection, ResourceFetcher,
    ResourceKind,
};

use crate::error::SourceError;

#[derive(Debug, Deserialize)]
struct FixtureEntry {
    kind: ResourceKind,
    scope: FetchScope,
    #[serde(default)]
    resources: Vec<Resource>,
}

/// Offline fetcher backed by a fixture file.
#[derive(Debug)]
pub struct FixtureFetcher {
    path: PathBuf,
    inner: MemoryFetcher,
}

impl FixtureFetcher {
    /// Load a fixture file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| SourceError::fixture_read(path, e))?;
        Self::parse(path, &content)
    }

    /// Parse fixture content; `path` is only used in errors.
    pub fn parse(path: impl Into<PathBuf>, content: &str) -> Result<Self, SourceError> {
        let path = path.into();
        let entries: Vec<FixtureEntry> =
            serde_json::from_str(content).map_err(|e| SourceError::fixture_parse(&path, e))?;

        let mut inner = MemoryFetcher::new();
        for entry in entries {
            debug!(
                kind = %entry.kind,
                scope = %entry.scope,
                count = entry.resources.len(),
                "Loaded fixture collection"
            );
            inner.insert(
                entry.kind,
                entry.scope,
                entry.resources.into_iter().map(Resource::with_derived_id),
            );
        }

        Ok(Self { path, inner })
    }

    /// The fixture file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ResourceFetcher for FixtureFetcher {
    async fn fetch(
        &self,
        kind: ResourceKind,
        scope: &FetchScope,
    ) -> Result<ResourceCollection, FetchError> {
        self.inner.fetch(kind, scope).await
    }
}
