//! Resource fetcher trait definition.
//!
//! The fetcher is the only component that talks to the cloud management API.
//! The cache loaders call it; everything downstream reads the resource cache.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;

use crate::resource::{FetchScope, Resource, ResourceCollection, ResourceKind};

/// Errors raised while fetching resources.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The fetcher cannot list this kind in this scope
    #[error("{kind} resources cannot be fetched for {scope}")]
    UnsupportedScope { kind: ResourceKind, scope: FetchScope },

    /// Server answered with a non-success status
    #[error("request to '{url}' failed with status {status}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    /// Request timed out
    #[error("request to '{url}' timed out")]
    Timeout { url: String },

    /// Connection error
    #[error("connection failed: {0}")]
    Connection(String),

    /// Response body could not be turned into resources
    #[error("invalid response from '{url}': {message}")]
    Decode { url: String, message: String },

    /// Generic error with context
    #[error("{context}: {message}")]
    WithContext { context: String, message: String },
}

impl FetchError {
    /// Create an UnsupportedScope error.
    pub fn unsupported(kind: ResourceKind, scope: &FetchScope) -> Self {
        Self::UnsupportedScope {
            kind,
            scope: scope.clone(),
        }
    }

    /// Create a Status error.
    pub fn status(url: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            url: url.into(),
            status,
            message: message.into(),
        }
    }

    /// Create a Decode error.
    pub fn decode(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Add context to any error.
    pub fn with_context(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            message: message.into(),
        }
    }
}

/// Source of raw resources.
///
/// Given a kind and a scope, returns the matching resources keyed by href.
/// A scope with nothing in it yields an empty collection, not an error; this
/// includes an [`FetchScope::Href`] that does not resolve.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Fetch the resources of `kind` in `scope`.
    async fn fetch(
        &self,
        kind: ResourceKind,
        scope: &FetchScope,
    ) -> Result<ResourceCollection, FetchError>;
}

/// In-memory fetcher serving pre-registered collections.
///
/// `Href` scopes fall back to any registered collection of the same kind, so
/// single resources need not be registered twice. Every request is recorded.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    collections: HashMap<(ResourceKind, FetchScope), ResourceCollection>,
    requests: Mutex<Vec<(ResourceKind, FetchScope)>>,
}

impl MemoryFetcher {
    /// Create an empty fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register resources for a kind and scope (builder form).
    pub fn with(
        mut self,
        kind: ResourceKind,
        scope: FetchScope,
        resources: impl IntoIterator<Item = Resource>,
    ) -> Self {
        self.insert(kind, scope, resources);
        self
    }

    /// Register resources for a kind and scope, merging with earlier ones.
    pub fn insert(
        &mut self,
        kind: ResourceKind,
        scope: FetchScope,
        resources: impl IntoIterator<Item = Resource>,
    ) {
        let collection: ResourceCollection = resources.into_iter().collect();
        self.collections
            .entry((kind, scope))
            .or_default()
            .merge(collection);
    }

    /// Requests served so far, in order.
    pub fn requests(&self) -> Vec<(ResourceKind, FetchScope)> {
        self.requests.lock().clone()
    }

    /// Number of requests served for one kind.
    pub fn request_count(&self, kind: ResourceKind) -> usize {
        self.requests.lock().iter().filter(|(k, _)| *k == kind).count()
    }

    /// Forget recorded requests.
    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }

    fn find_by_href(&self, kind: ResourceKind, href: &str) -> Option<&Resource> {
        self.collections
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .find_map(|(_, collection)| collection.get(href))
    }
}

#[async_trait]
impl ResourceFetcher for MemoryFetcher {
    async fn fetch(
        &self,
        kind: ResourceKind,
        scope: &FetchScope,
    ) -> Result<ResourceCollection, FetchError> {
        self.requests.lock().push((kind, scope.clone()));

        if let Some(collection) = self.collections.get(&(kind, scope.clone())) {
            return Ok(collection.clone());
        }

        match scope {
            FetchScope::Href(href) => Ok(self
                .find_by_href(kind, href)
                .cloned()
                .into_iter()
                .collect()),
            _ => Ok(ResourceCollection::new()),
        }
    }
}
