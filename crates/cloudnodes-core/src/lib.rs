//! CloudNodes Core - cloud resource graph to flat node inventory
//!
//! This crate provides the core functionality for building a node inventory:
//! - Resource model and the `ResourceFetcher` seam to the management API
//! - Resource cache with minimal and full cache loaders
//! - Population pipeline merging servers, instances, links, inputs and tags
//! - Refresh orchestration with stale-while-revalidate and single-flight
//!   background refresh
//! - Injected refresh metrics

pub mod cache;
pub mod error;
pub mod fetcher;
pub mod filter;
pub mod loader;
pub mod metrics;
pub mod node;
pub mod populate;
pub mod refresh;
pub mod resource;

// Re-exports for convenience
pub use cache::{CacheMetrics, ResourceCache};
pub use error::RefreshError;
pub use fetcher::{FetchError, MemoryFetcher, ResourceFetcher};
pub use filter::NamePattern;
pub use loader::{loader_for, CacheLoader, FullLoader, MinimalLoader};
pub use metrics::{spawn_reporter, MetricsSnapshot, Phase, RefreshMetrics, TimerSnapshot};
pub use node::{Node, NodeSet};
pub use populate::{LinkHandler, LinkRelation, Pipeline, PipelineSettings, Populate};
pub use refresh::{needs_refresh, RefreshOrchestrator, RefreshSettings};
pub use resource::{FetchScope, Resource, ResourceCollection, ResourceKind};
