//! CloudNodes Source - host-facing node inventory
//!
//! Ties configuration, fetchers and the refresh orchestrator together:
//! - [`NodeSource`]: validated configuration in, current node set out
//! - [`HttpFetcher`]: fetches resources from the cloud management API
//! - [`FixtureFetcher`]: serves resources from a JSON file for offline use
//!
//! # Example
//!
//! ```ignore
//! use cloudnodes_config::ConfigLoader;
//! use cloudnodes_source::NodeSource;
//!
//! let config = ConfigLoader::new().load(None, None)?;
//! let source = NodeSource::from_config(config)?;
//! for node in source.nodes().await?.iter() {
//!     println!("{}", node.name);
//! }
//! ```

pub mod error;
pub mod fixture;
pub mod http;
pub mod source;

pub use error::SourceError;
pub use fixture::FixtureFetcher;
pub use http::{HttpFetcher, HttpFetcherConfig};
pub use source::{refresh_settings, NodeSource};
