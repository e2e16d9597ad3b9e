//! Error types for refresh cycles.

use thiserror::Error;

use crate::fetcher::FetchError;

/// Errors that abort a refresh cycle.
#[derive(Error, Debug)]
pub enum RefreshError {
    /// Fetching resources failed
    #[error("failed to load resources: {0}")]
    Fetch(#[from] FetchError),

    /// An operational server points at data that is not there
    #[error("data integrity error on server '{server}': {message}")]
    DataIntegrity { server: String, message: String },
}

impl RefreshError {
    /// Create a DataIntegrity error.
    pub fn data_integrity(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DataIntegrity {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Whether this error came from the fetcher rather than the data.
    pub fn is_fetch(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }
}
