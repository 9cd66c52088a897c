//! Error types for replay.

use simtrace_store::StoreError;

/// Errors that can occur while starting or running a replay.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// The replay configuration is unusable.
    #[error("invalid replay configuration: {0}")]
    InvalidConfiguration(String),

    /// Fetching events from the store failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: StoreError,
    },
}
