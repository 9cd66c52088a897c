//! Error types for the simtrace daemon binary.

/// Top-level error for the daemon.
///
/// Wraps every failure that can abort startup or shutdown so `main` can
/// propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: crate::config::ConfigError,
    },

    /// The event store could not be constructed.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: simtrace_store::StoreError,
    },

    /// Installing the shutdown signal handler failed.
    #[error("signal error: {source}")]
    Signal {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}
