//! Error types for the event store.
//!
//! Internal operations propagate [`StoreError`]; the public facade on
//! [`crate::EventStore`] catches it at the operation's outer edge and
//! returns a plain value instead.

use fred::error::ErrorKind;

/// Errors that can occur in the event store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A Redis/`Dragonfly` operation failed.
    #[error("Redis error: {0}")]
    Redis(#[from] fred::error::Error),

    /// The backing store could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compressing or decompressing a payload failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// An event was rejected before it reached the backend.
    #[error("invalid event: {0}")]
    Validation(String),

    /// Query filters could not be turned into a lookup plan.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Whether this error means the backend itself is unreachable, as
    /// opposed to a bad request or a bad record.
    pub fn is_connection_failure(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::Redis(e) => matches!(
                e.kind(),
                ErrorKind::IO | ErrorKind::Timeout | ErrorKind::Canceled
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_classification() {
        assert!(StoreError::Connection("refused".to_owned()).is_connection_failure());
        assert!(
            StoreError::Redis(fred::error::Error::new(ErrorKind::IO, "reset"))
                .is_connection_failure()
        );
        assert!(
            !StoreError::Redis(fred::error::Error::new(ErrorKind::Parse, "bad"))
                .is_connection_failure()
        );
        assert!(!StoreError::Validation("empty".to_owned()).is_connection_failure());
    }
}
