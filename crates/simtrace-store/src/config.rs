//! Store configuration.
//!
//! Every field has a default so a host can deserialize a partial `store:`
//! section (or nothing at all) and still get a working store.

use std::time::Duration;

use serde::Deserialize;

/// Payload compression applied before the TTL-bearing primary write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Store the JSON payload as-is.
    #[default]
    None,
    /// gzip (`flate2`).
    Gzip,
    /// LZ4 block format (`lz4_flex`).
    Lz4,
}

/// Connection, retention, and query settings for an [`crate::EventStore`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// Redis URL of the networked backing store.
    #[serde(default = "default_url")]
    pub url: String,

    /// Connections in the pool. Bounds concurrent in-flight operations.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Milliseconds allowed for establishing a connection.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Milliseconds allowed for a single command.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// TTL applied to primary records and index keys. `0` disables expiry.
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Payload compression.
    #[serde(default)]
    pub compression: Compression,

    /// Namespace prepended to every key and channel.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Number of primary records fetched per round-trip.
    #[serde(default = "default_query_batch_size")]
    pub query_batch_size: usize,

    /// Page size used when a query does not set a limit.
    #[serde(default = "default_query_limit")]
    pub default_query_limit: usize,

    /// Fall back to the in-process store when the networked store is
    /// unreachable. When `false`, an unreachable store is a hard error.
    #[serde(default = "default_fallback_to_memory")]
    pub fallback_to_memory: bool,
}

fn default_url() -> String {
    "redis://localhost:6379".to_owned()
}

const fn default_pool_size() -> usize {
    8
}

const fn default_connect_timeout_ms() -> u64 {
    2_000
}

const fn default_command_timeout_ms() -> u64 {
    5_000
}

const fn default_ttl_seconds() -> u64 {
    // 30 days
    2_592_000
}

fn default_key_prefix() -> String {
    "simtrace".to_owned()
}

const fn default_query_batch_size() -> usize {
    100
}

const fn default_query_limit() -> usize {
    1_000
}

const fn default_fallback_to_memory() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            pool_size: default_pool_size(),
            connect_timeout_ms: default_connect_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            ttl_seconds: default_ttl_seconds(),
            compression: Compression::default(),
            key_prefix: default_key_prefix(),
            query_batch_size: default_query_batch_size(),
            default_query_limit: default_query_limit(),
            fallback_to_memory: default_fallback_to_memory(),
        }
    }
}

impl StoreConfig {
    /// Connection timeout as a [`Duration`].
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Command timeout as a [`Duration`].
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// TTL in seconds as Redis expects it, or `None` when expiry is off.
    pub fn ttl(&self) -> Option<i64> {
        if self.ttl_seconds == 0 {
            None
        } else {
            Some(i64::try_from(self.ttl_seconds).unwrap_or(i64::MAX))
        }
    }

    /// Apply the `SIMTRACE_STORE_URL` and `SIMTRACE_POOL_SIZE` overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("SIMTRACE_STORE_URL") {
            self.url = url;
        }
        if let Some(size) = std::env::var("SIMTRACE_POOL_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            self.pool_size = size;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_section_uses_defaults() {
        let config: StoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.ttl(), Some(2_592_000));
    }

    #[test]
    fn compression_parses_lowercase() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"compression":"lz4","ttl_seconds":0}"#).unwrap();
        assert_eq!(config.compression, Compression::Lz4);
        assert_eq!(config.ttl(), None);
    }
}
