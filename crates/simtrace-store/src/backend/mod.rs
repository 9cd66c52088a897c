//! Backing store capability interface.
//!
//! [`EventBackend`] is the contract the store's upper layers program
//! against. Two implementations exist: [`RedisBackend`] for a networked
//! Redis-compatible store (`Dragonfly` in production) and
//! [`MemoryBackend`], the volatile in-process fallback. The implementation
//! is selected at construction time by a connectivity probe.
//!
//! Backends deal only in keys and bytes; key layout lives in
//! [`crate::index`] and serialization in [`crate::codec`].

mod memory;
mod redis;

pub use memory::MemoryBackend;
pub use redis::RedisBackend;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::index::{RemovePlan, WritePlan};

/// Which implementation is serving requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Networked Redis-compatible store.
    Redis,
    /// In-process volatile store.
    Memory,
}

impl BackendKind {
    /// Short name used in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Redis => "redis",
            Self::Memory => "memory",
        }
    }
}

/// Storage operations required by the event store.
///
/// All writes are idempotent on the event id: index writes have set
/// semantics, so re-applying a plan never duplicates an entry.
#[async_trait]
pub trait EventBackend: Send + Sync {
    /// Which implementation this is.
    fn kind(&self) -> BackendKind;

    /// Apply a write plan as one batch: stale index removals, index
    /// additions, registry and stream updates, then the primary record.
    async fn write(&self, plan: &WritePlan) -> Result<(), StoreError>;

    /// Fetch primary records by key. The result is positionally aligned
    /// with `keys`; missing or expired records are `None`.
    async fn fetch(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StoreError>;

    /// Members of an index set. A missing set is empty.
    async fn members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Event ids of a stream in append order.
    async fn stream_ids(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Remove a primary record and its index entries.
    async fn remove(&self, plan: &RemovePlan) -> Result<(), StoreError>;

    /// Publish a payload to remote subscribers of `channel`.
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), StoreError>;

    /// Release connections. The default does nothing.
    async fn shutdown(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
