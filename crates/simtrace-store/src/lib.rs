//! Durable event store for simulation execution events.
//!
//! A networked Redis-compatible store (`Dragonfly` in production) holds
//! one primary record per event plus derived index sets. When the store is
//! unreachable, an in-process volatile backend takes over transparently.
//!
//! # Architecture
//!
//! ```text
//! producers --> EventStore::store_event
//!                  |-- PayloadCodec  (JSON, optional gzip/lz4)
//!                  |-- KeySpace      (primary + index + stream keys)
//!                  |-- EventBackend  (RedisBackend | MemoryBackend)
//!                  +-- Broadcaster   (local) + PUBLISH (remote)
//!
//! consumers --> EventStore::get_events / timeline / statistics
//!                  +-- index sets -> candidates -> batched fetch -> filter
//! ```
//!
//! # Modules
//!
//! - [`backend`] -- The [`EventBackend`] capability and its implementations
//! - [`codec`] -- Stored record format and compression
//! - [`index`] -- Key layout and index maintenance plans
//! - [`query`] -- Filters, timeline, and statistics
//! - [`retention`] -- Cleanup-by-age sweeps
//! - [`broadcast`] -- Live per-simulation fan-out
//! - [`metrics`] -- Operation counters
//! - [`config`] -- Store configuration
//! - [`error`] -- Shared error type

pub mod backend;
pub mod broadcast;
pub mod codec;
pub mod config;
pub mod error;
pub mod index;
pub mod metrics;
pub mod query;
pub mod retention;
pub mod store;

// Re-export primary types for convenience.
pub use backend::{BackendKind, EventBackend, MemoryBackend, RedisBackend};
pub use config::{Compression, StoreConfig};
pub use error::StoreError;
pub use metrics::MetricsSnapshot;
pub use query::EventFilter;
pub use store::EventStore;
