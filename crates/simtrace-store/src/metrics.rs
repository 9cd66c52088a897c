//! Lock-free operation counters.
//!
//! Swallowed failures are never silent: every public operation that
//! catches an error bumps one of these counters before returning.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Shared counters updated by the store.
#[derive(Debug, Default)]
pub struct StoreMetrics {
    stored: AtomicU64,
    store_errors: AtomicU64,
    query_errors: AtomicU64,
    decode_errors: AtomicU64,
    publish_errors: AtomicU64,
    fallback_activations: AtomicU64,
}

/// Point-in-time copy of [`StoreMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Events written successfully.
    pub stored: u64,
    /// Rejected or failed writes.
    pub store_errors: u64,
    /// Queries that returned an empty result because of an error.
    pub query_errors: u64,
    /// Records dropped from results because they could not be decoded.
    pub decode_errors: u64,
    /// Failed remote publishes.
    pub publish_errors: u64,
    /// Times the store switched to the in-process fallback.
    pub fallback_activations: u64,
}

impl StoreMetrics {
    pub(crate) fn record_stored(&self) {
        self.stored.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_query_error(&self) {
        self.query_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_publish_error(&self) {
        self.publish_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fallback(&self) {
        self.fallback_activations.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            stored: self.stored.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            query_errors: self.query_errors.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            publish_errors: self.publish_errors.load(Ordering::Relaxed),
            fallback_activations: self.fallback_activations.load(Ordering::Relaxed),
        }
    }
}
