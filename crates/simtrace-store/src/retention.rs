//! Retention sweeps.
//!
//! TTL set at write time is the primary expiry mechanism. These sweeps are
//! the secondary, out-of-band path for backends without native TTL (the
//! in-process fallback) and for manual cleanup. They never run on the
//! write path.
//!
//! On the in-process backend, reading a record whose TTL has lapsed also
//! detaches it from its index sets and stream, so a sweep leaves no
//! orphaned index entries behind even for records it does not count.

use chrono::{DateTime, Duration, Utc};

use crate::error::StoreError;
use crate::query::EventFilter;
use crate::store::EventStore;

impl EventStore {
    /// Remove every event older than `days_old` days, returning how many
    /// were removed. Failures are logged and yield `0`.
    pub async fn cleanup_old_events(&self, days_old: u32) -> u64 {
        let cutoff = Utc::now()
            .checked_sub_signed(Duration::days(i64::from(days_old)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        match self.cleanup_older_than(cutoff).await {
            Ok(removed) => removed,
            Err(e) => {
                self.metrics.record_query_error();
                tracing::warn!(days_old, error = %e, "Retention sweep failed");
                0
            }
        }
    }

    /// Remove every event with `timestamp < cutoff` (strictly older),
    /// including its index entries.
    ///
    /// A removal failure for one event is logged and the sweep continues.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the candidate lookup fails.
    pub async fn cleanup_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let filter = EventFilter::default().between(None, Some(cutoff));
        let expired: Vec<_> = self
            .fetch_matching(&filter, self.config.query_batch_size)
            .await?
            .into_iter()
            .filter(|event| event.timestamp < cutoff)
            .collect();

        let mut removed: u64 = 0;
        for event in &expired {
            let plan = self.keys.remove_plan(event);
            let plan = &plan;
            match self
                .run(|backend| async move { backend.remove(plan).await })
                .await
            {
                Ok(()) => removed = removed.saturating_add(1),
                Err(e) => {
                    tracing::warn!(
                        event_id = %event.event_id,
                        error = %e,
                        "Failed to remove expired event"
                    );
                }
            }
        }

        tracing::info!(removed, cutoff = %cutoff, "Retention sweep finished");
        Ok(removed)
    }
}
