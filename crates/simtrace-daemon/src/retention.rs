//! Scheduled retention cleanup.
//!
//! Runs [`EventStore::cleanup_old_events`] every `interval_seconds`. The
//! first pass happens one full interval after startup, not immediately.

use std::sync::Arc;

use simtrace_store::EventStore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::config::RetentionConfig;

/// Spawn the cleanup loop. Returns `None` when retention is disabled.
pub fn spawn(store: Arc<EventStore>, config: &RetentionConfig) -> Option<JoinHandle<()>> {
    if !config.enabled {
        info!("Retention cleanup disabled");
        return None;
    }

    let period = config.interval();
    let max_age_days = config.max_age_days;
    info!(
        interval_seconds = period.as_secs(),
        max_age_days, "Retention cleanup scheduled"
    );

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = store.cleanup_old_events(max_age_days).await;
            if removed > 0 {
                info!(removed, max_age_days, "Retention pass removed expired events");
            } else {
                debug!(max_age_days, "Retention pass found nothing to remove");
            }
        }
    }))
}
