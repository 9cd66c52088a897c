//! Replay engine.
//!
//! Replays a filtered, time-ordered event sequence to a [`ReplaySink`],
//! reproducing the gaps between consecutive events scaled by the speed
//! multiplier:
//!
//! ```text
//! delay(n) = (timestamp(n) - timestamp(n-1)) / speed_multiplier
//! ```
//!
//! Delivery is best-effort. A failing or panicking sink loses that one
//! event; the replay moves on.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use simtrace_store::{EventFilter, EventStore};
use simtrace_types::{Event, EventType, ReplayConfiguration};
use tracing::{debug, info, warn};

use crate::error::ReplayError;
use crate::sink::ReplaySink;

/// Replay limits applied when a configuration leaves them unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ReplayDefaults {
    /// Cap on delivered events when `max_events` is unset.
    #[serde(default = "default_max_events")]
    pub default_max_events: usize,
}

const fn default_max_events() -> usize {
    10_000
}

impl Default for ReplayDefaults {
    fn default() -> Self {
        Self {
            default_max_events: default_max_events(),
        }
    }
}

/// Liveness and progress hooks for a running replay.
///
/// The engine consults [`ReplayControl::is_live`] before every delivery,
/// after any suspension, so stopping is cooperative: a replay notices it
/// was stopped at its next suspension point.
pub trait ReplayControl: Send + Sync {
    /// Whether the replay should keep going.
    fn is_live(&self) -> bool;

    /// Called after each delivery attempt.
    fn on_delivered(&self) {}
}

/// Control for replays nobody can stop.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unstoppable;

impl ReplayControl for Unstoppable {
    fn is_live(&self) -> bool {
        true
    }
}

/// Summary of a finished replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayOutcome {
    /// Events handed to the sink.
    pub delivered: u64,
    /// Deliveries where the sink failed or panicked.
    pub sink_failures: u64,
    /// Whether the replay ended because it was stopped.
    pub stopped: bool,
}

impl ReplayOutcome {
    /// Number of events delivered.
    pub const fn count(&self) -> u64 {
        self.delivered
    }
}

/// Replays stored events with real-time pacing.
#[derive(Debug)]
pub struct ReplayEngine {
    store: Arc<EventStore>,
    defaults: ReplayDefaults,
}

impl ReplayEngine {
    /// Create an engine reading from `store`.
    pub const fn new(store: Arc<EventStore>, defaults: ReplayDefaults) -> Self {
        Self { store, defaults }
    }

    /// The store events are replayed from.
    pub const fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    /// Replay the events selected by `config` to `sink` and return how many
    /// were delivered.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::InvalidConfiguration`] for an unusable
    /// configuration or [`ReplayError::Store`] if events cannot be fetched.
    pub async fn replay_events(
        &self,
        config: &ReplayConfiguration,
        sink: &mut dyn ReplaySink,
    ) -> Result<ReplayOutcome, ReplayError> {
        self.replay_with_control(config, sink, &Unstoppable).await
    }

    /// Like [`Self::replay_events`], checking `control` before every
    /// delivery.
    ///
    /// # Errors
    ///
    /// See [`Self::replay_events`].
    pub async fn replay_with_control(
        &self,
        config: &ReplayConfiguration,
        sink: &mut dyn ReplaySink,
        control: &dyn ReplayControl,
    ) -> Result<ReplayOutcome, ReplayError> {
        validate(config)?;
        let cap = self.cap(config);
        let events = self.load(config, cap).await?;

        info!(
            simulation_id = config.simulation_id,
            events = events.len(),
            speed_multiplier = config.speed_multiplier,
            "Replay starting"
        );

        let mut outcome = ReplayOutcome::default();
        let mut previous: Option<DateTime<Utc>> = None;
        for event in &events {
            if let Some(prev) = previous {
                let delay = scaled_delay(prev, event.timestamp, config.speed_multiplier);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            if !control.is_live() {
                outcome.stopped = true;
                break;
            }
            previous = Some(event.timestamp);

            if !deliver(sink, event) {
                outcome.sink_failures = outcome.sink_failures.saturating_add(1);
            }
            outcome.delivered = outcome.delivered.saturating_add(1);
            control.on_delivered();
        }

        info!(
            simulation_id = config.simulation_id,
            delivered = outcome.delivered,
            sink_failures = outcome.sink_failures,
            stopped = outcome.stopped,
            "Replay finished"
        );
        Ok(outcome)
    }

    fn cap(&self, config: &ReplayConfiguration) -> usize {
        config.max_events.unwrap_or(self.defaults.default_max_events)
    }

    /// Load up to `cap` deliverable events in timestamp order.
    ///
    /// One scan of the candidate set, reading primary records
    /// `batch_size` at a time. System events are excluded through the type
    /// filter so they never count toward the cap.
    async fn load(
        &self,
        config: &ReplayConfiguration,
        cap: usize,
    ) -> Result<Vec<Event>, ReplayError> {
        let Some(event_types) = replay_types(config) else {
            return Ok(Vec::new());
        };
        let mut filter = EventFilter::simulation(config.simulation_id.clone())
            .between(config.start_time, config.end_time)
            .limit(cap);
        filter.event_types = event_types;
        filter.tags.clone_from(&config.tags);

        let events = self
            .store
            .try_scan_events(&filter, config.batch_size)
            .await?;

        debug!(
            simulation_id = config.simulation_id,
            loaded = events.len(),
            cap,
            "Loaded replay events"
        );
        Ok(events)
    }
}

/// The type filter a replay queries with: `Some(None)` for no restriction,
/// `None` when nothing can match.
fn replay_types(config: &ReplayConfiguration) -> Option<Option<Vec<EventType>>> {
    let requested = config.event_types.clone().filter(|t| !t.is_empty());
    if config.include_system_events {
        return Some(requested);
    }
    let types: Vec<EventType> = requested
        .unwrap_or_else(|| EventType::ALL.to_vec())
        .into_iter()
        .filter(|t| !t.is_system())
        .collect();
    if types.is_empty() { None } else { Some(Some(types)) }
}

/// Reject configurations the engine cannot run.
///
/// # Errors
///
/// Returns [`ReplayError::InvalidConfiguration`] for a blank simulation id,
/// a non-positive or non-finite speed, a zero batch size, or an inverted
/// time window.
pub fn validate(config: &ReplayConfiguration) -> Result<(), ReplayError> {
    if config.simulation_id.trim().is_empty() {
        return Err(ReplayError::InvalidConfiguration(
            "simulation_id is required".to_owned(),
        ));
    }
    if !config.speed_multiplier.is_finite() || config.speed_multiplier <= 0.0 {
        return Err(ReplayError::InvalidConfiguration(format!(
            "speed_multiplier must be positive, got {}",
            config.speed_multiplier
        )));
    }
    if config.batch_size == 0 {
        return Err(ReplayError::InvalidConfiguration(
            "batch_size must be at least 1".to_owned(),
        ));
    }
    if let (Some(start), Some(end)) = (config.start_time, config.end_time) {
        if start > end {
            return Err(ReplayError::InvalidConfiguration(format!(
                "start_time {start} is after end_time {end}"
            )));
        }
    }
    Ok(())
}

/// Gap between two timestamps divided by `speed`. Non-positive gaps and
/// unrepresentable results are zero.
fn scaled_delay(previous: DateTime<Utc>, next: DateTime<Utc>, speed: f64) -> Duration {
    let Ok(gap) = next.signed_duration_since(previous).to_std() else {
        return Duration::ZERO;
    };
    Duration::try_from_secs_f64(gap.as_secs_f64() / speed).unwrap_or(Duration::ZERO)
}

/// Hand one event to the sink, containing errors and panics.
fn deliver(sink: &mut dyn ReplaySink, event: &Event) -> bool {
    match catch_unwind(AssertUnwindSafe(|| sink.deliver(event))) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(event_id = %event.event_id, error = %e, "Replay sink failed, continuing");
            false
        }
        Err(_panic) => {
            warn!(event_id = %event.event_id, "Replay sink panicked, continuing");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn delay_scales_with_speed() {
        let t0 = Utc.timestamp_opt(1_000, 0).single().unwrap_or_default();
        let t1 = t0 + chrono::Duration::seconds(10);
        assert_eq!(scaled_delay(t0, t1, 1.0), Duration::from_secs(10));
        assert_eq!(scaled_delay(t0, t1, 2.0), Duration::from_secs(5));
        assert_eq!(scaled_delay(t0, t1, 0.5), Duration::from_secs(20));
    }

    #[test]
    fn out_of_order_or_equal_timestamps_have_no_delay() {
        let t0 = Utc.timestamp_opt(1_000, 0).single().unwrap_or_default();
        assert_eq!(scaled_delay(t0, t0, 1.0), Duration::ZERO);
        let earlier = t0 - chrono::Duration::seconds(3);
        assert_eq!(scaled_delay(t0, earlier, 1.0), Duration::ZERO);
    }

    #[test]
    fn invalid_speeds_are_rejected() {
        for speed in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let config = ReplayConfiguration::new("sim-1").with_speed(speed);
            assert!(validate(&config).is_err(), "speed {speed} accepted");
        }
        assert!(validate(&ReplayConfiguration::new("sim-1").with_speed(0.25)).is_ok());
    }

    #[test]
    fn excluding_system_events_narrows_the_type_filter() {
        let all = ReplayConfiguration::new("sim-1");
        assert_eq!(replay_types(&all), Some(None));

        let types = replay_types(&all.clone().with_system_events(false))
            .flatten()
            .unwrap_or_default();
        assert_eq!(types.len(), EventType::ALL.len().saturating_sub(1));
        assert!(!types.contains(&EventType::SystemEvent));

        let only_system = all
            .with_system_events(false)
            .with_event_types(vec![EventType::SystemEvent]);
        assert_eq!(replay_types(&only_system), None);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = ReplayConfiguration::new("sim-1").with_batch_size(0);
        assert!(validate(&config).is_err());
    }
}
