//! Replay configuration and session lifecycle types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::EventType;
use crate::ids::ReplayId;

/// Default page size used when a replay pulls events from the store.
pub const DEFAULT_REPLAY_BATCH_SIZE: usize = 100;

/// Parameters of a single replay run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ReplayConfiguration {
    /// Simulation whose events are replayed.
    pub simulation_id: String,
    /// Inclusive lower bound on event timestamps.
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// Inclusive upper bound on event timestamps.
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Restrict to these event types.
    #[serde(default)]
    pub event_types: Option<Vec<EventType>>,
    /// Restrict to events carrying any of these tags.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Playback speed relative to real elapsed time. Must be positive.
    #[serde(default = "default_speed_multiplier")]
    pub speed_multiplier: f64,
    /// Whether `system_event` records are delivered.
    #[serde(default = "default_include_system_events")]
    pub include_system_events: bool,
    /// Stop after delivering this many events.
    #[serde(default)]
    pub max_events: Option<usize>,
    /// Page size used when fetching events from the store.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

const fn default_speed_multiplier() -> f64 {
    1.0
}

const fn default_include_system_events() -> bool {
    true
}

const fn default_batch_size() -> usize {
    DEFAULT_REPLAY_BATCH_SIZE
}

impl ReplayConfiguration {
    /// Replay every event of `simulation_id` in real time.
    pub fn new(simulation_id: impl Into<String>) -> Self {
        Self {
            simulation_id: simulation_id.into(),
            start_time: None,
            end_time: None,
            event_types: None,
            tags: None,
            speed_multiplier: default_speed_multiplier(),
            include_system_events: default_include_system_events(),
            max_events: None,
            batch_size: default_batch_size(),
        }
    }

    /// Set the speed multiplier.
    #[must_use]
    pub const fn with_speed(mut self, speed_multiplier: f64) -> Self {
        self.speed_multiplier = speed_multiplier;
        self
    }

    /// Cap the number of delivered events.
    #[must_use]
    pub const fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = Some(max_events);
        self
    }

    /// Restrict the replay window.
    #[must_use]
    pub const fn with_window(
        mut self,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self
    }

    /// Restrict to the given event types.
    #[must_use]
    pub fn with_event_types(mut self, event_types: Vec<EventType>) -> Self {
        self.event_types = Some(event_types);
        self
    }

    /// Restrict to events carrying any of the given tags.
    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    /// Toggle delivery of `system_event` records.
    #[must_use]
    pub const fn with_system_events(mut self, include: bool) -> Self {
        self.include_system_events = include;
        self
    }

    /// Set the fetch page size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Lifecycle state of a replay session.
///
/// `Created -> Active -> {Completed | Stopped | Failed}`. Terminal states
/// are final and terminal sessions are dropped from live tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ReplayState {
    /// Registered but the background task has not started delivering.
    Created,
    /// The background task is delivering events.
    Active,
    /// All matching events were delivered.
    Completed,
    /// A caller stopped the session.
    Stopped,
    /// The replay could not fetch its events.
    Failed,
}

impl ReplayState {
    /// Whether no further transitions are possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Failed)
    }
}

/// Point-in-time snapshot of a live replay session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ReplayStatus {
    /// Session identifier.
    pub replay_id: ReplayId,
    /// Current lifecycle state.
    pub state: ReplayState,
    /// The configuration the session was started with.
    pub configuration: ReplayConfiguration,
    /// When the session was registered.
    pub started_at: DateTime<Utc>,
    /// Events delivered so far.
    pub events_delivered: u64,
}
