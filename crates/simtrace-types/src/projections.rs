//! Read-only projections built from stored events for dashboards.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::EventType;
use crate::event::{Event, Payload};

/// One human-readable line of a simulation timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TimelineEntry {
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
    /// The category of event.
    pub event_type: EventType,
    /// Canned description of the event type.
    pub description: String,
    /// The event payload.
    pub data: Payload,
    /// The event tags.
    pub tags: BTreeSet<String>,
}

impl From<&Event> for TimelineEntry {
    fn from(event: &Event) -> Self {
        Self {
            timestamp: event.timestamp,
            event_type: event.event_type,
            description: event.event_type.description().to_owned(),
            data: event.data.clone(),
            tags: event.tags.clone(),
        }
    }
}

/// Earliest and latest timestamps of a set of events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TimeRange {
    /// Earliest event timestamp.
    pub start: DateTime<Utc>,
    /// Latest event timestamp.
    pub end: DateTime<Utc>,
}

/// Aggregate counters over a filtered set of events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EventStatistics {
    /// Number of events counted.
    pub total_events: u64,
    /// Count per event type.
    pub event_type_counts: BTreeMap<EventType, u64>,
    /// Span of the counted events, absent when there are none.
    pub time_range: Option<TimeRange>,
    /// Distinct simulations the events belong to.
    pub simulations: BTreeSet<String>,
    /// Count per tag.
    pub tags: BTreeMap<String, u64>,
}

impl EventStatistics {
    /// Fold a sequence of events into statistics.
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a Event>) -> Self {
        let mut stats = Self::default();
        for event in events {
            stats.total_events = stats.total_events.saturating_add(1);
            let count = stats.event_type_counts.entry(event.event_type).or_insert(0);
            *count = count.saturating_add(1);
            for tag in &event.tags {
                let count = stats.tags.entry(tag.clone()).or_insert(0);
                *count = count.saturating_add(1);
            }
            stats.simulations.insert(event.simulation_id.clone());
            stats.time_range = Some(match stats.time_range {
                None => TimeRange {
                    start: event.timestamp,
                    end: event.timestamp,
                },
                Some(range) => TimeRange {
                    start: range.start.min(event.timestamp),
                    end: range.end.max(event.timestamp),
                },
            });
        }
        stats
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn statistics_fold_counts_and_range() {
        let t0 = Utc::now();
        let events = vec![
            Event::new("sim-1", EventType::SimulationStarted).at(t0).with_tag("run"),
            Event::new("sim-1", EventType::PhaseCompleted)
                .at(t0 + Duration::seconds(5))
                .with_tag("run")
                .with_tag("phase"),
            Event::new("sim-2", EventType::PhaseCompleted).at(t0 - Duration::seconds(1)),
        ];
        let stats = EventStatistics::from_events(&events);
        assert_eq!(stats.total_events, 3);
        assert_eq!(stats.event_type_counts.get(&EventType::PhaseCompleted), Some(&2));
        assert_eq!(stats.tags.get("run"), Some(&2));
        assert_eq!(stats.simulations.len(), 2);
        let range = stats.time_range.unwrap();
        assert_eq!(range.start, t0 - Duration::seconds(1));
        assert_eq!(range.end, t0 + Duration::seconds(5));
    }

    #[test]
    fn empty_statistics_have_no_range() {
        let stats = EventStatistics::from_events(&Vec::<Event>::new());
        assert_eq!(stats.total_events, 0);
        assert!(stats.time_range.is_none());
    }

    #[test]
    fn timeline_entry_uses_canned_description() {
        let event = Event::new("sim-1", EventType::DocumentGenerated);
        let entry = TimelineEntry::from(&event);
        assert_eq!(entry.description, "Document generated");
    }
}
