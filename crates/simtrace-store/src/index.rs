//! Key layout and secondary index maintenance plans.
//!
//! Every stored event owns one primary record plus derived entries in
//! three secondary sets and one per-simulation stream. Index entries are a
//! redundant view of the primary record; writes put index entries first so
//! that a partial failure can only leave an index entry pointing at a
//! missing primary record, which readers skip.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `{prefix}:event:{event_id}` | String | Tagged, optionally compressed record |
//! | `{prefix}:simulation:{simulation_id}` | Set | Event ids of one simulation |
//! | `{prefix}:type:{event_type}` | Set | Event ids of one event type |
//! | `{prefix}:time:{unix_second}` | Set | Event ids within one second |
//! | `{prefix}:simulations` | Set | Every simulation id seen |
//! | `{prefix}:stream:{simulation_id}` | Stream | Arrival-ordered event ids |
//! | `{prefix}:events:{simulation_id}` | Channel | Live pub/sub fan-out |

use simtrace_types::{Event, EventType};

/// Builds every key the store touches from a configured prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    /// Create a key space under `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Primary record key.
    pub fn primary(&self, event_id: &str) -> String {
        format!("{}:event:{event_id}", self.prefix)
    }

    /// Per-simulation index set.
    pub fn simulation(&self, simulation_id: &str) -> String {
        format!("{}:simulation:{simulation_id}", self.prefix)
    }

    /// Per-event-type index set.
    pub fn event_type(&self, event_type: EventType) -> String {
        format!("{}:type:{}", self.prefix, event_type.as_str())
    }

    /// Per-second time bucket index set.
    pub fn time_bucket(&self, unix_second: i64) -> String {
        format!("{}:time:{unix_second}", self.prefix)
    }

    /// Registry of known simulation ids.
    pub fn simulations(&self) -> String {
        format!("{}:simulations", self.prefix)
    }

    /// Append-only per-simulation stream.
    pub fn stream(&self, simulation_id: &str) -> String {
        format!("{}:stream:{simulation_id}", self.prefix)
    }

    /// Pub/sub channel for live subscribers of one simulation.
    pub fn channel(&self, simulation_id: &str) -> String {
        format!("{}:events:{simulation_id}", self.prefix)
    }

    /// The three secondary index sets an event belongs to.
    pub fn index_keys(&self, event: &Event) -> [String; 3] {
        [
            self.simulation(&event.simulation_id),
            self.event_type(event.event_type),
            self.time_bucket(event.time_bucket()),
        ]
    }

    /// Plan the batched write of `event` with its encoded `payload`.
    ///
    /// `previous` is the record currently stored under the same id, if any.
    /// Index sets it belonged to that the new version does not are listed
    /// as stale so the id never lingers in two type or time sets. An
    /// overwrite within the same simulation is not appended to the stream
    /// again.
    ///
    /// `previous` is read before the write, so two concurrent writers of
    /// one id may both plan without it. Readers recheck every fetched
    /// record against the filter, and the in-process backend recomputes
    /// stale entries under its own lock.
    pub fn write_plan(
        &self,
        event: &Event,
        payload: Vec<u8>,
        ttl_seconds: Option<i64>,
        previous: Option<&Event>,
    ) -> WritePlan {
        let index_keys = self.index_keys(event);
        let stale_index_keys = previous
            .map(|prev| {
                self.index_keys(prev)
                    .into_iter()
                    .filter(|k| !index_keys.contains(k))
                    .collect()
            })
            .unwrap_or_default();
        let append_stream =
            previous.is_none_or(|prev| prev.simulation_id != event.simulation_id);

        WritePlan {
            event_id: event.event_id.as_str().to_owned(),
            primary_key: self.primary(event.event_id.as_str()),
            payload,
            index_keys,
            stale_index_keys,
            registry_key: self.simulations(),
            simulation_id: event.simulation_id.clone(),
            stream: StreamEntry {
                key: self.stream(&event.simulation_id),
                timestamp: event.timestamp.to_rfc3339(),
            },
            append_stream,
            ttl_seconds,
        }
    }

    /// Plan the removal of `event`'s primary record and index entries.
    pub fn remove_plan(&self, event: &Event) -> RemovePlan {
        RemovePlan {
            event_id: event.event_id.as_str().to_owned(),
            primary_key: self.primary(event.event_id.as_str()),
            index_keys: self.index_keys(event),
        }
    }
}

/// Everything one event write touches, issued as a single batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePlan {
    /// The event id, used as the member of every index set.
    pub event_id: String,
    /// Primary record key.
    pub primary_key: String,
    /// Encoded record.
    pub payload: Vec<u8>,
    /// Index sets that gain the id.
    pub index_keys: [String; 3],
    /// Index sets that lose the id (overwrite moved the event).
    pub stale_index_keys: Vec<String>,
    /// Simulation registry key.
    pub registry_key: String,
    /// Member added to the registry.
    pub simulation_id: String,
    /// The simulation's stream and the entry appended to it.
    pub stream: StreamEntry,
    /// Whether to append to the stream. `false` for same-simulation
    /// overwrites.
    pub append_stream: bool,
    /// Expiry for the primary record and index keys.
    pub ttl_seconds: Option<i64>,
}

/// One append to a per-simulation stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Stream key.
    pub key: String,
    /// RFC 3339 event timestamp stored alongside the id.
    pub timestamp: String,
}

/// Everything one event removal touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovePlan {
    /// The event id removed from every index set.
    pub event_id: String,
    /// Primary record key.
    pub primary_key: String,
    /// Index sets that lose the id.
    pub index_keys: [String; 3],
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn keys() -> KeySpace {
        KeySpace::new("st")
    }

    #[test]
    fn index_keys_follow_layout() {
        let ts = Utc.timestamp_opt(1_700_000_000, 500_000_000).single();
        let mut event = Event::new("sim-1", EventType::PhaseStarted).with_id("e1");
        if let Some(ts) = ts {
            event = event.at(ts);
        }
        assert_eq!(
            keys().index_keys(&event),
            [
                "st:simulation:sim-1".to_owned(),
                "st:type:phase_started".to_owned(),
                "st:time:1700000000".to_owned(),
            ]
        );
        assert_eq!(keys().primary("e1"), "st:event:e1");
    }

    #[test]
    fn overwrite_with_new_type_marks_old_type_stale() {
        let first = Event::new("sim-1", EventType::PhaseStarted).with_id("e1");
        let second = first.clone();
        let second = Event {
            event_type: EventType::PhaseFailed,
            ..second
        };
        let plan = keys().write_plan(&second, vec![0], None, Some(&first));
        assert_eq!(plan.stale_index_keys, vec!["st:type:phase_started".to_owned()]);
        assert!(!plan.append_stream);
    }

    #[test]
    fn fresh_write_appends_to_stream() {
        let event = Event::new("sim-1", EventType::PhaseStarted);
        let plan = keys().write_plan(&event, vec![0], Some(60), None);
        assert!(plan.stale_index_keys.is_empty());
        assert!(plan.append_stream);
        assert_eq!(plan.stream.key, "st:stream:sim-1");
    }

    #[test]
    fn move_to_other_simulation_appends_to_new_stream() {
        let first = Event::new("sim-1", EventType::PhaseStarted).with_id("e1");
        let moved = Event {
            simulation_id: "sim-2".to_owned(),
            ..first.clone()
        };
        let plan = keys().write_plan(&moved, vec![0], None, Some(&first));
        assert!(plan.append_stream);
        assert_eq!(plan.stream.key, "st:stream:sim-2");
        assert_eq!(plan.stale_index_keys, vec!["st:simulation:sim-1".to_owned()]);
    }
}
