//! The canonical event record.
//!
//! An [`Event`] is immutable once stored: the store never rewrites the
//! timestamp or moves an event between simulations. Re-storing the same
//! [`EventId`] replaces the whole record (last write wins).

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{EventType, Priority};
use crate::ids::EventId;

/// Open string-keyed mapping used for event payloads and metadata.
///
/// Producers are varied and evolving, so values stay untyped JSON.
pub type Payload = BTreeMap<String, serde_json::Value>;

/// A timestamped execution event produced by a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Event {
    /// Globally unique identifier.
    pub event_id: EventId,
    /// The simulation run that owns this event.
    pub simulation_id: String,
    /// The category of event.
    pub event_type: EventType,
    /// When the event happened. Serialized as an RFC 3339 string.
    pub timestamp: DateTime<Utc>,
    /// Advisory priority.
    #[serde(default)]
    pub priority: Priority,
    /// Identifier tying related events together across runs.
    #[serde(default)]
    pub correlation_id: Option<String>,
    /// User that triggered the event, if any.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Client session that triggered the event, if any.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Free-form labels. Order is irrelevant.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Producer metadata, opaque to the store.
    #[serde(default)]
    pub metadata: Payload,
    /// The event payload.
    #[serde(default)]
    pub data: Payload,
}

impl Event {
    /// Create an event stamped with a fresh UUID v7 id and the current time.
    pub fn new(simulation_id: impl Into<String>, event_type: EventType) -> Self {
        Self {
            event_id: EventId::generate(),
            simulation_id: simulation_id.into(),
            event_type,
            timestamp: Utc::now(),
            priority: Priority::default(),
            correlation_id: None,
            user_id: None,
            session_id: None,
            tags: BTreeSet::new(),
            metadata: Payload::new(),
            data: Payload::new(),
        }
    }

    /// Override the generated identifier.
    #[must_use]
    pub fn with_id(mut self, event_id: impl Into<EventId>) -> Self {
        self.event_id = event_id.into();
        self
    }

    /// Set the event timestamp. Only meaningful before the event is stored.
    #[must_use]
    pub const fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Add a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Insert a payload entry.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Insert a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Set the correlation identifier.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Set the originating user.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the originating session.
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Unix-second bucket used by the `time:{bucket}` index.
    pub fn time_bucket(&self) -> i64 {
        self.timestamp.timestamp()
    }

    /// Whether the event carries at least one of `tags`.
    pub fn has_any_tag<'a>(&self, mut tags: impl Iterator<Item = &'a String>) -> bool {
        tags.any(|t| self.tags.contains(t))
    }
}
