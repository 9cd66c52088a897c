//! Query engine.
//!
//! Filters resolve to an id candidate set through the index sets, then
//! primary records are fetched in batches and the record-level filters
//! (time window, tags) are applied.
//!
//! ```text
//! candidates = simulation:{id}            (or union over all simulations)
//!            ∩ ⋃ type:{t} for t in types  (when types are given)
//! fetch(candidates) -> decode -> time window -> tags -> sort -> page
//! ```
//!
//! Time-range filtering happens after fetch; the `time:{bucket}` sets are
//! maintained but not consulted here. Pagination is offset-based and only
//! stable while no events are deleted between pages.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use simtrace_types::{Event, EventStatistics, EventType, TimelineEntry};

use crate::error::StoreError;
use crate::store::EventStore;

/// Criteria for [`EventStore::get_events`].
///
/// Unset fields do not restrict the result. An empty `event_types` or
/// `tags` list behaves like an unset one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Restrict to one simulation.
    pub simulation_id: Option<String>,
    /// Restrict to any of these event types.
    pub event_types: Option<Vec<EventType>>,
    /// Inclusive lower bound on timestamps.
    pub start_time: Option<DateTime<Utc>>,
    /// Inclusive upper bound on timestamps.
    pub end_time: Option<DateTime<Utc>>,
    /// Restrict to events carrying any of these tags.
    pub tags: Option<Vec<String>>,
    /// Maximum number of events returned. Defaults to the store's
    /// configured query limit.
    pub limit: Option<usize>,
    /// Number of matching events skipped before the first returned one.
    pub offset: usize,
}

impl EventFilter {
    /// A filter matching every event of one simulation.
    pub fn simulation(simulation_id: impl Into<String>) -> Self {
        Self {
            simulation_id: Some(simulation_id.into()),
            ..Self::default()
        }
    }

    /// Restrict to the given event types.
    #[must_use]
    pub fn event_types(mut self, event_types: impl IntoIterator<Item = EventType>) -> Self {
        self.event_types = Some(event_types.into_iter().collect());
        self
    }

    /// Restrict to the closed interval `[start, end]`.
    #[must_use]
    pub const fn between(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }

    /// Restrict to events carrying any of the given tags.
    #[must_use]
    pub fn tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Set the page size.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the page offset.
    #[must_use]
    pub const fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Reject filters that cannot match anything by construction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidFilter`] for a blank simulation id or
    /// a time window whose start is after its end.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self
            .simulation_id
            .as_deref()
            .is_some_and(|id| id.trim().is_empty())
        {
            return Err(StoreError::InvalidFilter("blank simulation id".to_owned()));
        }
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if start > end {
                return Err(StoreError::InvalidFilter(format!(
                    "start_time {start} is after end_time {end}"
                )));
            }
        }
        Ok(())
    }

    /// Whether a fetched record passes the filter.
    ///
    /// The index sets only narrow the candidates. The decoded record is
    /// the source of truth, so simulation and type are checked again here
    /// along with the time window and tags.
    pub fn matches_record(&self, event: &Event) -> bool {
        if self
            .simulation_id
            .as_deref()
            .is_some_and(|id| id != event.simulation_id)
        {
            return false;
        }
        if let Some(types) = self.event_types.as_deref().filter(|t| !t.is_empty()) {
            if !types.contains(&event.event_type) {
                return false;
            }
        }
        if self.start_time.is_some_and(|start| event.timestamp < start) {
            return false;
        }
        if self.end_time.is_some_and(|end| event.timestamp > end) {
            return false;
        }
        match self.tags.as_deref() {
            Some(tags) if !tags.is_empty() => event.has_any_tag(tags.iter()),
            _ => true,
        }
    }
}

impl EventStore {
    /// Events matching `filter`, ordered by timestamp ascending.
    ///
    /// Any failure yields an empty result and bumps the query error
    /// counter.
    pub async fn get_events(&self, filter: &EventFilter) -> Vec<Event> {
        match self.try_get_events(filter).await {
            Ok(events) => events,
            Err(e) => {
                self.metrics.record_query_error();
                tracing::warn!(filter = ?filter, error = %e, "Event query failed");
                Vec::new()
            }
        }
    }

    /// Events matching `filter`, ordered by timestamp ascending.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidFilter`] for an invalid filter or the
    /// backend error if a lookup fails.
    pub async fn try_get_events(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError> {
        let limit = filter.limit.unwrap_or(self.config.default_query_limit);
        let events = self
            .fetch_matching(filter, self.config.query_batch_size)
            .await?;
        Ok(events.into_iter().skip(filter.offset).take(limit).collect())
    }

    /// Events matching `filter` in one pass, reading primary records
    /// `batch_size` per round-trip.
    ///
    /// Every candidate record is read once, so consumers that need a long
    /// ordered run (replay) use this instead of walking `offset` pages,
    /// each of which re-reads the whole candidate set. `offset` applies;
    /// an unset `limit` means no limit.
    ///
    /// # Errors
    ///
    /// See [`Self::try_get_events`].
    pub async fn try_scan_events(
        &self,
        filter: &EventFilter,
        batch_size: usize,
    ) -> Result<Vec<Event>, StoreError> {
        let events = self.fetch_matching(filter, batch_size).await?;
        Ok(events
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect())
    }

    /// Human-readable timeline of one simulation, oldest first.
    pub async fn get_simulation_timeline(&self, simulation_id: &str) -> Vec<TimelineEntry> {
        let filter = EventFilter::simulation(simulation_id);
        match self
            .fetch_matching(&filter, self.config.query_batch_size)
            .await
        {
            Ok(events) => events.iter().map(TimelineEntry::from).collect(),
            Err(e) => {
                self.metrics.record_query_error();
                tracing::warn!(simulation_id, error = %e, "Timeline query failed");
                Vec::new()
            }
        }
    }

    /// Aggregate counters over the events matching the given bounds.
    pub async fn get_event_statistics(
        &self,
        simulation_id: Option<&str>,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> EventStatistics {
        let filter = EventFilter {
            simulation_id: simulation_id.map(str::to_owned),
            ..EventFilter::default()
        }
        .between(start_time, end_time);
        match self
            .fetch_matching(&filter, self.config.query_batch_size)
            .await
        {
            Ok(events) => EventStatistics::from_events(&events),
            Err(e) => {
                self.metrics.record_query_error();
                tracing::warn!(simulation_id, error = %e, "Statistics query failed");
                EventStatistics::default()
            }
        }
    }

    /// Every event matching `filter` (ignoring pagination), sorted by
    /// `(timestamp, event_id)`.
    pub(crate) async fn fetch_matching(
        &self,
        filter: &EventFilter,
        chunk_size: usize,
    ) -> Result<Vec<Event>, StoreError> {
        filter.validate()?;

        let candidates = self.candidate_ids(filter).await?;
        let mut ids: Vec<String> = candidates.into_iter().collect();
        ids.sort_unstable();

        let mut events: Vec<Event> = self
            .fetch_records(&ids, chunk_size)
            .await?
            .into_iter()
            .filter(|event| filter.matches_record(event))
            .collect();
        events.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.event_id.cmp(&b.event_id))
        });

        tracing::debug!(
            candidates = ids.len(),
            matched = events.len(),
            "Resolved event query"
        );
        Ok(events)
    }

    /// Resolve the index-accelerated part of a filter to candidate ids.
    async fn candidate_ids(&self, filter: &EventFilter) -> Result<HashSet<String>, StoreError> {
        let simulations: Vec<String> = match &filter.simulation_id {
            Some(id) => vec![id.clone()],
            None => {
                let mut known = self.index_members(&self.keys.simulations()).await?;
                known.sort_unstable();
                known
            }
        };

        let mut candidates = HashSet::new();
        for simulation_id in &simulations {
            candidates.extend(
                self.index_members(&self.keys.simulation(simulation_id))
                    .await?,
            );
        }

        if let Some(types) = filter.event_types.as_deref().filter(|t| !t.is_empty()) {
            let wanted: BTreeSet<EventType> = types.iter().copied().collect();
            let mut typed = HashSet::new();
            for event_type in wanted {
                typed.extend(self.index_members(&self.keys.event_type(event_type)).await?);
            }
            candidates.retain(|id| typed.contains(id));
        }

        Ok(candidates)
    }

    async fn index_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.run(|backend| async move { backend.members(key).await })
            .await
    }
}
