//! The event store facade.
//!
//! [`EventStore`] ties the backend, codec, index layout, broadcaster, and
//! counters together and owns the fallback decision.
//!
//! # Write path
//!
//! ```text
//! store_event(event)
//!     |
//!     +-- validate + encode (PayloadCodec)
//!     +-- plan keys (KeySpace::write_plan)
//!     +-- batched write (EventBackend::write) --> Redis MULTI | memory
//!     +-- fan-out: local Broadcaster + remote PUBLISH (fire-and-forget)
//! ```
//!
//! # Fallback
//!
//! If the networked store is unreachable at construction, the store starts
//! on [`MemoryBackend`]. If a connection-class failure happens later, the
//! store flips into degraded mode once, logs it once, and serves the
//! failing operation and every later one from the in-process backend.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use simtrace_types::{Event, EventId};
use tokio::sync::broadcast;

use crate::backend::{BackendKind, EventBackend, MemoryBackend, RedisBackend};
use crate::broadcast::Broadcaster;
use crate::codec::PayloadCodec;
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::index::KeySpace;
use crate::metrics::{MetricsSnapshot, StoreMetrics};

/// Durable, indexed, queryable store of simulation events.
pub struct EventStore {
    pub(crate) primary: Arc<dyn EventBackend>,
    pub(crate) fallback: Arc<MemoryBackend>,
    degraded: AtomicBool,
    pub(crate) codec: PayloadCodec,
    pub(crate) keys: KeySpace,
    pub(crate) config: StoreConfig,
    broadcaster: Broadcaster,
    pub(crate) metrics: Arc<StoreMetrics>,
}

impl std::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore")
            .field("backend", &self.backend_kind())
            .field("degraded", &self.is_degraded())
            .field("compression", &self.codec.compression())
            .finish_non_exhaustive()
    }
}

impl EventStore {
    /// Connect to the configured networked store, falling back to the
    /// in-process store when it is unreachable.
    ///
    /// # Errors
    ///
    /// Returns the connection error only when
    /// [`StoreConfig::fallback_to_memory`] is `false`.
    pub async fn connect(config: StoreConfig) -> Result<Self, StoreError> {
        match RedisBackend::connect(&config).await {
            Ok(redis) => Ok(Self::with_backend(config, Arc::new(redis))),
            Err(e) if config.fallback_to_memory => {
                tracing::warn!(
                    url = config.url,
                    error = %e,
                    "Backing store unreachable, using in-process fallback"
                );
                let store = Self::in_memory(config);
                store.metrics.record_fallback();
                Ok(store)
            }
            Err(e) => Err(e),
        }
    }

    /// Create a store backed only by the in-process backend.
    pub fn in_memory(config: StoreConfig) -> Self {
        let memory = Arc::new(MemoryBackend::new());
        Self::build(config, Arc::clone(&memory) as Arc<dyn EventBackend>, memory)
    }

    /// Create a store over an explicit primary backend.
    pub fn with_backend(config: StoreConfig, primary: Arc<dyn EventBackend>) -> Self {
        Self::build(config, primary, Arc::new(MemoryBackend::new()))
    }

    fn build(
        config: StoreConfig,
        primary: Arc<dyn EventBackend>,
        fallback: Arc<MemoryBackend>,
    ) -> Self {
        tracing::info!(
            backend = primary.kind().as_str(),
            compression = ?config.compression,
            ttl_seconds = config.ttl_seconds,
            "Event store initialized"
        );
        Self {
            primary,
            fallback,
            degraded: AtomicBool::new(false),
            codec: PayloadCodec::new(config.compression),
            keys: KeySpace::new(config.key_prefix.clone()),
            config,
            broadcaster: Broadcaster::default(),
            metrics: Arc::new(StoreMetrics::default()),
        }
    }

    /// The backend currently serving requests.
    pub fn backend_kind(&self) -> BackendKind {
        self.active().kind()
    }

    /// Whether a mid-operation connection failure forced the fallback.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// Current operation counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// The configuration the store was built with.
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Subscribe to events stored for `simulation_id` from now on.
    pub fn subscribe(&self, simulation_id: &str) -> broadcast::Receiver<Arc<Event>> {
        self.broadcaster.subscribe(simulation_id)
    }

    /// Close backend connections.
    pub async fn shutdown(&self) {
        if let Err(e) = self.primary.shutdown().await {
            tracing::warn!(error = %e, "Backing store shutdown failed");
        }
    }

    pub(crate) fn active(&self) -> Arc<dyn EventBackend> {
        if self.is_degraded() {
            Arc::clone(&self.fallback) as Arc<dyn EventBackend>
        } else {
            Arc::clone(&self.primary)
        }
    }

    /// Run `op` against the active backend, switching to the fallback and
    /// retrying once on a connection-class failure.
    pub(crate) async fn run<T, F, Fut>(&self, op: F) -> Result<T, StoreError>
    where
        F: Fn(Arc<dyn EventBackend>) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let backend = self.active();
        let kind = backend.kind();
        match op(backend).await {
            Err(e) if kind == BackendKind::Redis && e.is_connection_failure() => {
                self.degrade(&e);
                op(Arc::clone(&self.fallback) as Arc<dyn EventBackend>).await
            }
            other => other,
        }
    }

    fn degrade(&self, cause: &StoreError) {
        if !self.degraded.swap(true, Ordering::AcqRel) {
            self.metrics.record_fallback();
            tracing::warn!(
                error = %cause,
                "Lost connection to backing store, continuing on in-process fallback"
            );
        }
    }

    // =========================================================================
    // Write path
    // =========================================================================

    /// Store an event, returning whether it was written.
    ///
    /// Failures are logged and counted, never propagated.
    pub async fn store_event(&self, event: Event) -> bool {
        match self.try_store(event).await {
            Ok(_) => true,
            Err(e) => {
                self.metrics.record_store_error();
                tracing::warn!(error = %e, "Failed to store event");
                false
            }
        }
    }

    /// Store an event, returning its (possibly store-assigned) id.
    ///
    /// Re-storing an existing id replaces the record; index sets keep the
    /// id exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for an event without a
    /// simulation id, [`StoreError::Serialization`] if it cannot be
    /// encoded, or the backend error if the write fails.
    pub async fn try_store(&self, mut event: Event) -> Result<EventId, StoreError> {
        if event.simulation_id.trim().is_empty() {
            return Err(StoreError::Validation(format!(
                "event {} has no simulation id",
                event.event_id
            )));
        }
        if event.event_id.is_empty() {
            event.event_id = EventId::generate();
        }

        let payload = self.codec.encode(&event)?;
        let previous = self.fetch_one(&event.event_id).await?;
        let plan = self.keys.write_plan(
            &event,
            payload,
            self.config.ttl(),
            previous.as_ref(),
        );
        let plan = &plan;
        self.run(|backend| async move { backend.write(plan).await })
            .await?;

        self.metrics.record_stored();
        tracing::debug!(
            event_id = %event.event_id,
            simulation_id = event.simulation_id,
            event_type = %event.event_type,
            overwrite = previous.is_some(),
            "Stored event"
        );

        let event_id = event.event_id.clone();
        self.fan_out(Arc::new(event));
        Ok(event_id)
    }

    /// Publish to local subscribers and, on the networked backend, to the
    /// simulation's remote channel. Fire-and-forget.
    fn fan_out(&self, event: Arc<Event>) {
        self.broadcaster.publish(&event);

        let backend = self.active();
        if backend.kind() != BackendKind::Redis {
            return;
        }
        let channel = self.keys.channel(&event.simulation_id);
        match serde_json::to_vec(event.as_ref()) {
            Ok(payload) => {
                let metrics = Arc::clone(&self.metrics);
                tokio::spawn(async move {
                    if let Err(e) = backend.publish(&channel, payload).await {
                        metrics.record_publish_error();
                        tracing::warn!(
                            channel = channel,
                            error = %e,
                            "Failed to publish event"
                        );
                    }
                });
            }
            Err(e) => {
                self.metrics.record_publish_error();
                tracing::warn!(
                    event_id = %event.event_id,
                    error = %e,
                    "Failed to serialize event for publish"
                );
            }
        }
    }

    // =========================================================================
    // Point reads
    // =========================================================================

    /// Look up a single event by id.
    pub async fn get_event(&self, event_id: &EventId) -> Option<Event> {
        match self.fetch_one(event_id).await {
            Ok(event) => event,
            Err(e) => {
                self.metrics.record_query_error();
                tracing::warn!(event_id = %event_id, error = %e, "Failed to fetch event");
                None
            }
        }
    }

    /// Event ids of `simulation_id` in arrival order.
    ///
    /// Ids whose record has expired, been removed, or moved to another
    /// simulation are left out; an id appended more than once keeps its
    /// first position.
    pub async fn simulation_stream(&self, simulation_id: &str) -> Vec<EventId> {
        match self.try_simulation_stream(simulation_id).await {
            Ok(ids) => ids,
            Err(e) => {
                self.metrics.record_query_error();
                tracing::warn!(simulation_id, error = %e, "Failed to read simulation stream");
                Vec::new()
            }
        }
    }

    async fn try_simulation_stream(&self, simulation_id: &str) -> Result<Vec<EventId>, StoreError> {
        let key = self.keys.stream(simulation_id);
        let key = key.as_str();
        let appended = self
            .run(|backend| async move { backend.stream_ids(key).await })
            .await?;

        let mut seen = HashSet::new();
        let ids: Vec<String> = appended
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();
        let owned: HashSet<EventId> = self
            .fetch_records(&ids, self.config.query_batch_size)
            .await?
            .into_iter()
            .filter(|event| event.simulation_id == simulation_id)
            .map(|event| event.event_id)
            .collect();

        Ok(ids
            .into_iter()
            .map(EventId::from)
            .filter(|id| owned.contains(id))
            .collect())
    }

    async fn fetch_one(&self, event_id: &EventId) -> Result<Option<Event>, StoreError> {
        let mut events = self
            .fetch_records(std::slice::from_ref(&event_id.as_str().to_owned()), 1)
            .await?;
        Ok(events.pop())
    }

    /// Fetch and decode primary records for `ids`, `chunk_size` per
    /// round-trip. Missing and undecodable records are skipped.
    pub(crate) async fn fetch_records(
        &self,
        ids: &[String],
        chunk_size: usize,
    ) -> Result<Vec<Event>, StoreError> {
        let mut events = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(chunk_size.max(1)) {
            let keys: Vec<String> = chunk.iter().map(|id| self.keys.primary(id)).collect();
            let keys = keys.as_slice();
            let records = self
                .run(|backend| async move { backend.fetch(keys).await })
                .await?;
            for (id, record) in chunk.iter().zip(records) {
                let Some(bytes) = record else {
                    tracing::debug!(event_id = id, "Index entry without primary record, skipping");
                    continue;
                };
                match PayloadCodec::decode(&bytes) {
                    Ok(event) => events.push(event),
                    Err(e) => {
                        self.metrics.record_decode_error();
                        tracing::warn!(event_id = id, error = %e, "Dropping undecodable record");
                    }
                }
            }
        }
        Ok(events)
    }
}
