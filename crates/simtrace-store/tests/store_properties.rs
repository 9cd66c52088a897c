//! Behavioral tests for the event store over the in-process backend.
//!
//! These run without external services. Live Redis coverage lives in
//! `redis_integration.rs`.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::too_many_lines
)]

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use simtrace_store::index::{KeySpace, RemovePlan, WritePlan};
use simtrace_store::{
    BackendKind, EventBackend, EventFilter, EventStore, MemoryBackend, StoreConfig, StoreError,
};
use simtrace_types::{Event, EventType};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap()
}

fn at(secs: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(secs)
}

/// The three-event scenario: started, phase completed, completed.
fn scenario() -> Vec<Event> {
    vec![
        Event::new("sim-1", EventType::SimulationStarted)
            .with_id("e-start")
            .at(at(0)),
        Event::new("sim-1", EventType::PhaseCompleted)
            .with_id("e-phase")
            .at(at(5))
            .with_tag("phase"),
        Event::new("sim-1", EventType::SimulationCompleted)
            .with_id("e-done")
            .at(at(12)),
    ]
}

/// A mixed fixture across two simulations, stored out of order.
fn mixed() -> Vec<Event> {
    vec![
        Event::new("sim-a", EventType::PhaseStarted).with_id("a3").at(at(30)).with_tag("x"),
        Event::new("sim-a", EventType::ErrorOccurred).with_id("a1").at(at(10)).with_tag("y"),
        Event::new("sim-b", EventType::PhaseStarted).with_id("b1").at(at(15)),
        Event::new("sim-a", EventType::PhaseStarted).with_id("a2").at(at(20)).with_tag("y"),
        Event::new("sim-b", EventType::SystemEvent).with_id("b2").at(at(25)).with_tag("x"),
    ]
}

async fn store_all(store: &EventStore, events: Vec<Event>) {
    for event in events {
        assert!(store.store_event(event).await);
    }
}

fn ids(events: &[Event]) -> Vec<&str> {
    events.iter().map(|e| e.event_id.as_str()).collect()
}

// =============================================================================
// Round-trip and ordering
// =============================================================================

#[tokio::test]
async fn stored_event_round_trips_all_fields() {
    let store = EventStore::in_memory(StoreConfig::default());
    let event = Event::new("sim-1", EventType::DocumentGenerated)
        .at(at(1))
        .with_tag("docs")
        .with_data("path", serde_json::json!("/tmp/report.pdf"))
        .with_metadata("generator", serde_json::json!({"version": 2}))
        .with_correlation_id("corr-1")
        .with_user_id("user-1")
        .with_session_id("session-1");

    assert!(store.store_event(event.clone()).await);
    let found = store.get_events(&EventFilter::simulation("sim-1")).await;
    assert_eq!(found, vec![event]);
}

#[tokio::test]
async fn round_trip_survives_every_compression() {
    for compression in ["none", "gzip", "lz4"] {
        let config: StoreConfig =
            serde_json::from_str(&format!(r#"{{"compression":"{compression}"}}"#)).unwrap();
        let store = EventStore::in_memory(config);
        let event = Event::new("sim-1", EventType::MetricRecorded)
            .with_data("samples", serde_json::json!(vec![1.5; 64]));
        assert!(store.store_event(event.clone()).await);
        assert_eq!(store.get_event(&event.event_id).await, Some(event));
    }
}

#[tokio::test]
async fn scenario_query_timeline_and_statistics() {
    let store = EventStore::in_memory(StoreConfig::default());
    let mut events = scenario();
    events.reverse();
    store_all(&store, events).await;

    let found = store.get_events(&EventFilter::simulation("sim-1")).await;
    assert_eq!(ids(&found), vec!["e-start", "e-phase", "e-done"]);

    let timeline = store.get_simulation_timeline("sim-1").await;
    let types: Vec<EventType> = timeline.iter().map(|e| e.event_type).collect();
    assert_eq!(
        types,
        vec![
            EventType::SimulationStarted,
            EventType::PhaseCompleted,
            EventType::SimulationCompleted
        ]
    );
    assert_eq!(timeline[1].description, "Phase completed");
    assert!(timeline.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    let stats = store.get_event_statistics(Some("sim-1"), None, None).await;
    assert_eq!(stats.total_events, 3);
    assert_eq!(stats.event_type_counts.len(), 3);
    assert!(stats.event_type_counts.values().all(|&c| c == 1));
    assert_eq!(stats.tags.get("phase"), Some(&1));
    let range = stats.time_range.unwrap();
    assert_eq!((range.start, range.end), (at(0), at(12)));
}

// =============================================================================
// Filters
// =============================================================================

#[tokio::test]
async fn type_filter_returns_exactly_matching_subset() {
    let store = EventStore::in_memory(StoreConfig::default());
    store_all(&store, mixed()).await;

    let found = store
        .get_events(&EventFilter::default().event_types([EventType::PhaseStarted]))
        .await;
    assert_eq!(ids(&found), vec!["b1", "a2", "a3"]);

    let found = store
        .get_events(&EventFilter::simulation("sim-a").event_types([EventType::PhaseStarted]))
        .await;
    assert_eq!(ids(&found), vec!["a2", "a3"]);
}

#[tokio::test]
async fn time_window_is_closed_interval() {
    let store = EventStore::in_memory(StoreConfig::default());
    store_all(&store, mixed()).await;

    let found = store
        .get_events(&EventFilter::default().between(Some(at(15)), Some(at(25))))
        .await;
    assert_eq!(ids(&found), vec!["b1", "a2", "b2"]);
}

#[tokio::test]
async fn tag_filter_matches_any_tag() {
    let store = EventStore::in_memory(StoreConfig::default());
    store_all(&store, mixed()).await;

    let found = store.get_events(&EventFilter::default().tags(["x"])).await;
    assert_eq!(ids(&found), vec!["b2", "a3"]);

    let found = store
        .get_events(&EventFilter::simulation("sim-a").tags(["x", "y"]))
        .await;
    assert_eq!(ids(&found), vec!["a1", "a2", "a3"]);
}

#[tokio::test]
async fn pagination_applies_after_ordering() {
    let store = EventStore::in_memory(StoreConfig::default());
    store_all(&store, mixed()).await;

    let page = store
        .get_events(&EventFilter::default().offset(1).limit(2))
        .await;
    assert_eq!(ids(&page), vec!["b1", "a2"]);
}

#[tokio::test]
async fn invalid_filter_yields_empty_result_and_counts_error() {
    let store = EventStore::in_memory(StoreConfig::default());
    store_all(&store, mixed()).await;

    let found = store
        .get_events(&EventFilter::default().between(Some(at(20)), Some(at(10))))
        .await;
    assert!(found.is_empty());
    assert_eq!(store.metrics().query_errors, 1);
}

// =============================================================================
// Idempotent overwrite
// =============================================================================

#[tokio::test]
async fn overwrite_keeps_one_record_and_one_index_entry() {
    let memory = Arc::new(MemoryBackend::new());
    let store = EventStore::with_backend(StoreConfig::default(), memory.clone());

    let first = Event::new("sim-1", EventType::PhaseStarted)
        .with_id("dup")
        .at(at(1))
        .with_data("v", serde_json::json!(1));
    let second = Event::new("sim-1", EventType::PhaseFailed)
        .with_id("dup")
        .at(at(2))
        .with_data("v", serde_json::json!(2));
    assert!(store.store_event(first).await);
    assert!(store.store_event(second.clone()).await);

    let found = store.get_events(&EventFilter::simulation("sim-1")).await;
    assert_eq!(found, vec![second]);
    assert_eq!(memory.len(), 1);

    let keys = KeySpace::new("simtrace");
    let sim_members = memory.members(&keys.simulation("sim-1")).await.unwrap();
    assert_eq!(sim_members, vec!["dup".to_owned()]);
    assert!(memory
        .members(&keys.event_type(EventType::PhaseStarted))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        memory
            .members(&keys.event_type(EventType::PhaseFailed))
            .await
            .unwrap(),
        vec!["dup".to_owned()]
    );
    let old_bucket = memory.members(&keys.time_bucket(at(1).timestamp())).await.unwrap();
    assert!(old_bucket.is_empty());
}

/// Memory backend that yields after every read, so concurrent writers
/// interleave between reading the previous record and writing.
struct YieldingBackend(Arc<MemoryBackend>);

#[async_trait]
impl EventBackend for YieldingBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn write(&self, plan: &WritePlan) -> Result<(), StoreError> {
        self.0.write(plan).await
    }

    async fn fetch(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        let records = self.0.fetch(keys).await;
        tokio::task::yield_now().await;
        records
    }

    async fn members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.0.members(key).await
    }

    async fn stream_ids(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.0.stream_ids(key).await
    }

    async fn remove(&self, plan: &RemovePlan) -> Result<(), StoreError> {
        self.0.remove(plan).await
    }

    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), StoreError> {
        self.0.publish(channel, payload).await
    }
}

#[tokio::test]
async fn concurrent_writes_to_one_id_leave_one_type_entry() {
    let memory = Arc::new(MemoryBackend::new());
    let store = EventStore::with_backend(
        StoreConfig::default(),
        Arc::new(YieldingBackend(Arc::clone(&memory))),
    );

    let started = Event::new("sim-1", EventType::PhaseStarted).with_id("dup").at(at(1));
    let failed = Event::new("sim-1", EventType::PhaseFailed).with_id("dup").at(at(1));
    let (a, b) = tokio::join!(store.store_event(started), store.store_event(failed));
    assert!(a && b);

    let stored = store.get_events(&EventFilter::simulation("sim-1")).await;
    assert_eq!(stored.len(), 1);
    let winner = stored[0].event_type;
    let loser = if winner == EventType::PhaseStarted {
        EventType::PhaseFailed
    } else {
        EventType::PhaseStarted
    };

    assert_eq!(
        ids(&store.get_events(&EventFilter::default().event_types([winner])).await),
        vec!["dup"]
    );
    assert!(store
        .get_events(&EventFilter::default().event_types([loser]))
        .await
        .is_empty());

    let keys = KeySpace::new("simtrace");
    assert!(memory.members(&keys.event_type(loser)).await.unwrap().is_empty());
    assert_eq!(
        memory.members(&keys.event_type(winner)).await.unwrap(),
        vec!["dup".to_owned()]
    );
}

#[tokio::test]
async fn overwrite_into_other_simulation_leaves_old_one() {
    let memory = Arc::new(MemoryBackend::new());
    let store = EventStore::with_backend(StoreConfig::default(), memory.clone());

    let original = Event::new("sim-1", EventType::PhaseStarted).with_id("mv").at(at(1));
    let moved = Event::new("sim-2", EventType::PhaseStarted).with_id("mv").at(at(1));
    assert!(store.store_event(original).await);
    assert!(store.store_event(moved.clone()).await);

    let old_stream: Vec<String> = store
        .simulation_stream("sim-1")
        .await
        .iter()
        .map(ToString::to_string)
        .collect();
    assert!(old_stream.is_empty());
    let new_stream: Vec<String> = store
        .simulation_stream("sim-2")
        .await
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(new_stream, vec!["mv".to_owned()]);

    assert!(store.get_events(&EventFilter::simulation("sim-1")).await.is_empty());
    assert_eq!(store.get_events(&EventFilter::simulation("sim-2")).await, vec![moved]);

    let keys = KeySpace::new("simtrace");
    assert!(memory.members(&keys.simulation("sim-1")).await.unwrap().is_empty());
    assert!(memory.stream_ids(&keys.stream("sim-1")).await.unwrap().is_empty());
}

// =============================================================================
// Orphans and corrupt records
// =============================================================================

#[tokio::test]
async fn index_entry_without_primary_is_skipped() {
    let memory = Arc::new(MemoryBackend::new());
    let store = EventStore::with_backend(StoreConfig::default(), memory.clone());
    store_all(&store, scenario()).await;

    // Already expired when first read.
    let orphan = Event::new("sim-1", EventType::UserAction).with_id("orphan").at(at(3));
    let plan = KeySpace::new("simtrace").write_plan(&orphan, vec![0, b'{'], Some(0), None);
    memory.write(&plan).await.unwrap();

    let found = store.get_events(&EventFilter::simulation("sim-1")).await;
    assert_eq!(ids(&found), vec!["e-start", "e-phase", "e-done"]);
    assert_eq!(store.metrics().query_errors, 0);
}

#[tokio::test]
async fn undecodable_record_is_dropped_and_counted() {
    let memory = Arc::new(MemoryBackend::new());
    let store = EventStore::with_backend(StoreConfig::default(), memory.clone());
    store_all(&store, scenario()).await;

    let corrupt = Event::new("sim-1", EventType::UserAction).with_id("corrupt").at(at(4));
    let plan = KeySpace::new("simtrace").write_plan(&corrupt, b"\x07garbage".to_vec(), None, None);
    memory.write(&plan).await.unwrap();

    let found = store.get_events(&EventFilter::simulation("sim-1")).await;
    assert_eq!(found.len(), 3);
    assert_eq!(store.metrics().decode_errors, 1);
}

// =============================================================================
// Retention
// =============================================================================

#[tokio::test]
async fn cleanup_removes_only_older_events() {
    let store = EventStore::in_memory(StoreConfig::default());
    let now = Utc::now();
    store_all(
        &store,
        vec![
            Event::new("sim-1", EventType::SimulationStarted)
                .with_id("old")
                .at(now - Duration::days(10)),
            Event::new("sim-1", EventType::PhaseStarted)
                .with_id("borderline")
                .at(now - Duration::days(7) + Duration::hours(1)),
            Event::new("sim-1", EventType::PhaseCompleted)
                .with_id("fresh")
                .at(now - Duration::hours(1)),
            Event::new("sim-2", EventType::SimulationStarted)
                .with_id("old-2")
                .at(now - Duration::days(30)),
        ],
    )
    .await;

    assert_eq!(store.cleanup_old_events(7).await, 2);

    let remaining = store.get_events(&EventFilter::simulation("sim-1")).await;
    assert_eq!(ids(&remaining), vec!["borderline", "fresh"]);
    assert!(store.get_events(&EventFilter::simulation("sim-2")).await.is_empty());
    assert_eq!(store.cleanup_old_events(7).await, 0);
}

#[tokio::test]
async fn cleanup_cutoff_is_strict() {
    let store = EventStore::in_memory(StoreConfig::default());
    store_all(&store, scenario()).await;

    assert_eq!(store.cleanup_older_than(at(5)).await.unwrap(), 1);
    let remaining = store.get_events(&EventFilter::simulation("sim-1")).await;
    assert_eq!(ids(&remaining), vec!["e-phase", "e-done"]);
}

#[tokio::test]
async fn expired_records_leave_no_index_entries_after_sweep() {
    let memory = Arc::new(MemoryBackend::new());
    let config = StoreConfig {
        ttl_seconds: 1,
        ..StoreConfig::default()
    };
    let store = EventStore::with_backend(config, memory.clone());

    let stamp = Utc::now() - Duration::days(60);
    let old = Event::new("sim-1", EventType::SimulationStarted)
        .with_id("stale")
        .at(stamp);
    assert!(store.store_event(old).await);

    tokio::time::sleep(StdDuration::from_millis(1200)).await;
    assert_eq!(store.cleanup_old_events(30).await, 0);

    let keys = KeySpace::new("simtrace");
    assert!(memory.members(&keys.simulation("sim-1")).await.unwrap().is_empty());
    assert!(memory
        .members(&keys.event_type(EventType::SimulationStarted))
        .await
        .unwrap()
        .is_empty());
    assert!(memory
        .members(&keys.time_bucket(stamp.timestamp()))
        .await
        .unwrap()
        .is_empty());
    assert!(memory.stream_ids(&keys.stream("sim-1")).await.unwrap().is_empty());
    assert!(store.get_events(&EventFilter::simulation("sim-1")).await.is_empty());
    assert_eq!(memory.len(), 0);
}

// =============================================================================
// Fallback
// =============================================================================

/// A networked backend whose connection is gone.
struct UnreachableBackend;

#[async_trait]
impl EventBackend for UnreachableBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }

    async fn write(&self, _plan: &WritePlan) -> Result<(), StoreError> {
        Err(StoreError::Connection("connection reset".to_owned()))
    }

    async fn fetch(&self, _keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        Err(StoreError::Connection("connection reset".to_owned()))
    }

    async fn members(&self, _key: &str) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Connection("connection reset".to_owned()))
    }

    async fn stream_ids(&self, _key: &str) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Connection("connection reset".to_owned()))
    }

    async fn remove(&self, _plan: &RemovePlan) -> Result<(), StoreError> {
        Err(StoreError::Connection("connection reset".to_owned()))
    }

    async fn publish(&self, _channel: &str, _payload: Vec<u8>) -> Result<(), StoreError> {
        Err(StoreError::Connection("connection reset".to_owned()))
    }
}

#[tokio::test]
async fn connection_loss_falls_back_with_equivalent_results() {
    let degraded = EventStore::with_backend(StoreConfig::default(), Arc::new(UnreachableBackend));
    let reference = EventStore::in_memory(StoreConfig::default());
    assert_eq!(degraded.backend_kind(), BackendKind::Redis);

    store_all(&degraded, mixed()).await;
    store_all(&reference, mixed()).await;

    assert!(degraded.is_degraded());
    assert_eq!(degraded.backend_kind(), BackendKind::Memory);
    assert_eq!(degraded.metrics().fallback_activations, 1);
    assert_eq!(degraded.metrics().store_errors, 0);

    let filters = [
        EventFilter::default(),
        EventFilter::simulation("sim-a"),
        EventFilter::default().event_types([EventType::PhaseStarted, EventType::SystemEvent]),
        EventFilter::default().between(Some(at(12)), Some(at(26))),
        EventFilter::default().tags(["y"]),
    ];
    for filter in &filters {
        assert_eq!(
            degraded.get_events(filter).await,
            reference.get_events(filter).await,
            "filter {filter:?}"
        );
    }
}

#[tokio::test]
async fn unreachable_store_at_construction_uses_fallback() {
    let config = StoreConfig {
        url: "redis://127.0.0.1:1".to_owned(),
        connect_timeout_ms: 200,
        ..StoreConfig::default()
    };
    let store = EventStore::connect(config).await.unwrap();
    assert_eq!(store.backend_kind(), BackendKind::Memory);
    assert_eq!(store.metrics().fallback_activations, 1);

    store_all(&store, scenario()).await;
    assert_eq!(store.get_events(&EventFilter::simulation("sim-1")).await.len(), 3);
}

#[tokio::test]
async fn unreachable_store_without_fallback_is_an_error() {
    let config = StoreConfig {
        url: "redis://127.0.0.1:1".to_owned(),
        connect_timeout_ms: 200,
        fallback_to_memory: false,
        ..StoreConfig::default()
    };
    assert!(EventStore::connect(config).await.is_err());
}
