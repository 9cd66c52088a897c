//! In-process volatile backend.
//!
//! Offers the same contract as the networked store minus TTL precision
//! (expired records are dropped lazily when read) and minus remote pub/sub
//! delivery (local subscribers are served by the
//! [`crate::broadcast::Broadcaster`]).
//!
//! Each record remembers the index sets and stream it was written to, so
//! an overwrite, removal, or expiry detaches the id from exactly those
//! memberships under the same lock that changes the record.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{BackendKind, EventBackend};
use crate::error::StoreError;
use crate::index::{RemovePlan, WritePlan};

#[derive(Debug)]
struct Record {
    event_id: String,
    payload: Vec<u8>,
    expires_at: Option<Instant>,
    index_keys: [String; 3],
    stream_key: String,
}

impl Record {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    records: HashMap<String, Record>,
    sets: HashMap<String, BTreeSet<String>>,
    streams: HashMap<String, Vec<String>>,
}

impl MemoryState {
    fn detach_set(&mut self, key: &str, member: &str) {
        let now_empty = self.sets.get_mut(key).is_some_and(|set| {
            set.remove(member);
            set.is_empty()
        });
        if now_empty {
            self.sets.remove(key);
        }
    }

    fn detach_stream(&mut self, key: &str, member: &str) {
        let now_empty = self.streams.get_mut(key).is_some_and(|ids| {
            ids.retain(|id| id != member);
            ids.is_empty()
        });
        if now_empty {
            self.streams.remove(key);
        }
    }

    /// Drop a primary record together with every membership it owns.
    fn purge(&mut self, primary_key: &str) {
        if let Some(record) = self.records.remove(primary_key) {
            for key in &record.index_keys {
                self.detach_set(key, &record.event_id);
            }
            self.detach_stream(&record.stream_key, &record.event_id);
        }
    }
}

/// Volatile key-value store with set and stream support.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
}

impl MemoryBackend {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live primary records.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.state
            .read()
            .records
            .values()
            .filter(|r| r.is_live(now))
            .count()
    }

    /// Whether no live primary records exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn expiry(ttl_seconds: Option<i64>) -> Option<Instant> {
    let secs = u64::try_from(ttl_seconds?).ok()?;
    Instant::now().checked_add(Duration::from_secs(secs))
}

#[async_trait]
impl EventBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn write(&self, plan: &WritePlan) -> Result<(), StoreError> {
        let mut state = self.state.write();

        // The stored record, not the caller's earlier read, decides what
        // the overwrite leaves behind.
        let previous = state
            .records
            .get(&plan.primary_key)
            .map(|r| (r.index_keys.clone(), r.stream_key.clone()));
        let mut append_stream = true;
        if let Some((old_keys, old_stream)) = previous {
            for key in old_keys.iter().filter(|k| !plan.index_keys.contains(*k)) {
                state.detach_set(key, &plan.event_id);
            }
            if old_stream == plan.stream.key {
                append_stream = false;
            } else {
                state.detach_stream(&old_stream, &plan.event_id);
            }
        }
        for key in &plan.stale_index_keys {
            state.detach_set(key, &plan.event_id);
        }

        for key in &plan.index_keys {
            state
                .sets
                .entry(key.clone())
                .or_default()
                .insert(plan.event_id.clone());
        }
        state
            .sets
            .entry(plan.registry_key.clone())
            .or_default()
            .insert(plan.simulation_id.clone());
        if append_stream {
            state
                .streams
                .entry(plan.stream.key.clone())
                .or_default()
                .push(plan.event_id.clone());
        }
        state.records.insert(
            plan.primary_key.clone(),
            Record {
                event_id: plan.event_id.clone(),
                payload: plan.payload.clone(),
                expires_at: expiry(plan.ttl_seconds),
                index_keys: plan.index_keys.clone(),
                stream_key: plan.stream.key.clone(),
            },
        );
        Ok(())
    }

    async fn fetch(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        let now = Instant::now();
        let mut expired = Vec::new();
        let found: Vec<Option<Vec<u8>>> = {
            let state = self.state.read();
            keys.iter()
                .map(|key| match state.records.get(key) {
                    Some(record) if record.is_live(now) => Some(record.payload.clone()),
                    Some(_) => {
                        expired.push(key.clone());
                        None
                    }
                    None => None,
                })
                .collect()
        };
        if !expired.is_empty() {
            let mut state = self.state.write();
            for key in expired {
                // A writer may have replaced the record since the read.
                if state.records.get(&key).is_some_and(|r| !r.is_live(now)) {
                    state.purge(&key);
                }
            }
        }
        Ok(found)
    }

    async fn members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .state
            .read()
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn stream_ids(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .state
            .read()
            .streams
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn remove(&self, plan: &RemovePlan) -> Result<(), StoreError> {
        let mut state = self.state.write();
        state.purge(&plan.primary_key);
        for key in &plan.index_keys {
            state.detach_set(key, &plan.event_id);
        }
        Ok(())
    }

    async fn publish(&self, _channel: &str, _payload: Vec<u8>) -> Result<(), StoreError> {
        Ok(())
    }
}
