//! Best-effort live fan-out of newly stored events.
//!
//! Each simulation gets its own Tokio broadcast channel, created lazily on
//! first subscription. Delivery is fire-and-forget: no acknowledgement, no
//! retry, and a lagging subscriber simply misses events. Publishing to a
//! simulation nobody listens to is a no-op.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use simtrace_types::Event;
use tokio::sync::broadcast;

/// Buffered events per simulation channel before slow receivers lag.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Per-simulation in-process publisher.
#[derive(Debug)]
pub struct Broadcaster {
    channels: Mutex<HashMap<String, broadcast::Sender<Arc<Event>>>>,
    capacity: usize,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl Broadcaster {
    /// Create a broadcaster whose channels buffer `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to events stored for `simulation_id` from now on.
    pub fn subscribe(&self, simulation_id: &str) -> broadcast::Receiver<Arc<Event>> {
        self.channels
            .lock()
            .entry(simulation_id.to_owned())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Deliver `event` to current subscribers of its simulation.
    ///
    /// Returns the number of receivers that were handed the event. Channels
    /// whose last receiver has gone away are dropped.
    pub fn publish(&self, event: &Arc<Event>) -> usize {
        let mut channels = self.channels.lock();
        let Some(sender) = channels.get(&event.simulation_id) else {
            return 0;
        };
        if let Ok(delivered) = sender.send(Arc::clone(event)) {
            delivered
        } else {
            channels.remove(&event.simulation_id);
            0
        }
    }

    /// Number of live subscribers for `simulation_id`.
    pub fn subscriber_count(&self, simulation_id: &str) -> usize {
        self.channels
            .lock()
            .get(simulation_id)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}
