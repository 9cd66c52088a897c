//! Replay session manager.
//!
//! Tracks concurrently running replay sessions, each on its own background
//! Tokio task. The tracking map is the only state shared between sessions
//! and is guarded by a mutex that is never held across an await.
//!
//! # Lifecycle
//!
//! ```text
//! start_replay --> Created --> Active --> Completed | Stopped | Failed
//!                                             (removed from tracking)
//! ```
//!
//! Stopping is cooperative: [`ReplayManager::stop_replay`] removes the
//! session from the map, and the running task notices at its next
//! suspension point and exits without delivering further events.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use simtrace_types::{ReplayConfiguration, ReplayId, ReplayState, ReplayStatus};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::engine::{self, ReplayControl, ReplayEngine};
use crate::error::ReplayError;
use crate::sink::ReplaySink;

/// How long [`ReplayManager::shutdown`] waits for a stopped task to exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

struct Session {
    status: ReplayStatus,
    task: Option<JoinHandle<()>>,
}

type Sessions = Arc<Mutex<HashMap<ReplayId, Session>>>;

/// Starts, stops, and reports on background replay sessions.
#[derive(Clone)]
pub struct ReplayManager {
    engine: Arc<ReplayEngine>,
    sessions: Sessions,
}

impl std::fmt::Debug for ReplayManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayManager")
            .field("active", &self.sessions.lock().len())
            .finish_non_exhaustive()
    }
}

/// Liveness of one session: live while it is still tracked.
struct SessionControl {
    replay_id: ReplayId,
    sessions: Sessions,
}

impl ReplayControl for SessionControl {
    fn is_live(&self) -> bool {
        self.sessions.lock().contains_key(&self.replay_id)
    }

    fn on_delivered(&self) {
        if let Some(session) = self.sessions.lock().get_mut(&self.replay_id) {
            session.status.events_delivered = session.status.events_delivered.saturating_add(1);
        }
    }
}

impl SessionControl {
    fn set_state(&self, state: ReplayState) {
        if let Some(session) = self.sessions.lock().get_mut(&self.replay_id) {
            session.status.state = state;
        }
    }

    fn finish(&self) -> bool {
        self.sessions.lock().remove(&self.replay_id).is_some()
    }
}

impl ReplayManager {
    /// Create a manager running replays on `engine`.
    pub fn new(engine: Arc<ReplayEngine>) -> Self {
        Self {
            engine,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The engine sessions run on.
    pub const fn engine(&self) -> &Arc<ReplayEngine> {
        &self.engine
    }

    /// Register a session and start it on a background task.
    ///
    /// Returns immediately with the session id; delivery happens
    /// asynchronously.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::InvalidConfiguration`] if `config` is
    /// unusable. No session is registered in that case.
    pub fn start_replay(
        &self,
        config: ReplayConfiguration,
        sink: impl ReplaySink + 'static,
    ) -> Result<ReplayId, ReplayError> {
        engine::validate(&config)?;

        let replay_id = ReplayId::new();
        self.sessions.lock().insert(
            replay_id,
            Session {
                status: ReplayStatus {
                    replay_id,
                    state: ReplayState::Created,
                    configuration: config.clone(),
                    started_at: Utc::now(),
                    events_delivered: 0,
                },
                task: None,
            },
        );

        let control = SessionControl {
            replay_id,
            sessions: Arc::clone(&self.sessions),
        };
        let engine = Arc::clone(&self.engine);
        let task = tokio::spawn(run_session(engine, config, sink, control));

        if let Some(session) = self.sessions.lock().get_mut(&replay_id) {
            session.task = Some(task);
        }
        info!(replay_id = %replay_id, "Replay session started");
        Ok(replay_id)
    }

    /// Stop a session. Returns `false` if it is unknown or already
    /// finished.
    pub fn stop_replay(&self, replay_id: ReplayId) -> bool {
        let stopped = self.sessions.lock().remove(&replay_id).is_some();
        if stopped {
            info!(replay_id = %replay_id, "Replay session stop requested");
        }
        stopped
    }

    /// Snapshot of a live session, or `None` if unknown or finished.
    pub fn get_replay_status(&self, replay_id: ReplayId) -> Option<ReplayStatus> {
        self.sessions
            .lock()
            .get(&replay_id)
            .map(|session| session.status.clone())
    }

    /// Snapshots of every live session.
    pub fn active_replays(&self) -> Vec<ReplayStatus> {
        self.sessions
            .lock()
            .values()
            .map(|session| session.status.clone())
            .collect()
    }

    /// Stop every session, returning how many were live.
    pub fn stop_all(&self) -> usize {
        self.drain().len()
    }

    /// Stop every session and wait briefly for their tasks to exit,
    /// aborting any that are still suspended after the grace period.
    pub async fn shutdown(&self) {
        let tasks = self.drain();
        let count = tasks.len();
        for mut task in tasks {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!("Replay task did not exit within grace period, aborting");
                task.abort();
            }
        }
        info!(stopped = count, "Replay manager shut down");
    }

    fn drain(&self) -> Vec<JoinHandle<()>> {
        self.sessions
            .lock()
            .drain()
            .filter_map(|(_, session)| session.task)
            .collect()
    }
}

async fn run_session(
    engine: Arc<ReplayEngine>,
    config: ReplayConfiguration,
    mut sink: impl ReplaySink,
    control: SessionControl,
) {
    control.set_state(ReplayState::Active);
    let result = engine
        .replay_with_control(&config, &mut sink, &control)
        .await;

    let final_state = match &result {
        Ok(outcome) if outcome.stopped => ReplayState::Stopped,
        Ok(_) => ReplayState::Completed,
        Err(_) => ReplayState::Failed,
    };
    // A session stopped after its last delivery still counts as stopped.
    let final_state = if control.finish() {
        final_state
    } else {
        ReplayState::Stopped
    };

    match result {
        Ok(outcome) => info!(
            replay_id = %control.replay_id,
            state = ?final_state,
            delivered = outcome.delivered,
            sink_failures = outcome.sink_failures,
            "Replay session finished"
        ),
        Err(e) => error!(
            replay_id = %control.replay_id,
            error = %e,
            "Replay session failed"
        ),
    }
}
