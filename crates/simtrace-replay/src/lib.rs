//! Deterministic, speed-controlled replay of stored simulation events.
//!
//! # Modules
//!
//! - [`engine`] -- [`ReplayEngine`]: fetch, order, pace, deliver
//! - [`manager`] -- [`ReplayManager`]: background replay sessions
//! - [`sink`] -- [`ReplaySink`] delivery targets
//! - [`error`] -- Replay error type

pub mod engine;
pub mod error;
pub mod manager;
pub mod sink;

pub use engine::{ReplayControl, ReplayDefaults, ReplayEngine, ReplayOutcome};
pub use error::ReplayError;
pub use manager::ReplayManager;
pub use sink::{ChannelSink, ReplaySink, SinkError};
