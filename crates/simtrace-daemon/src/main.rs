//! simtrace daemon.
//!
//! Hosts the event store and replay session manager for a simulation
//! platform, and runs scheduled retention cleanup. Producers and replay
//! clients embed the library crates; the daemon owns the long-lived
//! connections and background work.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `simtrace.yaml` (or the first CLI argument)
//! 2. Initialize structured logging (tracing)
//! 3. Connect the event store, falling back to memory if allowed
//! 4. Create the replay engine and session manager
//! 5. Schedule retention cleanup
//! 6. Wait for Ctrl-C, then stop replays and close the store

mod config;
mod error;
mod retention;

use std::path::PathBuf;
use std::sync::Arc;

use simtrace_replay::{ReplayEngine, ReplayManager};
use simtrace_store::EventStore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{DaemonConfig, LogFormat, LoggingConfig};
use crate::error::DaemonError;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "simtrace.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the store cannot be
/// constructed, or the signal handler cannot be installed.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    run().await?;
    Ok(())
}

async fn run() -> Result<(), DaemonError> {
    let config_path = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let (config, loaded_from_file) = load_config(&config_path)?;

    init_logging(&config.logging);
    info!("simtrace-daemon starting");
    if loaded_from_file {
        info!(path = %config_path.display(), "Configuration loaded");
    } else {
        info!(path = %config_path.display(), "Config file not found, using defaults");
    }

    let store = Arc::new(EventStore::connect(config.store.clone()).await?);
    info!(
        backend = store.backend_kind().as_str(),
        degraded = store.is_degraded(),
        key_prefix = config.store.key_prefix,
        "Event store ready"
    );

    let engine = Arc::new(ReplayEngine::new(Arc::clone(&store), config.replay));
    let replays = ReplayManager::new(engine);
    info!(
        default_max_events = config.replay.default_max_events,
        "Replay manager ready"
    );

    let retention_task = retention::spawn(Arc::clone(&store), &config.retention);

    info!("simtrace-daemon running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    let live = replays.active_replays().len();
    if live > 0 {
        warn!(live, "Stopping live replay sessions");
    }
    replays.shutdown().await;
    if let Some(task) = retention_task {
        task.abort();
    }
    store.shutdown().await;

    let metrics = store.metrics();
    info!(
        stored = metrics.stored,
        store_errors = metrics.store_errors,
        query_errors = metrics.query_errors,
        fallback_activations = metrics.fallback_activations,
        "simtrace-daemon stopped"
    );
    Ok(())
}

/// Load the daemon configuration, using defaults when the file is absent.
fn load_config(path: &std::path::Path) -> Result<(DaemonConfig, bool), DaemonError> {
    if path.exists() {
        Ok((DaemonConfig::from_file(path)?, true))
    } else {
        Ok((DaemonConfig::parse("")?, false))
    }
}

fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}
