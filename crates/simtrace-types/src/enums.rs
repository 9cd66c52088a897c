//! Enumeration types shared across the store and replay crates.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Event Types
// ---------------------------------------------------------------------------

/// The closed set of event categories a producer may emit.
///
/// Serialized as `snake_case` strings; the same string is used as the
/// `type:{event_type}` index key in the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum EventType {
    // --- Simulation lifecycle ---
    /// A simulation run began.
    SimulationStarted,
    /// A simulation run finished successfully.
    SimulationCompleted,
    /// A simulation run aborted with an error.
    SimulationFailed,
    /// A simulation run was paused.
    SimulationPaused,
    /// A paused simulation run resumed.
    SimulationResumed,

    // --- Phases ---
    /// A workflow phase began.
    PhaseStarted,
    /// A workflow phase finished.
    PhaseCompleted,
    /// A workflow phase failed.
    PhaseFailed,

    // --- Artifacts ---
    /// A document was produced.
    DocumentGenerated,
    /// An existing document was revised.
    DocumentUpdated,

    // --- Activity ---
    /// A decision point was resolved.
    DecisionMade,
    /// A metric sample was captured.
    MetricRecorded,
    /// A user interacted with the run.
    UserAction,

    // --- Diagnostics ---
    /// An error was raised during the run.
    ErrorOccurred,
    /// A non-fatal warning was raised.
    WarningIssued,

    // --- System ---
    /// Internal bookkeeping event emitted by the engine itself.
    SystemEvent,
}

impl EventType {
    /// Every event type, in declaration order.
    pub const ALL: [Self; 16] = [
        Self::SimulationStarted,
        Self::SimulationCompleted,
        Self::SimulationFailed,
        Self::SimulationPaused,
        Self::SimulationResumed,
        Self::PhaseStarted,
        Self::PhaseCompleted,
        Self::PhaseFailed,
        Self::DocumentGenerated,
        Self::DocumentUpdated,
        Self::DecisionMade,
        Self::MetricRecorded,
        Self::UserAction,
        Self::ErrorOccurred,
        Self::WarningIssued,
        Self::SystemEvent,
    ];

    /// The wire/index name of this event type.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SimulationStarted => "simulation_started",
            Self::SimulationCompleted => "simulation_completed",
            Self::SimulationFailed => "simulation_failed",
            Self::SimulationPaused => "simulation_paused",
            Self::SimulationResumed => "simulation_resumed",
            Self::PhaseStarted => "phase_started",
            Self::PhaseCompleted => "phase_completed",
            Self::PhaseFailed => "phase_failed",
            Self::DocumentGenerated => "document_generated",
            Self::DocumentUpdated => "document_updated",
            Self::DecisionMade => "decision_made",
            Self::MetricRecorded => "metric_recorded",
            Self::UserAction => "user_action",
            Self::ErrorOccurred => "error_occurred",
            Self::WarningIssued => "warning_issued",
            Self::SystemEvent => "system_event",
        }
    }

    /// Human-readable description used by the simulation timeline.
    pub const fn description(self) -> &'static str {
        match self {
            Self::SimulationStarted => "Simulation started",
            Self::SimulationCompleted => "Simulation completed successfully",
            Self::SimulationFailed => "Simulation failed",
            Self::SimulationPaused => "Simulation paused",
            Self::SimulationResumed => "Simulation resumed",
            Self::PhaseStarted => "Phase started",
            Self::PhaseCompleted => "Phase completed",
            Self::PhaseFailed => "Phase failed",
            Self::DocumentGenerated => "Document generated",
            Self::DocumentUpdated => "Document updated",
            Self::DecisionMade => "Decision made",
            Self::MetricRecorded => "Metric recorded",
            Self::UserAction => "User action performed",
            Self::ErrorOccurred => "Error occurred",
            Self::WarningIssued => "Warning issued",
            Self::SystemEvent => "System event",
        }
    }

    /// Whether this is an engine-internal event that replays may exclude.
    pub const fn is_system(self) -> bool {
        matches!(self, Self::SystemEvent)
    }
}

impl core::fmt::Display for EventType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Advisory event priority. Does not influence storage or replay order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Priority {
    /// Background information.
    Low,
    /// The default priority.
    #[default]
    Normal,
    /// Deserves attention.
    High,
    /// Requires immediate attention.
    Critical,
}
