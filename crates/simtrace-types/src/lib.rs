//! Shared type definitions for the simtrace event store.
//!
//! This crate is the single source of truth for the records that flow
//! between producers, the store, the replay engine, and dashboards. Types
//! flow downstream to `TypeScript` via `ts-rs` for live dashboards.
//!
//! # Modules
//!
//! - [`ids`] -- Identifier newtypes for events and replay sessions
//! - [`enums`] -- Event type and priority enumerations
//! - [`event`] -- The canonical [`Event`] record and its builders
//! - [`replay`] -- Replay configuration and session lifecycle types
//! - [`projections`] -- Read-only timeline and statistics views

pub mod enums;
pub mod event;
pub mod ids;
pub mod projections;
pub mod replay;

pub use enums::{EventType, Priority};
pub use event::{Event, Payload};
pub use ids::{EventId, ReplayId};
pub use projections::{EventStatistics, TimeRange, TimelineEntry};
pub use replay::{ReplayConfiguration, ReplayState, ReplayStatus};

#[cfg(test)]
mod tests {
    //! Binding export smoke test.

    #[test]
    fn export_bindings() {
        use ts_rs::TS;

        let _ = crate::ids::EventId::export_all();
        let _ = crate::ids::ReplayId::export_all();
        let _ = crate::enums::EventType::export_all();
        let _ = crate::enums::Priority::export_all();
        let _ = crate::event::Event::export_all();
        let _ = crate::replay::ReplayConfiguration::export_all();
        let _ = crate::replay::ReplayState::export_all();
        let _ = crate::replay::ReplayStatus::export_all();
        let _ = crate::projections::TimelineEntry::export_all();
        let _ = crate::projections::TimeRange::export_all();
        let _ = crate::projections::EventStatistics::export_all();
    }
}
