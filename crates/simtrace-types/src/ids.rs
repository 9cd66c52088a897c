//! Identifier newtypes.
//!
//! Event identifiers are opaque strings: producers may assign their own,
//! otherwise the store assigns a UUID v7 on insert. Replay session
//! identifiers are always generated in-process.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Globally unique identifier of a stored event.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export, export_to = "bindings/")]
pub struct EventId(String);

impl EventId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is empty (producer did not assign one).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the identifier and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::generate()
    }
}

impl core::fmt::Display for EventId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EventId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for EventId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// Identifier of a running replay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export, export_to = "bindings/")]
pub struct ReplayId(pub Uuid);

impl ReplayId {
    /// Create a new replay identifier (UUID v4, not time-ordered).
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for ReplayId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ReplayId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ReplayId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}
