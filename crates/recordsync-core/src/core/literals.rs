// crates/recordsync-core/src/core/literals.rs
// ============================================================================
// Module: recordsync Field Literals
// Description: Closed sets of literal field values written by the engine.
// Purpose: Keep persisted marker strings in one place shared with tests.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Some engine operations persist fixed string values (branch markers, stage
//! names). They are modelled as enums so a typo cannot produce a value that
//! silently fails to match later.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Branch Marker
// ============================================================================

/// Marks which get-or-create branch last wrote a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchMarker {
    /// The record already existed and was updated.
    #[serde(rename = "Updated")]
    Updated,
    /// The record was created by this call.
    #[serde(rename = "New")]
    New,
}

impl BranchMarker {
    /// Returns the persisted literal.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Updated => "Updated",
            Self::New => "New",
        }
    }

    /// Parses a persisted literal.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Updated" => Some(Self::Updated),
            "New" => Some(Self::New),
            _ => None,
        }
    }
}

impl fmt::Display for BranchMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<BranchMarker> for Value {
    fn from(marker: BranchMarker) -> Self {
        Self::from(marker.as_str())
    }
}

// ============================================================================
// SECTION: Stage Name
// ============================================================================

/// Field receiving the [`StageName`] of a child created against a parent.
pub const STAGE_FIELD: &str = "StageName";

/// Pipeline stage written on child records created against a parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StageName {
    /// Initial contact.
    #[serde(rename = "Prospecting")]
    Prospecting,
    /// Being qualified.
    #[default]
    #[serde(rename = "Qualification")]
    Qualification,
    /// Closed successfully.
    #[serde(rename = "Closed Won")]
    ClosedWon,
    /// Closed unsuccessfully.
    #[serde(rename = "Closed Lost")]
    ClosedLost,
}

impl StageName {
    /// Returns the persisted literal.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Prospecting => "Prospecting",
            Self::Qualification => "Qualification",
            Self::ClosedWon => "Closed Won",
            Self::ClosedLost => "Closed Lost",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<StageName> for Value {
    fn from(stage: StageName) -> Self {
        Self::from(stage.as_str())
    }
}
