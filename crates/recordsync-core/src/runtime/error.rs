// crates/recordsync-core/src/runtime/error.rs
// ============================================================================
// Module: recordsync Engine Errors
// Description: Error taxonomy for reconciliation and single-record operations.
// Purpose: Surface store failures unchanged alongside engine-detected errors.
// Dependencies: crate::{core, interfaces}, thiserror
// ============================================================================

//! ## Overview
//! Engine errors wrap [`StoreError`] transparently and add the conditions the
//! engine itself detects. Nothing here is retried; every error aborts the
//! remainder of the call that raised it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::EntityType;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Reconciliation engine errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// Store gateway failure, propagated unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A natural key or identifier did not resolve to a stored record.
    #[error("{entity_type} record not found: {key}")]
    NotFound {
        /// Entity type searched.
        entity_type: EntityType,
        /// Natural key or identifier searched for.
        key: String,
    },
    /// More than one stored record shares a natural key.
    #[error("{count} {entity_type} records share natural key {key}")]
    AmbiguousMatch {
        /// Entity type searched.
        entity_type: EntityType,
        /// Shared natural key.
        key: String,
        /// Number of matching records.
        count: usize,
    },
    /// Desired batch exceeds the configured limit.
    #[error("batch of {actual} entities exceeds limit of {max}")]
    BatchTooLarge {
        /// Maximum entities per call.
        max: usize,
        /// Entities supplied.
        actual: usize,
    },
    /// A read issued after a write did not observe the written records.
    #[error("read-after-write observed {observed} of {expected} records")]
    ReadAfterWrite {
        /// Records written.
        expected: usize,
        /// Written records observed by the re-read.
        observed: usize,
    },
    /// Caller input is malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ReconcileError {
    /// Returns a stable label for audit events.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Store(error) => error.kind(),
            Self::NotFound {
                ..
            } => "not_found",
            Self::AmbiguousMatch {
                ..
            } => "ambiguous_match",
            Self::BatchTooLarge {
                ..
            } => "batch_too_large",
            Self::ReadAfterWrite {
                ..
            } => "read_after_write",
            Self::InvalidInput(_) => "invalid_input",
        }
    }
}
