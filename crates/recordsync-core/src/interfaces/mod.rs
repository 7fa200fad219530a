// crates/recordsync-core/src/interfaces/mod.rs
// ============================================================================
// Module: recordsync Interfaces
// Description: Backend-agnostic store gateway contract.
// Purpose: Define the only boundaries the reconciliation engine crosses.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! The engine reaches the record store exclusively through [`StoreGateway`]
//! and reports what it did through [`crate::audit::AuditSink`]. Both are
//! injected; no component reaches an ambient connection.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::Record;
use crate::core::RecordQuery;

// ============================================================================
// SECTION: Store Gateway
// ============================================================================

/// Store gateway errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - The engine propagates these unchanged and never retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A referenced record does not exist.
    #[error("record not found: {0}")]
    NotFound(String),
    /// The store rejected a record (missing required field, bad value).
    #[error("store validation failed: {0}")]
    Validation(String),
    /// The store denied access.
    #[error("store permission denied: {0}")]
    Permission(String),
    /// Store I/O error.
    #[error("store io error: {0}")]
    Io(String),
    /// Store backend reported an error.
    #[error("store error: {0}")]
    Store(String),
}

impl StoreError {
    /// Returns a stable label for audit events.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation",
            Self::Permission(_) => "permission",
            Self::Io(_) => "io",
            Self::Store(_) => "store",
        }
    }
}

/// Batched access to a record store.
///
/// Every write verb succeeds or fails as a unit. Identifiers assigned by
/// `create` and `upsert` are written into the caller's records only after the
/// whole batch succeeded.
pub trait StoreGateway {
    /// Returns every stored record matching the query.
    ///
    /// An empty value set returns an empty result without touching the backend.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn query(&self, query: &RecordQuery) -> Result<Vec<Record>, StoreError>;

    /// Creates records and assigns their identifiers in place.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] when a record already carries an
    /// identifier or violates store rules, or another [`StoreError`] on failure.
    fn create(&self, records: &mut [Record]) -> Result<(), StoreError>;

    /// Updates records in place; every record must carry an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when an identifier does not resolve.
    fn update(&self, records: &[Record]) -> Result<(), StoreError>;

    /// Updates records with identifiers and creates the rest, assigning their
    /// identifiers in place.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when any record in the batch is rejected.
    fn upsert(&self, records: &mut [Record]) -> Result<(), StoreError>;

    /// Deletes records; every record must carry an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when an identifier does not resolve.
    fn delete(&self, records: &[Record]) -> Result<(), StoreError>;
}

impl<S: StoreGateway + ?Sized> StoreGateway for &S {
    fn query(&self, query: &RecordQuery) -> Result<Vec<Record>, StoreError> {
        (**self).query(query)
    }

    fn create(&self, records: &mut [Record]) -> Result<(), StoreError> {
        (**self).create(records)
    }

    fn update(&self, records: &[Record]) -> Result<(), StoreError> {
        (**self).update(records)
    }

    fn upsert(&self, records: &mut [Record]) -> Result<(), StoreError> {
        (**self).upsert(records)
    }

    fn delete(&self, records: &[Record]) -> Result<(), StoreError> {
        (**self).delete(records)
    }
}

impl<S: StoreGateway + ?Sized> StoreGateway for Box<S> {
    fn query(&self, query: &RecordQuery) -> Result<Vec<Record>, StoreError> {
        (**self).query(query)
    }

    fn create(&self, records: &mut [Record]) -> Result<(), StoreError> {
        (**self).create(records)
    }

    fn update(&self, records: &[Record]) -> Result<(), StoreError> {
        (**self).update(records)
    }

    fn upsert(&self, records: &mut [Record]) -> Result<(), StoreError> {
        (**self).upsert(records)
    }

    fn delete(&self, records: &[Record]) -> Result<(), StoreError> {
        (**self).delete(records)
    }
}
