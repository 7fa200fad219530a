// crates/recordsync-core/src/runtime/index.rs
// ============================================================================
// Module: recordsync Key Index
// Description: Call-scoped natural key to stored record mapping.
// Purpose: Classify desired entities as update-or-create with one store read.
// Dependencies: crate::{core, interfaces, runtime::error}, serde
// ============================================================================

//! ## Overview
//! [`KeyIndexBuilder::build`] issues exactly one filtered read for a set of
//! natural keys and maps each key to its stored record. An empty key set never
//! reaches the store. The resulting [`KeyIndex`] is owned by a single call and
//! discarded afterwards.
//!
//! When the store returns several records for one key the configured
//! [`DuplicateKeyPolicy`] decides: `Reject` fails with
//! [`ReconcileError::AmbiguousMatch`], `LastWins` keeps the last record read.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::EntitySchema;
use crate::core::Record;
use crate::core::RecordId;
use crate::core::RecordQuery;
use crate::interfaces::StoreGateway;
use crate::runtime::error::ReconcileError;

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Behavior when one natural key maps to several stored records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKeyPolicy {
    /// Fail with an ambiguous match error.
    #[default]
    Reject,
    /// Keep the last record returned by the store.
    LastWins,
}

// ============================================================================
// SECTION: Key Index
// ============================================================================

/// Natural key to record mapping for one entity type.
///
/// # Invariants
/// - At most one record per natural key.
/// - Every record's natural key field equals its map key.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyIndex {
    /// Schema the index is keyed by.
    schema: EntitySchema,
    /// Records keyed by natural key.
    entries: BTreeMap<String, Record>,
}

impl KeyIndex {
    /// Creates an empty index.
    #[must_use]
    pub const fn empty(schema: EntitySchema) -> Self {
        Self {
            schema,
            entries: BTreeMap::new(),
        }
    }

    /// Returns the schema the index is keyed by.
    #[must_use]
    pub const fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    /// Returns the record bound to a natural key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Record> {
        self.entries.get(key)
    }

    /// Returns true when a natural key is bound.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the store identifier bound to a natural key.
    #[must_use]
    pub fn id_of(&self, key: &str) -> Option<RecordId> {
        self.entries.get(key).and_then(|record| record.id)
    }

    /// Returns the number of bound keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no key is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates bound keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Binds a record under its natural key, returning any replaced record.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidInput`] when the record belongs to
    /// another entity type or has no natural key.
    pub fn insert(&mut self, record: Record) -> Result<Option<Record>, ReconcileError> {
        if record.entity_type != self.schema.entity_type {
            return Err(ReconcileError::InvalidInput(format!(
                "cannot index {} record in {} index",
                record.entity_type, self.schema.entity_type
            )));
        }
        let Some(key) = record.natural_key(&self.schema).map(str::to_string) else {
            return Err(ReconcileError::InvalidInput(format!(
                "{} record has no {} value",
                record.entity_type, self.schema.key_field
            )));
        };
        Ok(self.entries.insert(key, record))
    }
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builds a [`KeyIndex`] with a single filtered read.
#[derive(Debug, Clone)]
pub struct KeyIndexBuilder {
    /// Schema of the indexed entity type.
    schema: EntitySchema,
    /// Duplicate key handling.
    policy: DuplicateKeyPolicy,
}

impl KeyIndexBuilder {
    /// Creates a builder that rejects duplicate natural keys.
    #[must_use]
    pub fn new(schema: EntitySchema) -> Self {
        Self {
            schema,
            policy: DuplicateKeyPolicy::default(),
        }
    }

    /// Overrides the duplicate key policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: DuplicateKeyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Reads every stored record whose natural key is in `keys`.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Store`] when the read fails and
    /// [`ReconcileError::AmbiguousMatch`] for duplicate keys under
    /// [`DuplicateKeyPolicy::Reject`].
    pub fn build<S, I, K>(&self, store: &S, keys: I) -> Result<KeyIndex, ReconcileError>
    where
        S: StoreGateway + ?Sized,
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let keys: BTreeSet<String> = keys.into_iter().map(|key| key.as_ref().to_string()).collect();
        let mut index = KeyIndex::empty(self.schema.clone());
        if keys.is_empty() {
            return Ok(index);
        }
        let query = RecordQuery::by_field(
            self.schema.entity_type.clone(),
            self.schema.key_field.clone(),
            keys.into_iter().map(Value::from),
        );
        let records = store.query(&query)?;

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for record in records {
            let Some(key) = record.natural_key(&self.schema).map(str::to_string) else {
                continue;
            };
            *counts.entry(key.clone()).or_default() += 1;
            index.entries.insert(key, record);
        }
        if self.policy == DuplicateKeyPolicy::Reject
            && let Some((key, count)) = counts.into_iter().find(|(_, count)| *count > 1)
        {
            return Err(ReconcileError::AmbiguousMatch {
                entity_type: self.schema.entity_type.clone(),
                key,
                count,
            });
        }
        Ok(index)
    }
}
