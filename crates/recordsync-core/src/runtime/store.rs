// crates/recordsync-core/src/runtime/store.rs
// ============================================================================
// Module: recordsync In-Memory Store
// Description: Simple in-memory store gateway for tests and examples.
// Purpose: Provide a deterministic store implementation without external deps.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! This module provides an in-memory [`StoreGateway`] with monotonically
//! assigned identifiers, [`StoreRules`] enforcement, and per-verb call
//! counters for round-trip assertions. It is not intended for production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::Record;
use crate::core::RecordId;
use crate::core::RecordQuery;
use crate::core::StoreRules;
use crate::interfaces::StoreError;
use crate::interfaces::StoreGateway;

// ============================================================================
// SECTION: Call Counters
// ============================================================================

/// Number of gateway calls received per verb.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCallCounts {
    /// `query` calls.
    pub query: usize,
    /// `create` calls.
    pub create: usize,
    /// `update` calls.
    pub update: usize,
    /// `upsert` calls.
    pub upsert: usize,
    /// `delete` calls.
    pub delete: usize,
}

impl StoreCallCounts {
    /// Returns the number of write calls of any verb.
    #[must_use]
    pub const fn writes(&self) -> usize {
        self.create + self.update + self.upsert + self.delete
    }
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Mutable state behind the store mutex.
#[derive(Debug)]
struct MemoryState {
    /// Records keyed by identifier.
    records: BTreeMap<RecordId, Record>,
    /// Next identifier to assign.
    next_id: u64,
    /// Gateway calls received.
    calls: StoreCallCounts,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
            next_id: 1,
            calls: StoreCallCounts::default(),
        }
    }
}

impl MemoryState {
    /// Reserves the next identifier.
    fn allocate(&mut self) -> Result<RecordId, StoreError> {
        let id = RecordId::from_raw(self.next_id)
            .ok_or_else(|| StoreError::Store("identifier space exhausted".to_string()))?;
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or_else(|| StoreError::Store("identifier space exhausted".to_string()))?;
        Ok(id)
    }

    /// Checks that `record` may replace its stored version.
    fn check_existing(&self, record: &Record) -> Result<RecordId, StoreError> {
        let Some(id) = record.id else {
            return Err(StoreError::Validation(format!(
                "{} update requires an identifier",
                record.entity_type
            )));
        };
        match self.records.get(&id) {
            Some(stored) if stored.entity_type == record.entity_type => Ok(id),
            _ => Err(StoreError::NotFound(format!("{} {id}", record.entity_type))),
        }
    }
}

/// In-memory store for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    /// Store state protected by a mutex.
    state: Arc<Mutex<MemoryState>>,
    /// Write validation rules.
    rules: StoreRules,
}

impl InMemoryStore {
    /// Creates an empty store that accepts every write.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store enforcing `rules`.
    #[must_use]
    pub fn with_rules(rules: StoreRules) -> Self {
        Self {
            state: Arc::default(),
            rules,
        }
    }

    /// Seeds a record, keeping its identifier when present.
    ///
    /// Seeding bypasses rules and call counters.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] when the identifier is taken.
    pub fn insert_existing(&self, mut record: Record) -> Result<RecordId, StoreError> {
        let mut state = self.lock()?;
        let id = match record.id {
            Some(id) => {
                if state.records.contains_key(&id) {
                    return Err(StoreError::Validation(format!("identifier {id} already used")));
                }
                state.next_id = state.next_id.max(id.get().saturating_add(1));
                id
            }
            None => state.allocate()?,
        };
        record.id = Some(id);
        state.records.insert(id, record);
        drop(state);
        Ok(id)
    }

    /// Returns the gateway calls received so far.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the store mutex is poisoned.
    pub fn call_counts(&self) -> Result<StoreCallCounts, StoreError> {
        Ok(self.lock()?.calls)
    }

    /// Returns a snapshot of every stored record in identifier order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the store mutex is poisoned.
    pub fn snapshot(&self) -> Result<Vec<Record>, StoreError> {
        Ok(self.lock()?.records.values().cloned().collect())
    }

    /// Locks the store state.
    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Store("memory store mutex poisoned".to_string()))
    }
}

impl StoreGateway for InMemoryStore {
    fn query(&self, query: &RecordQuery) -> Result<Vec<Record>, StoreError> {
        let mut state = self.lock()?;
        state.calls.query += 1;
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let records: Vec<Record> =
            state.records.values().filter(|record| query.matches(record)).cloned().collect();
        drop(state);
        Ok(records)
    }

    fn create(&self, records: &mut [Record]) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.calls.create += 1;
        for record in records.iter() {
            if record.id.is_some() {
                return Err(StoreError::Validation(format!(
                    "{} create must not carry an identifier",
                    record.entity_type
                )));
            }
            self.rules.check_write(record)?;
        }
        let mut assigned = Vec::with_capacity(records.len());
        for record in records.iter() {
            let id = state.allocate()?;
            let mut stored = record.clone();
            stored.id = Some(id);
            state.records.insert(id, stored);
            assigned.push(id);
        }
        drop(state);
        for (record, id) in records.iter_mut().zip(assigned) {
            record.id = Some(id);
        }
        Ok(())
    }

    fn update(&self, records: &[Record]) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.calls.update += 1;
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            ids.push(state.check_existing(record)?);
            self.rules.check_write(record)?;
        }
        for (record, id) in records.iter().zip(ids) {
            state.records.insert(id, record.clone());
        }
        drop(state);
        Ok(())
    }

    fn upsert(&self, records: &mut [Record]) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.calls.upsert += 1;
        for record in records.iter() {
            if record.id.is_some() {
                state.check_existing(record)?;
            }
            self.rules.check_write(record)?;
        }
        let mut assigned = Vec::with_capacity(records.len());
        for record in records.iter() {
            let id = match record.id {
                Some(id) => id,
                None => state.allocate()?,
            };
            let mut stored = record.clone();
            stored.id = Some(id);
            state.records.insert(id, stored);
            assigned.push(id);
        }
        drop(state);
        for (record, id) in records.iter_mut().zip(assigned) {
            record.id = Some(id);
        }
        Ok(())
    }

    fn delete(&self, records: &[Record]) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.calls.delete += 1;
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            ids.push(state.check_existing(record)?);
            self.rules.check_delete(record)?;
        }
        for id in ids {
            state.records.remove(&id);
        }
        drop(state);
        Ok(())
    }
}
