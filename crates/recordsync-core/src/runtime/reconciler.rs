// crates/recordsync-core/src/runtime/reconciler.rs
// ============================================================================
// Module: recordsync Reconciler
// Description: Update-or-create classification and single-batch upsert.
// Purpose: Reconcile desired entities against a key index in one write.
// Dependencies: crate::{core, interfaces, runtime}, serde
// ============================================================================

//! ## Overview
//! The reconciler walks a desired batch in order. A key bound in the
//! [`KeyIndex`] reuses the stored record (keeping its identifier); an unbound
//! key yields a new record. Desired attributes are copied and the caller's
//! transform runs on every record, matched or not, so every matched record is
//! written. The whole batch is persisted with exactly one upsert.
//!
//! Duplicate keys inside one batch follow [`IntraBatchPolicy`]:
//! - `Merge` folds every occurrence, in order, into one output record.
//! - `Independent` emits one record per occurrence. For a matched key the
//!   copies share an identifier (last write wins in the store); for an
//!   unmatched key each copy is created, producing duplicate natural keys.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::DesiredEntity;
use crate::core::EntitySchema;
use crate::core::Record;
use crate::interfaces::StoreGateway;
use crate::runtime::error::ReconcileError;
use crate::runtime::index::KeyIndex;

// ============================================================================
// SECTION: Policy and Outcomes
// ============================================================================

/// Handling of duplicate natural keys within one desired batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntraBatchPolicy {
    /// Fold duplicates into one record.
    #[default]
    Merge,
    /// Emit one record per occurrence.
    Independent,
}

/// Branch taken for a desired entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// An existing record was reused and updated.
    Update,
    /// A new record was constructed.
    Create,
}

/// Classification of one desired entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    /// Desired natural key.
    pub key: String,
    /// Branch taken.
    pub disposition: Disposition,
    /// Position of the backing record in the output list.
    pub position: usize,
}

// ============================================================================
// SECTION: Plan
// ============================================================================

/// Classified batch awaiting its single write.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilePlan {
    /// Output records in first-occurrence order.
    records: Vec<Record>,
    /// One outcome per desired entity, in input order.
    outcomes: Vec<ReconcileOutcome>,
}

impl ReconcilePlan {
    /// Returns the records that will be written.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Returns mutable access to the records before they are written.
    pub fn records_mut(&mut self) -> &mut [Record] {
        &mut self.records
    }

    /// Returns per-entity outcomes.
    #[must_use]
    pub fn outcomes(&self) -> &[ReconcileOutcome] {
        &self.outcomes
    }

    /// Persists the batch with exactly one upsert.
    ///
    /// An empty plan performs no write.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Store`] when the upsert fails; no identifier
    /// is assigned in that case.
    pub fn commit<S>(mut self, store: &S) -> Result<ReconcileReport, ReconcileError>
    where
        S: StoreGateway + ?Sized,
    {
        if !self.records.is_empty() {
            store.upsert(&mut self.records)?;
        }
        Ok(ReconcileReport {
            records: self.records,
            outcomes: self.outcomes,
        })
    }
}

/// Result of a committed reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Persisted records; every record carries an identifier.
    pub records: Vec<Record>,
    /// One outcome per desired entity, in input order.
    pub outcomes: Vec<ReconcileOutcome>,
}

impl ReconcileReport {
    /// Returns the persisted record for the first occurrence of a key.
    #[must_use]
    pub fn record_for(&self, key: &str) -> Option<&Record> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.key == key)
            .and_then(|outcome| self.records.get(outcome.position))
    }

    /// Counts distinct output records that were reused from the store.
    #[must_use]
    pub fn updated(&self) -> usize {
        self.count_records(Disposition::Update)
    }

    /// Counts distinct output records that were created.
    #[must_use]
    pub fn created(&self) -> usize {
        self.count_records(Disposition::Create)
    }

    /// Counts output records whose first outcome has `disposition`.
    fn count_records(&self, disposition: Disposition) -> usize {
        let mut seen = BTreeMap::new();
        for outcome in &self.outcomes {
            seen.entry(outcome.position).or_insert(outcome.disposition);
        }
        seen.values().filter(|value| **value == disposition).count()
    }
}

// ============================================================================
// SECTION: Reconciler
// ============================================================================

/// Classifies desired entities and writes them as one batch.
#[derive(Debug, Clone)]
pub struct Reconciler {
    /// Schema of the reconciled entity type.
    schema: EntitySchema,
    /// Duplicate key handling within a batch.
    intra_batch: IntraBatchPolicy,
    /// Optional maximum batch size.
    max_batch_size: Option<usize>,
}

impl Reconciler {
    /// Creates a reconciler that merges duplicate keys and has no size limit.
    #[must_use]
    pub const fn new(schema: EntitySchema) -> Self {
        Self {
            schema,
            intra_batch: IntraBatchPolicy::Merge,
            max_batch_size: None,
        }
    }

    /// Overrides the intra-batch duplicate policy.
    #[must_use]
    pub const fn with_intra_batch(mut self, policy: IntraBatchPolicy) -> Self {
        self.intra_batch = policy;
        self
    }

    /// Bounds the number of desired entities per call.
    #[must_use]
    pub const fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = Some(max);
        self
    }

    /// Returns the reconciled schema.
    #[must_use]
    pub const fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    /// Classifies a desired batch against `index` without writing.
    ///
    /// `transform` runs once per desired entity after its attributes are
    /// copied, and must leave the natural key unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::BatchTooLarge`] over the size limit and
    /// [`ReconcileError::InvalidInput`] for blank keys, a mismatched index, or
    /// a transform that rewrites the natural key.
    pub fn plan<F>(
        &self,
        desired: &[DesiredEntity],
        index: &KeyIndex,
        mut transform: F,
    ) -> Result<ReconcilePlan, ReconcileError>
    where
        F: FnMut(&mut Record, &DesiredEntity, Disposition),
    {
        if let Some(max) = self.max_batch_size
            && desired.len() > max
        {
            return Err(ReconcileError::BatchTooLarge {
                max,
                actual: desired.len(),
            });
        }
        if index.schema() != &self.schema {
            return Err(ReconcileError::InvalidInput(format!(
                "key index for {} cannot reconcile {}",
                index.schema().entity_type,
                self.schema.entity_type
            )));
        }

        let mut records: Vec<Record> = Vec::with_capacity(desired.len());
        let mut dispositions: Vec<Disposition> = Vec::with_capacity(desired.len());
        let mut outcomes = Vec::with_capacity(desired.len());
        let mut positions: BTreeMap<&str, usize> = BTreeMap::new();

        for entity in desired {
            if entity.key.trim().is_empty() {
                return Err(ReconcileError::InvalidInput(
                    "desired entity has a blank key".to_string(),
                ));
            }
            let merged = match self.intra_batch {
                IntraBatchPolicy::Merge => positions.get(entity.key.as_str()).copied(),
                IntraBatchPolicy::Independent => None,
            };
            let position = if let Some(position) = merged {
                position
            } else {
                let (record, disposition) = match index.get(&entity.key) {
                    Some(existing) => (existing.clone(), Disposition::Update),
                    None => (Record::keyed(&self.schema, &entity.key), Disposition::Create),
                };
                records.push(record);
                dispositions.push(disposition);
                let position = records.len() - 1;
                positions.entry(entity.key.as_str()).or_insert(position);
                position
            };
            let disposition = dispositions[position];
            let record = &mut records[position];
            for (name, value) in &entity.fields {
                record.set(name, value.clone());
            }
            record.set(&self.schema.key_field, entity.key.as_str());
            transform(record, entity, disposition);
            if record.natural_key(&self.schema) != Some(entity.key.as_str()) {
                return Err(ReconcileError::InvalidInput(format!(
                    "transform changed natural key {}",
                    entity.key
                )));
            }
            outcomes.push(ReconcileOutcome {
                key: entity.key.clone(),
                disposition,
                position,
            });
        }

        Ok(ReconcilePlan {
            records,
            outcomes,
        })
    }

    /// Classifies a desired batch and persists it with one upsert.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Reconciler::plan`] and [`ReconcilePlan::commit`].
    pub fn reconcile<S, F>(
        &self,
        store: &S,
        desired: &[DesiredEntity],
        index: &KeyIndex,
        transform: F,
    ) -> Result<ReconcileReport, ReconcileError>
    where
        S: StoreGateway + ?Sized,
        F: FnMut(&mut Record, &DesiredEntity, Disposition),
    {
        self.plan(desired, index, transform)?.commit(store)
    }
}
