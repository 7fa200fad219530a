// crates/recordsync-core/src/runtime/lifecycle.rs
// ============================================================================
// Module: recordsync Transient Lifecycle
// Description: Batch create, re-read by shared filter, batch delete.
// Purpose: Exercise read-after-write and delete-by-reread against a store.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! [`create_then_delete`] creates `count` records tied to one parent, re-reads
//! every record carrying that parent identifier, and deletes the re-read set.
//! Deletion targets what the store returned, not the in-memory batch, so
//! records already linked to the parent before the call are deleted too.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::EntitySchema;
use crate::core::FieldMap;
use crate::core::Record;
use crate::core::RecordId;
use crate::core::RecordQuery;
use crate::interfaces::StoreGateway;
use crate::runtime::error::ReconcileError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Template for transient child records.
#[derive(Debug, Clone, PartialEq)]
pub struct TransientBatch {
    /// Schema of the transient records.
    pub schema: EntitySchema,
    /// Field holding the parent identifier (also the re-read filter).
    pub parent_field: String,
    /// Parent identifier shared by the batch.
    pub parent_id: RecordId,
    /// Natural key prefix; records are keyed `"{prefix} {n}"` from 1.
    pub key_prefix: String,
    /// Extra fields written on every record.
    pub fields: FieldMap,
}

/// Counts observed by a create-then-delete run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleReport {
    /// Records created.
    pub created: usize,
    /// Records returned by the re-read.
    pub observed: usize,
    /// Records deleted.
    pub deleted: usize,
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

/// Creates `count` records for a parent, re-reads them, and deletes the re-read set.
///
/// # Errors
///
/// Returns [`ReconcileError::InvalidInput`] for a zero count,
/// [`ReconcileError::ReadAfterWrite`] when the re-read misses a created
/// record, and [`ReconcileError::Store`] for store failures.
pub fn create_then_delete<S>(
    store: &S,
    batch: &TransientBatch,
    count: usize,
) -> Result<LifecycleReport, ReconcileError>
where
    S: StoreGateway + ?Sized,
{
    if count == 0 {
        return Err(ReconcileError::InvalidInput("count must be greater than zero".to_string()));
    }
    let mut records: Vec<Record> = (1 ..= count)
        .map(|n| {
            let mut record = Record::keyed(&batch.schema, &format!("{} {n}", batch.key_prefix));
            for (name, value) in &batch.fields {
                record.set(name, value.clone());
            }
            record.set_reference(&batch.parent_field, batch.parent_id);
            record
        })
        .collect();
    store.create(&mut records)?;

    let query = RecordQuery::by_field(
        batch.schema.entity_type.clone(),
        batch.parent_field.clone(),
        [Value::from(batch.parent_id.get())],
    );
    let reread = store.query(&query)?;
    let observed_ids: BTreeSet<RecordId> = reread.iter().filter_map(|record| record.id).collect();
    let observed = records
        .iter()
        .filter(|record| record.id.is_some_and(|id| observed_ids.contains(&id)))
        .count();
    if observed != records.len() {
        return Err(ReconcileError::ReadAfterWrite {
            expected: records.len(),
            observed,
        });
    }

    store.delete(&reread)?;
    Ok(LifecycleReport {
        created: records.len(),
        observed: reread.len(),
        deleted: reread.len(),
    })
}
