// crates/recordsync-core/src/runtime/operations.rs
// ============================================================================
// Module: recordsync Single-Record Operations
// Description: Unbatched get-or-create, lookup, create, update, and delete.
// Purpose: Provide thin single-entity operations over the store gateway.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! These operations each touch one record. [`get_or_create`] is the unbatched
//! form of reconciliation: a single-key index read followed by the same
//! classification and one upsert, with a [`BranchMarker`] persisted so the
//! branch taken is visible in stored state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::slice;

use crate::core::BranchMarker;
use crate::core::DesiredEntity;
use crate::core::EntitySchema;
use crate::core::EntityType;
use crate::core::FieldMap;
use crate::core::Record;
use crate::core::RecordId;
use crate::core::RecordQuery;
use crate::core::STAGE_FIELD;
use crate::core::StageName;
use crate::interfaces::StoreGateway;
use crate::runtime::error::ReconcileError;
use crate::runtime::index::DuplicateKeyPolicy;
use crate::runtime::index::KeyIndexBuilder;
use crate::runtime::reconciler::Disposition;
use crate::runtime::reconciler::Reconciler;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Result of a get-or-create call.
#[derive(Debug, Clone, PartialEq)]
pub struct GetOrCreateOutcome {
    /// Persisted record.
    pub record: Record,
    /// Branch taken.
    pub marker: BranchMarker,
}

/// A child record to create under an existing parent.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChild {
    /// Schema of the child entity type.
    pub schema: EntitySchema,
    /// Child natural key.
    pub key: String,
    /// Parent entity type.
    pub parent_type: EntityType,
    /// Parent identifier.
    pub parent_id: RecordId,
    /// Child field receiving the parent identifier.
    pub foreign_key_field: String,
    /// Stage written into [`STAGE_FIELD`].
    pub stage: StageName,
    /// Extra child fields.
    pub fields: FieldMap,
}

// ============================================================================
// SECTION: Operations
// ============================================================================

/// Finds the record named `key` or creates it, writing `marker_field`.
///
/// `marker_field` receives [`BranchMarker::Updated`] when the record existed
/// and [`BranchMarker::New`] when it was created.
///
/// # Errors
///
/// Returns [`ReconcileError::AmbiguousMatch`] under
/// [`DuplicateKeyPolicy::Reject`] and store errors unchanged.
pub fn get_or_create<S>(
    store: &S,
    schema: &EntitySchema,
    key: &str,
    marker_field: &str,
    policy: DuplicateKeyPolicy,
) -> Result<GetOrCreateOutcome, ReconcileError>
where
    S: StoreGateway + ?Sized,
{
    let index = KeyIndexBuilder::new(schema.clone()).with_policy(policy).build(store, [key])?;
    let mut marker = BranchMarker::New;
    let report = Reconciler::new(schema.clone()).reconcile(
        store,
        &[DesiredEntity::new(key)],
        &index,
        |record, _, disposition| {
            marker = match disposition {
                Disposition::Update => BranchMarker::Updated,
                Disposition::Create => BranchMarker::New,
            };
            record.set(marker_field, marker);
        },
    )?;
    let record = report.records.into_iter().next().ok_or_else(|| {
        ReconcileError::InvalidInput(format!("no record reconciled for key {key}"))
    })?;
    Ok(GetOrCreateOutcome {
        record,
        marker,
    })
}

/// Creates one record keyed by `key`.
///
/// # Errors
///
/// Returns [`ReconcileError::InvalidInput`] for a blank key and store errors
/// unchanged.
pub fn create_record<S>(
    store: &S,
    schema: &EntitySchema,
    key: &str,
    fields: &FieldMap,
) -> Result<Record, ReconcileError>
where
    S: StoreGateway + ?Sized,
{
    if key.trim().is_empty() {
        return Err(ReconcileError::InvalidInput("natural key must be non-empty".to_string()));
    }
    let mut record = Record::keyed(schema, key);
    for (name, value) in fields {
        if name != &schema.key_field {
            record.set(name, value.clone());
        }
    }
    store.create(slice::from_mut(&mut record))?;
    Ok(record)
}

/// Returns the unique record named `key`.
///
/// # Errors
///
/// Returns [`ReconcileError::NotFound`] when no record matches and
/// [`ReconcileError::AmbiguousMatch`] when several do.
pub fn find_by_key<S>(store: &S, schema: &EntitySchema, key: &str) -> Result<Record, ReconcileError>
where
    S: StoreGateway + ?Sized,
{
    let query =
        RecordQuery::by_field(schema.entity_type.clone(), schema.key_field.clone(), [key.into()]);
    let mut records = store.query(&query)?;
    match records.len() {
        0 => Err(ReconcileError::NotFound {
            entity_type: schema.entity_type.clone(),
            key: key.to_string(),
        }),
        1 => records.pop().ok_or_else(|| ReconcileError::NotFound {
            entity_type: schema.entity_type.clone(),
            key: key.to_string(),
        }),
        count => Err(ReconcileError::AmbiguousMatch {
            entity_type: schema.entity_type.clone(),
            key: key.to_string(),
            count,
        }),
    }
}

/// Reads one record by identifier.
///
/// # Errors
///
/// Returns [`ReconcileError::NotFound`] when the identifier does not resolve.
pub fn find_by_id<S>(
    store: &S,
    entity_type: &EntityType,
    id: RecordId,
) -> Result<Record, ReconcileError>
where
    S: StoreGateway + ?Sized,
{
    let query = RecordQuery::by_ids(entity_type.clone(), [id]);
    store.query(&query)?.into_iter().next().ok_or_else(|| ReconcileError::NotFound {
        entity_type: entity_type.clone(),
        key: id.to_string(),
    })
}

/// Merges `fields` into the record with identifier `id`.
///
/// # Errors
///
/// Returns [`ReconcileError::NotFound`] when the identifier does not resolve
/// and store errors unchanged.
pub fn update_record<S>(
    store: &S,
    entity_type: &EntityType,
    id: RecordId,
    fields: &FieldMap,
) -> Result<Record, ReconcileError>
where
    S: StoreGateway + ?Sized,
{
    let mut record = find_by_id(store, entity_type, id)?;
    for (name, value) in fields {
        record.set(name, value.clone());
    }
    store.update(slice::from_ref(&record))?;
    Ok(record)
}

/// Deletes the record with identifier `id`, returning its last stored state.
///
/// # Errors
///
/// Returns [`ReconcileError::NotFound`] when the identifier does not resolve
/// and store errors unchanged.
pub fn delete_record<S>(
    store: &S,
    entity_type: &EntityType,
    id: RecordId,
) -> Result<Record, ReconcileError>
where
    S: StoreGateway + ?Sized,
{
    let record = find_by_id(store, entity_type, id)?;
    store.delete(slice::from_ref(&record))?;
    Ok(record)
}

/// Creates a child record referencing an existing parent.
///
/// The child carries the parent identifier and `child.stage` in
/// [`STAGE_FIELD`]; both override same-named entries of `child.fields`.
///
/// # Errors
///
/// Returns [`ReconcileError::NotFound`] when the parent does not exist and
/// store errors unchanged.
pub fn create_for_parent<S>(store: &S, child: &NewChild) -> Result<Record, ReconcileError>
where
    S: StoreGateway + ?Sized,
{
    let parent = find_by_id(store, &child.parent_type, child.parent_id)?;
    let mut fields = child.fields.clone();
    if let Some(parent_id) = parent.id {
        fields.insert(child.foreign_key_field.clone(), parent_id.get().into());
    }
    fields.insert(STAGE_FIELD.to_string(), child.stage.into());
    create_record(store, &child.schema, &child.key, &fields)
}
