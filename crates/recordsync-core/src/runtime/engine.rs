// crates/recordsync-core/src/runtime/engine.rs
// ============================================================================
// Module: recordsync Engine
// Description: Configured, audited façade over the reconciliation components.
// Purpose: Run every engine operation against one injected store gateway.
// Dependencies: crate::{audit, core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! [`ReconcileEngine`] owns a store gateway, an audit sink, and the policy
//! configuration, and exposes each operation with a bounded number of store
//! round-trips. Within a call every read completes before any write, and each
//! write verb is issued at most once as a batch. Every call emits exactly one
//! audit event, successful or not.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use crate::audit::AuditEvent;
use crate::audit::AuditOperation;
use crate::audit::AuditSink;
use crate::audit::NoopAuditSink;
use crate::core::BranchMarker;
use crate::core::DesiredEntity;
use crate::core::EntitySchema;
use crate::core::EntityType;
use crate::core::FieldMap;
use crate::core::Record;
use crate::core::RecordId;
use crate::interfaces::StoreGateway;
use crate::runtime::error::ReconcileError;
use crate::runtime::index::DuplicateKeyPolicy;
use crate::runtime::index::KeyIndex;
use crate::runtime::index::KeyIndexBuilder;
use crate::runtime::lifecycle;
use crate::runtime::lifecycle::LifecycleReport;
use crate::runtime::lifecycle::TransientBatch;
use crate::runtime::linker::AssociationLinker;
use crate::runtime::operations;
use crate::runtime::operations::GetOrCreateOutcome;
use crate::runtime::operations::NewChild;
use crate::runtime::reconciler::Disposition;
use crate::runtime::reconciler::IntraBatchPolicy;
use crate::runtime::reconciler::ReconcileReport;
use crate::runtime::reconciler::Reconciler;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Default maximum desired entities per batch call.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 200;

/// Engine policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Duplicate natural keys returned by a store read.
    pub duplicate_keys: DuplicateKeyPolicy,
    /// Duplicate natural keys within one desired batch.
    pub intra_batch: IntraBatchPolicy,
    /// Maximum desired entities per batch call.
    pub max_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            duplicate_keys: DuplicateKeyPolicy::default(),
            intra_batch: IntraBatchPolicy::default(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

// ============================================================================
// SECTION: Reports
// ============================================================================

/// Outcome of reconciling children and linking them to parents.
#[derive(Debug, Clone, PartialEq)]
pub struct ParentLinkReport {
    /// Reconciled children, foreign keys assigned.
    pub children: ReconcileReport,
    /// Parents created for unmatched parent keys.
    pub created_parents: Vec<Record>,
    /// Children assigned a parent.
    pub linked: usize,
    /// Children left unassociated for a blank parent key.
    pub skipped: usize,
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Reconciliation engine bound to one store gateway.
pub struct ReconcileEngine<S> {
    /// Store gateway implementation.
    store: S,
    /// Audit sink for operation events.
    audit: Arc<dyn AuditSink>,
    /// Engine policy configuration.
    config: EngineConfig,
}

impl<S> ReconcileEngine<S>
where
    S: StoreGateway,
{
    /// Creates an engine that discards audit events.
    #[must_use]
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self {
            store,
            audit: Arc::new(NoopAuditSink),
            config,
        }
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Returns the store gateway.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Returns the engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Builds a key index for `keys` with one read (none for an empty set).
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] when the read fails or a key is ambiguous.
    pub fn build_index<I, K>(
        &self,
        schema: &EntitySchema,
        keys: I,
    ) -> Result<KeyIndex, ReconcileError>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let keys: Vec<K> = keys.into_iter().collect();
        let mut event = AuditEvent::new(AuditOperation::BuildIndex, &schema.entity_type);
        event.requested = keys.len();
        let result = self.index_builder(schema).build(&self.store, keys);
        self.audited(event, result, |event, index| event.matched = index.len())
    }

    /// Reconciles a desired batch: one read, classification, one upsert.
    ///
    /// `transform` runs on every record after desired attributes are copied.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] from the index read, classification, or the
    /// upsert; nothing is written when classification fails.
    pub fn reconcile<F>(
        &self,
        schema: &EntitySchema,
        desired: &[DesiredEntity],
        transform: F,
    ) -> Result<ReconcileReport, ReconcileError>
    where
        F: FnMut(&mut Record, &DesiredEntity, Disposition),
    {
        let mut event = AuditEvent::new(AuditOperation::Reconcile, &schema.entity_type);
        event.requested = desired.len();
        let result = self.reconcile_inner(schema, desired, transform);
        self.audited(event, result, |event, report| {
            event.matched = report.updated();
            event.updated = report.updated();
            event.created = report.created();
        })
    }

    /// Reconciles children and links each to its natural-key parent.
    ///
    /// Round-trips: child read, parent read, parent create (only when parents
    /// are missing), child upsert.
    ///
    /// # Errors
    ///
    /// Returns the first [`ReconcileError`] of any stage; children are not
    /// written when a parent create fails.
    pub fn reconcile_with_parents<F>(
        &self,
        child_schema: &EntitySchema,
        desired: &[DesiredEntity],
        linker: &AssociationLinker,
        transform: F,
    ) -> Result<ParentLinkReport, ReconcileError>
    where
        F: FnMut(&mut Record, &DesiredEntity, Disposition),
    {
        let mut event =
            AuditEvent::new(AuditOperation::ReconcileWithParents, &child_schema.entity_type);
        event.requested = desired.len();
        let result = self.reconcile_with_parents_inner(child_schema, desired, linker, transform);
        self.audited(event, result, |event, report| {
            event.matched = report.children.updated();
            event.updated = report.children.updated();
            event.created = report.children.created() + report.created_parents.len();
        })
    }

    /// Finds or creates one record, persisting a branch marker.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] when the read or upsert fails.
    pub fn get_or_create(
        &self,
        schema: &EntitySchema,
        key: &str,
        marker_field: &str,
    ) -> Result<GetOrCreateOutcome, ReconcileError> {
        let mut event = AuditEvent::new(AuditOperation::GetOrCreate, &schema.entity_type);
        event.requested = 1;
        let result = operations::get_or_create(
            &self.store,
            schema,
            key,
            marker_field,
            self.config.duplicate_keys,
        );
        self.audited(event, result, |event, outcome| match outcome.marker {
            BranchMarker::Updated => {
                event.matched = 1;
                event.updated = 1;
            }
            BranchMarker::New => event.created = 1,
        })
    }

    /// Creates transient records for a parent, re-reads, and deletes them.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] when a store call fails or the re-read
    /// misses a created record.
    pub fn create_then_delete(
        &self,
        batch: &TransientBatch,
        count: usize,
    ) -> Result<LifecycleReport, ReconcileError> {
        let mut event =
            AuditEvent::new(AuditOperation::CreateThenDelete, &batch.schema.entity_type);
        event.requested = count;
        let result = if count > self.config.max_batch_size {
            Err(ReconcileError::BatchTooLarge {
                max: self.config.max_batch_size,
                actual: count,
            })
        } else {
            lifecycle::create_then_delete(&self.store, batch, count)
        };
        self.audited(event, result, |event, report| {
            event.matched = report.observed;
            event.created = report.created;
            event.deleted = report.deleted;
        })
    }

    /// Creates one record.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] when the create fails.
    pub fn create_record(
        &self,
        schema: &EntitySchema,
        key: &str,
        fields: &FieldMap,
    ) -> Result<Record, ReconcileError> {
        let mut event = AuditEvent::new(AuditOperation::CreateRecord, &schema.entity_type);
        event.requested = 1;
        let result = operations::create_record(&self.store, schema, key, fields);
        self.audited(event, result, |event, _| event.created = 1)
    }

    /// Returns the unique record named `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::NotFound`] or [`ReconcileError::AmbiguousMatch`].
    pub fn find_by_key(&self, schema: &EntitySchema, key: &str) -> Result<Record, ReconcileError> {
        let mut event = AuditEvent::new(AuditOperation::FindByKey, &schema.entity_type);
        event.requested = 1;
        let result = operations::find_by_key(&self.store, schema, key);
        self.audited(event, result, |event, _| event.matched = 1)
    }

    /// Merges fields into the record with identifier `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::NotFound`] when the identifier does not resolve.
    pub fn update_record(
        &self,
        entity_type: &EntityType,
        id: RecordId,
        fields: &FieldMap,
    ) -> Result<Record, ReconcileError> {
        let mut event = AuditEvent::new(AuditOperation::UpdateRecord, entity_type);
        event.requested = 1;
        let result = operations::update_record(&self.store, entity_type, id, fields);
        self.audited(event, result, |event, _| {
            event.matched = 1;
            event.updated = 1;
        })
    }

    /// Deletes the record with identifier `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::NotFound`] when the identifier does not resolve.
    pub fn delete_record(
        &self,
        entity_type: &EntityType,
        id: RecordId,
    ) -> Result<Record, ReconcileError> {
        let mut event = AuditEvent::new(AuditOperation::DeleteRecord, entity_type);
        event.requested = 1;
        let result = operations::delete_record(&self.store, entity_type, id);
        self.audited(event, result, |event, _| {
            event.matched = 1;
            event.deleted = 1;
        })
    }

    /// Creates a child record referencing an existing parent.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::NotFound`] when the parent does not exist.
    pub fn create_for_parent(&self, child: &NewChild) -> Result<Record, ReconcileError> {
        let mut event = AuditEvent::new(AuditOperation::CreateForParent, &child.schema.entity_type);
        event.requested = 1;
        let result = operations::create_for_parent(&self.store, child);
        self.audited(event, result, |event, _| event.created = 1)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Returns a key index builder with the configured duplicate policy.
    fn index_builder(&self, schema: &EntitySchema) -> KeyIndexBuilder {
        KeyIndexBuilder::new(schema.clone()).with_policy(self.config.duplicate_keys)
    }

    /// Returns a reconciler with the configured batch policies.
    fn reconciler(&self, schema: &EntitySchema) -> Reconciler {
        Reconciler::new(schema.clone())
            .with_intra_batch(self.config.intra_batch)
            .with_max_batch_size(self.config.max_batch_size)
    }

    /// Runs a batch reconcile without auditing.
    fn reconcile_inner<F>(
        &self,
        schema: &EntitySchema,
        desired: &[DesiredEntity],
        transform: F,
    ) -> Result<ReconcileReport, ReconcileError>
    where
        F: FnMut(&mut Record, &DesiredEntity, Disposition),
    {
        self.check_batch(desired.len())?;
        let index = self
            .index_builder(schema)
            .build(&self.store, desired.iter().map(|entity| &entity.key))?;
        self.reconciler(schema).reconcile(&self.store, desired, &index, transform)
    }

    /// Runs the child/parent pipeline without auditing.
    fn reconcile_with_parents_inner<F>(
        &self,
        child_schema: &EntitySchema,
        desired: &[DesiredEntity],
        linker: &AssociationLinker,
        transform: F,
    ) -> Result<ParentLinkReport, ReconcileError>
    where
        F: FnMut(&mut Record, &DesiredEntity, Disposition),
    {
        self.check_batch(desired.len())?;
        let child_index = self
            .index_builder(child_schema)
            .build(&self.store, desired.iter().map(|entity| &entity.key))?;
        let mut plan = self.reconciler(child_schema).plan(desired, &child_index, transform)?;

        let parent_keys = linker.parent_keys(plan.records());
        let parent_index =
            self.index_builder(linker.parent_schema()).build(&self.store, parent_keys)?;
        let committed = linker.plan(plan.records(), parent_index)?.commit(&self.store)?;
        let link = committed.bind(plan.records_mut())?;

        let children = plan.commit(&self.store)?;
        Ok(ParentLinkReport {
            children,
            created_parents: link.created_parents,
            linked: link.linked,
            skipped: link.skipped,
        })
    }

    /// Rejects batches over the configured limit.
    const fn check_batch(&self, actual: usize) -> Result<(), ReconcileError> {
        if actual > self.config.max_batch_size {
            return Err(ReconcileError::BatchTooLarge {
                max: self.config.max_batch_size,
                actual,
            });
        }
        Ok(())
    }

    /// Records one audit event for an operation result and returns the result.
    fn audited<T, F>(
        &self,
        mut event: AuditEvent,
        result: Result<T, ReconcileError>,
        fill: F,
    ) -> Result<T, ReconcileError>
    where
        F: FnOnce(&mut AuditEvent, &T),
    {
        match &result {
            Ok(value) => {
                fill(&mut event, value);
                self.audit.record(&event);
            }
            Err(error) => self.audit.record(&event.failed(error.kind())),
        }
        result
    }
}
