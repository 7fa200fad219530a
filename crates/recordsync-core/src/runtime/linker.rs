// crates/recordsync-core/src/runtime/linker.rs
// ============================================================================
// Module: recordsync Association Linker
// Description: Natural-key foreign-key resolution between parents and children.
// Purpose: Bind children to parents, creating missing parents first.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Linking is a two-stage pipeline expressed as type states:
//!
//! 1. [`AssociationLinker::plan`] derives each child's parent key and queues a
//!    new parent for every key missing from the parent index. A queued key is
//!    registered immediately, so later children sharing it reuse the same
//!    pending parent.
//! 2. [`AssociationPlan::commit`] creates all pending parents in one batch and
//!    registers them with their new identifiers.
//! 3. [`CommittedParents::bind`] assigns foreign keys using post-commit
//!    identifiers only.
//!
//! Children whose derived key is blank are left unassociated.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;

use crate::core::EntitySchema;
use crate::core::FieldMap;
use crate::core::Record;
use crate::interfaces::StoreGateway;
use crate::runtime::error::ReconcileError;
use crate::runtime::index::KeyIndex;

// ============================================================================
// SECTION: Parent Key Derivation
// ============================================================================

/// Boxed parent key derivation function.
type ParentKeyFn = dyn Fn(&Record) -> Option<String> + Send + Sync;

/// Derives a child's parent natural key.
pub struct ParentKey(Box<ParentKeyFn>);

impl ParentKey {
    /// Uses the string value of a child field.
    #[must_use]
    pub fn field(name: impl Into<String>) -> Self {
        let name = name.into();
        Self(Box::new(move |child: &Record| child.text(&name).map(str::to_string)))
    }

    /// Uses an arbitrary derivation.
    #[must_use]
    pub fn derive<F>(derive: F) -> Self
    where
        F: Fn(&Record) -> Option<String> + Send + Sync + 'static,
    {
        Self(Box::new(derive))
    }

    /// Returns the derived key, or `None` when absent or blank.
    #[must_use]
    pub fn resolve(&self, child: &Record) -> Option<String> {
        (self.0)(child).filter(|key| !key.trim().is_empty())
    }
}

impl fmt::Debug for ParentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ParentKey(..)")
    }
}

// ============================================================================
// SECTION: Linker
// ============================================================================

/// Resolves child foreign keys by parent natural key.
#[derive(Debug)]
pub struct AssociationLinker {
    /// Schema of the parent entity type.
    parent_schema: EntitySchema,
    /// Child field receiving the parent identifier.
    foreign_key_field: String,
    /// Parent key derivation.
    parent_key: ParentKey,
    /// Fields written on newly created parents.
    parent_defaults: FieldMap,
}

impl AssociationLinker {
    /// Creates a linker writing parent identifiers into `foreign_key_field`.
    #[must_use]
    pub fn new(
        parent_schema: EntitySchema,
        foreign_key_field: impl Into<String>,
        parent_key: ParentKey,
    ) -> Self {
        Self {
            parent_schema,
            foreign_key_field: foreign_key_field.into(),
            parent_key,
            parent_defaults: FieldMap::new(),
        }
    }

    /// Sets fields copied onto every newly created parent.
    #[must_use]
    pub fn with_parent_defaults(mut self, defaults: FieldMap) -> Self {
        self.parent_defaults = defaults;
        self
    }

    /// Returns the parent schema.
    #[must_use]
    pub const fn parent_schema(&self) -> &EntitySchema {
        &self.parent_schema
    }

    /// Returns the child foreign-key field.
    #[must_use]
    pub fn foreign_key_field(&self) -> &str {
        &self.foreign_key_field
    }

    /// Collects the distinct non-blank parent keys of `children`.
    #[must_use]
    pub fn parent_keys(&self, children: &[Record]) -> BTreeSet<String> {
        children.iter().filter_map(|child| self.parent_key.resolve(child)).collect()
    }

    /// Stage 1: derives parent keys and queues missing parents.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidInput`] when `parent_index` is keyed by
    /// another schema.
    pub fn plan(
        &self,
        children: &[Record],
        parent_index: KeyIndex,
    ) -> Result<AssociationPlan<'_>, ReconcileError> {
        if parent_index.schema() != &self.parent_schema {
            return Err(ReconcileError::InvalidInput(format!(
                "parent index for {} cannot link {} parents",
                parent_index.schema().entity_type,
                self.parent_schema.entity_type
            )));
        }
        let mut pending = Vec::new();
        let mut pending_keys = BTreeSet::new();
        let mut child_keys = Vec::with_capacity(children.len());
        for child in children {
            let key = self.parent_key.resolve(child);
            if let Some(key) = &key
                && !parent_index.contains(key)
                && pending_keys.insert(key.clone())
            {
                let mut parent = Record::keyed(&self.parent_schema, key);
                for (name, value) in &self.parent_defaults {
                    if name != &self.parent_schema.key_field {
                        parent.set(name, value.clone());
                    }
                }
                pending.push(parent);
            }
            child_keys.push(key);
        }
        Ok(AssociationPlan {
            linker: self,
            parent_index,
            pending,
            child_keys,
        })
    }

    /// Runs all stages and persists the children with one upsert.
    ///
    /// # Errors
    ///
    /// Returns the first error of any stage; children are not written when a
    /// parent create fails.
    pub fn link<S>(
        &self,
        store: &S,
        children: &mut [Record],
        parent_index: KeyIndex,
    ) -> Result<LinkReport, ReconcileError>
    where
        S: StoreGateway + ?Sized,
    {
        let report = self.plan(children, parent_index)?.commit(store)?.bind(children)?;
        if !children.is_empty() {
            store.upsert(children)?;
        }
        Ok(report)
    }
}

// ============================================================================
// SECTION: Pipeline Stages
// ============================================================================

/// Stage 1 output: parent keys per child plus parents awaiting creation.
#[derive(Debug)]
pub struct AssociationPlan<'a> {
    /// Linker that produced the plan.
    linker: &'a AssociationLinker,
    /// Existing parents by natural key.
    parent_index: KeyIndex,
    /// Parents to create, one per missing key.
    pending: Vec<Record>,
    /// Derived parent key per child, in child order.
    child_keys: Vec<Option<String>>,
}

impl<'a> AssociationPlan<'a> {
    /// Returns the parents that will be created.
    #[must_use]
    pub fn pending_parents(&self) -> &[Record] {
        &self.pending
    }

    /// Returns the derived parent key of each child.
    #[must_use]
    pub fn child_keys(&self) -> &[Option<String>] {
        &self.child_keys
    }

    /// Stage 2: creates all pending parents in one batch.
    ///
    /// No store call is made when nothing is pending.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Store`] when the create fails.
    pub fn commit<S>(mut self, store: &S) -> Result<CommittedParents<'a>, ReconcileError>
    where
        S: StoreGateway + ?Sized,
    {
        if !self.pending.is_empty() {
            store.create(&mut self.pending)?;
        }
        for parent in &self.pending {
            self.parent_index.insert(parent.clone())?;
        }
        Ok(CommittedParents {
            linker: self.linker,
            parent_index: self.parent_index,
            created: self.pending,
            child_keys: self.child_keys,
        })
    }
}

/// Stage 2 output: every derived key now resolves to a persisted parent.
#[derive(Debug)]
pub struct CommittedParents<'a> {
    /// Linker that produced the plan.
    linker: &'a AssociationLinker,
    /// Parents by natural key, including the newly created ones.
    parent_index: KeyIndex,
    /// Parents created by the commit.
    created: Vec<Record>,
    /// Derived parent key per child, in child order.
    child_keys: Vec<Option<String>>,
}

impl CommittedParents<'_> {
    /// Returns the parents created by the commit.
    #[must_use]
    pub fn created_parents(&self) -> &[Record] {
        &self.created
    }

    /// Stage 3: writes parent identifiers into the children's foreign keys.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidInput`] when `children` is not the
    /// slice that was planned, or a parent lacks an identifier.
    pub fn bind(self, children: &mut [Record]) -> Result<LinkReport, ReconcileError> {
        if children.len() != self.child_keys.len() {
            return Err(ReconcileError::InvalidInput(format!(
                "planned {} children but {} were supplied",
                self.child_keys.len(),
                children.len()
            )));
        }
        let mut linked = 0;
        let mut skipped = 0;
        for (child, key) in children.iter_mut().zip(&self.child_keys) {
            let Some(key) = key else {
                skipped += 1;
                continue;
            };
            let parent_id = self.parent_index.id_of(key).ok_or_else(|| {
                ReconcileError::InvalidInput(format!("parent {key} has no identifier"))
            })?;
            child.set_reference(&self.linker.foreign_key_field, parent_id);
            linked += 1;
        }
        Ok(LinkReport {
            created_parents: self.created,
            linked,
            skipped,
            parent_index: self.parent_index,
        })
    }
}

/// Outcome of a completed link.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkReport {
    /// Parents created during the link.
    pub created_parents: Vec<Record>,
    /// Children assigned a parent.
    pub linked: usize,
    /// Children skipped for a blank parent key.
    pub skipped: usize,
    /// Final parent index.
    pub parent_index: KeyIndex,
}
