// crates/recordsync-core/src/core/rules.rs
// ============================================================================
// Module: recordsync Store Rules
// Description: Field-level validation and write permissions enforced by stores.
// Purpose: Give store implementations one shared notion of schema enforcement.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The engine never validates records itself; stores do. [`StoreRules`] is the
//! rule set both bundled stores enforce before accepting a write: required
//! fields per entity type and entity types that reject all writes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde_json::Value;

use crate::core::identifiers::EntityType;
use crate::core::record::Record;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Rules
// ============================================================================

/// Store-side validation and permission rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreRules {
    /// Fields that must be present and non-blank, per entity type.
    required_fields: BTreeMap<EntityType, Vec<String>>,
    /// Entity types that reject every write verb.
    read_only: BTreeSet<EntityType>,
}

impl StoreRules {
    /// Creates an empty rule set that accepts every write.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds required fields for an entity type.
    #[must_use]
    pub fn require<I, S>(mut self, entity_type: impl Into<EntityType>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_fields
            .entry(entity_type.into())
            .or_default()
            .extend(fields.into_iter().map(Into::into));
        self
    }

    /// Marks an entity type as read-only.
    #[must_use]
    pub fn read_only(mut self, entity_type: impl Into<EntityType>) -> Self {
        self.read_only.insert(entity_type.into());
        self
    }

    /// Checks that a record may be created or updated.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Permission`] for read-only types and
    /// [`StoreError::Validation`] when a required field is missing or blank.
    pub fn check_write(&self, record: &Record) -> Result<(), StoreError> {
        self.check_permission(record)?;
        let Some(required) = self.required_fields.get(&record.entity_type) else {
            return Ok(());
        };
        for field in required {
            if is_blank(record.field(field)) {
                return Err(StoreError::Validation(format!(
                    "{} requires field {field}",
                    record.entity_type
                )));
            }
        }
        Ok(())
    }

    /// Checks that a record may be deleted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Permission`] for read-only types.
    pub fn check_delete(&self, record: &Record) -> Result<(), StoreError> {
        self.check_permission(record)
    }

    /// Rejects writes against read-only entity types.
    fn check_permission(&self, record: &Record) -> Result<(), StoreError> {
        if self.read_only.contains(&record.entity_type) {
            return Err(StoreError::Permission(format!(
                "{} is read-only",
                record.entity_type
            )));
        }
        Ok(())
    }
}

/// Returns true for missing, null, or whitespace-only string values.
fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.trim().is_empty(),
        Some(_) => false,
    }
}
