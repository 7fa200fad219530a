// crates/recordsync-core/src/core/record.rs
// ============================================================================
// Module: recordsync Records
// Description: Generic records, entity schemas, desired entities, and queries.
// Purpose: Model store records without binding to any concrete entity schema.
// Dependencies: crate::core::identifiers, serde, serde_json
// ============================================================================

//! ## Overview
//! A [`Record`] is a mutable bag of named JSON fields with an optional
//! store-assigned identifier. The identifier is present iff the record has
//! been persisted. Reconciliation identity is the natural key, whose field
//! name is described by an [`EntitySchema`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::EntityType;
use crate::core::identifiers::RecordId;

// ============================================================================
// SECTION: Record
// ============================================================================

/// Named record fields.
pub type FieldMap = BTreeMap<String, Value>;

/// A record as seen by the engine and the store.
///
/// # Invariants
/// - `id` is `Some` iff the record was returned by, or written to, a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Store-assigned identifier, absent until persisted.
    #[serde(default)]
    pub id: Option<RecordId>,
    /// Collection this record belongs to.
    pub entity_type: EntityType,
    /// Field values keyed by field name.
    #[serde(default)]
    pub fields: FieldMap,
}

impl Record {
    /// Creates an empty, unpersisted record of the given type.
    #[must_use]
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            id: None,
            entity_type,
            fields: FieldMap::new(),
        }
    }

    /// Creates an unpersisted record with its natural key populated.
    #[must_use]
    pub fn keyed(schema: &EntitySchema, key: &str) -> Self {
        let mut record = Self::new(schema.entity_type.clone());
        record.set(&schema.key_field, key);
        record
    }

    /// Returns true when the record carries a store identifier.
    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Returns a field value.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns a field value when it is a JSON string.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Returns the natural key described by `schema`.
    #[must_use]
    pub fn natural_key(&self, schema: &EntitySchema) -> Option<&str> {
        self.text(&schema.key_field)
    }

    /// Sets a field value, replacing any previous value.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.fields.insert(name.to_string(), value.into());
    }

    /// Reads a foreign-key field as a record identifier.
    #[must_use]
    pub fn reference(&self, name: &str) -> Option<RecordId> {
        self.fields.get(name).and_then(Value::as_u64).and_then(RecordId::from_raw)
    }

    /// Writes a foreign-key field from a record identifier.
    pub fn set_reference(&mut self, name: &str, id: RecordId) {
        self.set(name, id.get());
    }
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// Describes where an entity type keeps its natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    /// Entity type the schema applies to.
    pub entity_type: EntityType,
    /// Field holding the natural key.
    pub key_field: String,
}

impl EntitySchema {
    /// Creates a schema for `entity_type` keyed by `key_field`.
    #[must_use]
    pub fn new(entity_type: impl Into<EntityType>, key_field: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            key_field: key_field.into(),
        }
    }
}

// ============================================================================
// SECTION: Desired Entities
// ============================================================================

/// One desired entity in a reconciliation batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredEntity {
    /// Natural key.
    pub key: String,
    /// Extra attributes copied onto the reconciled record.
    #[serde(default)]
    pub fields: FieldMap,
}

impl DesiredEntity {
    /// Creates a desired entity with no extra attributes.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fields: FieldMap::new(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }
}

// ============================================================================
// SECTION: Queries
// ============================================================================

/// Field a filtered read matches against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum QueryField {
    /// Match on the store identifier.
    Id,
    /// Match on a named field.
    Field(String),
}

/// Filtered read: all records of a type whose field value is in `values`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordQuery {
    /// Collection to read.
    pub entity_type: EntityType,
    /// Field to filter on.
    pub field: QueryField,
    /// Accepted values (set semantics).
    pub values: Vec<Value>,
}

impl RecordQuery {
    /// Builds a read filtered on a named field.
    #[must_use]
    pub fn by_field(
        entity_type: EntityType,
        field: impl Into<String>,
        values: impl IntoIterator<Item = Value>,
    ) -> Self {
        Self {
            entity_type,
            field: QueryField::Field(field.into()),
            values: values.into_iter().collect(),
        }
    }

    /// Builds a read filtered on store identifiers.
    #[must_use]
    pub fn by_ids(entity_type: EntityType, ids: impl IntoIterator<Item = RecordId>) -> Self {
        Self {
            entity_type,
            field: QueryField::Id,
            values: ids.into_iter().map(|id| Value::from(id.get())).collect(),
        }
    }

    /// Returns true when the value set is empty (no record can match).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Evaluates the filter against a record.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        if record.entity_type != self.entity_type {
            return false;
        }
        match &self.field {
            QueryField::Id => record
                .id
                .is_some_and(|id| self.values.iter().any(|value| value.as_u64() == Some(id.get()))),
            QueryField::Field(name) => {
                record.fields.get(name).is_some_and(|value| self.values.contains(value))
            }
        }
    }
}
