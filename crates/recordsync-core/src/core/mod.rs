// crates/recordsync-core/src/core/mod.rs
// ============================================================================
// Module: recordsync Core Types
// Description: Canonical record, schema, identifier, and literal types.
// Purpose: Provide stable, serializable types shared by the engine and stores.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Core types describe records and the vocabulary used to query and write
//! them. They carry no store logic; stores and the runtime build on them.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod identifiers;
pub mod literals;
pub mod record;
pub mod rules;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use identifiers::EntityType;
pub use identifiers::RecordId;
pub use literals::BranchMarker;
pub use literals::STAGE_FIELD;
pub use literals::StageName;
pub use record::DesiredEntity;
pub use record::EntitySchema;
pub use record::FieldMap;
pub use record::QueryField;
pub use record::Record;
pub use record::RecordQuery;
pub use rules::StoreRules;
