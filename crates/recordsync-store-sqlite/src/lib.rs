// crates/recordsync-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Record Store
// Description: Durable StoreGateway backend using SQLite WAL.
// Purpose: Persist reconciled records locally with schema enforcement.
// Dependencies: recordsync-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`recordsync_core::StoreGateway`]. Each
//! record is one row holding its entity type and a JSON object of fields;
//! filtered reads match field values through `json_extract`, and every write
//! verb runs in a single transaction so a batch lands or fails as a unit.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteRecordStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
