// crates/recordsync-config/src/lib.rs
// ============================================================================
// Module: recordsync Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for recordsync.toml semantics.
// Dependencies: recordsync-core, recordsync-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `recordsync-config` defines the configuration model for recordsync: which
//! store backs the engine, the reconciliation policies, where audit events go,
//! and the natural-key schema and store rules of each entity type. Validation
//! is strict and fail-closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
