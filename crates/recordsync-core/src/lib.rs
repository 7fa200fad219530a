// crates/recordsync-core/src/lib.rs
// ============================================================================
// Module: recordsync Core Library
// Description: Public API surface for natural-key reconciliation.
// Purpose: Expose core types, the store gateway, audit sinks, and the engine.
// Dependencies: crate::{audit, core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! recordsync reconciles desired entities, named by human-readable natural
//! keys, against a record store that only knows surrogate identifiers. It
//! batches reads and writes so a whole reconcile costs a fixed number of
//! round-trips, and links children to parents by natural key, creating missing
//! parents first. Storage backends integrate through [`StoreGateway`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use audit::AuditEvent;
pub use audit::AuditOperation;
pub use audit::AuditOutcome;
pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use interfaces::StoreError;
pub use interfaces::StoreGateway;
pub use runtime::AssociationLinker;
pub use runtime::AssociationPlan;
pub use runtime::CommittedParents;
pub use runtime::DEFAULT_MAX_BATCH_SIZE;
pub use runtime::Disposition;
pub use runtime::DuplicateKeyPolicy;
pub use runtime::EngineConfig;
pub use runtime::GetOrCreateOutcome;
pub use runtime::InMemoryStore;
pub use runtime::IntraBatchPolicy;
pub use runtime::KeyIndex;
pub use runtime::KeyIndexBuilder;
pub use runtime::LifecycleReport;
pub use runtime::LinkReport;
pub use runtime::NewChild;
pub use runtime::ParentKey;
pub use runtime::ParentLinkReport;
pub use runtime::ReconcileEngine;
pub use runtime::ReconcileError;
pub use runtime::ReconcileOutcome;
pub use runtime::ReconcilePlan;
pub use runtime::ReconcileReport;
pub use runtime::Reconciler;
pub use runtime::StoreCallCounts;
pub use runtime::TransientBatch;
