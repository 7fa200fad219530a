// crates/recordsync-core/src/runtime/mod.rs
// ============================================================================
// Module: recordsync Runtime
// Description: Key indexing, reconciliation, association, and the engine.
// Purpose: Drive natural-key reconciliation through the store gateway.
// Dependencies: crate::{audit, core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime modules implement the reconciliation pipeline: read a key index,
//! classify desired entities, link children to parents, and persist each
//! stage with batched writes. External surfaces call into [`ReconcileEngine`]
//! so every path shares the same round-trip bounds.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod engine;
pub mod error;
pub mod index;
pub mod lifecycle;
pub mod linker;
pub mod operations;
pub mod reconciler;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use engine::DEFAULT_MAX_BATCH_SIZE;
pub use engine::EngineConfig;
pub use engine::ParentLinkReport;
pub use engine::ReconcileEngine;
pub use error::ReconcileError;
pub use index::DuplicateKeyPolicy;
pub use index::KeyIndex;
pub use index::KeyIndexBuilder;
pub use lifecycle::LifecycleReport;
pub use lifecycle::TransientBatch;
pub use linker::AssociationLinker;
pub use linker::AssociationPlan;
pub use linker::CommittedParents;
pub use linker::LinkReport;
pub use linker::ParentKey;
pub use operations::GetOrCreateOutcome;
pub use operations::NewChild;
pub use reconciler::Disposition;
pub use reconciler::IntraBatchPolicy;
pub use reconciler::ReconcileOutcome;
pub use reconciler::ReconcilePlan;
pub use reconciler::ReconcileReport;
pub use reconciler::Reconciler;
pub use store::InMemoryStore;
pub use store::StoreCallCounts;
