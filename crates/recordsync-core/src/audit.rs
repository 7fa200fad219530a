// crates/recordsync-core/src/audit.rs
// ============================================================================
// Module: recordsync Audit Logging
// Description: Structured audit events for engine operations.
// Purpose: Emit JSON-line operation logs without hard logging dependencies.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every engine operation emits one [`AuditEvent`] describing what it read and
//! wrote. Sinks decide where events go; deployments route them into their own
//! pipeline by implementing [`AuditSink`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::core::EntityType;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Engine operation classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    /// Key index build.
    BuildIndex,
    /// Batch reconcile.
    Reconcile,
    /// Batch reconcile with parent association.
    ReconcileWithParents,
    /// Single-entity get-or-create.
    GetOrCreate,
    /// Transient create-then-delete.
    CreateThenDelete,
    /// Single-record create.
    CreateRecord,
    /// Single-record lookup by natural key.
    FindByKey,
    /// Single-record update by identifier.
    UpdateRecord,
    /// Single-record delete by identifier.
    DeleteRecord,
    /// Child record created against a parent.
    CreateForParent,
}

/// Operation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Operation completed.
    Ok,
    /// Operation aborted with an error.
    Error,
}

/// Engine audit event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Operation that produced the event.
    pub operation: AuditOperation,
    /// Primary entity type touched.
    pub entity_type: String,
    /// Number of entities requested by the caller.
    pub requested: usize,
    /// Entities matched to existing records.
    pub matched: usize,
    /// Records created.
    pub created: usize,
    /// Records updated.
    pub updated: usize,
    /// Records deleted.
    pub deleted: usize,
    /// Operation outcome.
    pub outcome: AuditOutcome,
    /// Normalized error kind label.
    pub error_kind: Option<&'static str>,
}

impl AuditEvent {
    /// Starts a successful event for an operation with zeroed counters.
    #[must_use]
    pub fn new(operation: AuditOperation, entity_type: &EntityType) -> Self {
        Self {
            event: "recordsync_operation",
            timestamp_ms: now_millis(),
            operation,
            entity_type: entity_type.as_str().to_string(),
            requested: 0,
            matched: 0,
            created: 0,
            updated: 0,
            deleted: 0,
            outcome: AuditOutcome::Ok,
            error_kind: None,
        }
    }

    /// Marks the event as failed.
    #[must_use]
    pub const fn failed(mut self, error_kind: &'static str) -> Self {
        self.outcome = AuditOutcome::Error;
        self.error_kind = Some(error_kind);
        self
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink for engine events.
pub trait AuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: &AuditEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &AuditEvent) {}
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the current unix epoch in milliseconds.
fn now_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |duration| duration.as_millis())
}
