// crates/recordsync-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for plan parsing, bounded reads, and command execution.
// Purpose: Ensure CLI commands drive the engine as configured and fail closed.
// Dependencies: recordsync-cli main helpers, tempfile
// ============================================================================

//! ## Overview
//! Exercises the command executors against the in-memory and `SQLite` stores,
//! and checks that plan files are size-limited and strictly parsed.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;

use recordsync_config::RecordSyncConfig;
use recordsync_core::BranchMarker;
use recordsync_core::InMemoryStore;
use recordsync_core::ReconcileEngine;

use super::FindCommand;
use super::GetOrCreateCommand;
use super::LinkPlan;
use super::ReadLimitError;
use super::ReconcilePlan;
use super::build_engine;
use super::config_summary;
use super::execute_find;
use super::execute_get_or_create;
use super::execute_link;
use super::execute_reconcile;
use super::read_bytes_with_limit;
use super::read_plan;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const MEMORY_CONFIG: &str = r#"
[reconcile]
max_batch_size = 3

[audit]
sink = "none"

[[entities]]
entity_type = "Account"
key_field = "Name"

[[entities]]
entity_type = "Opportunity"
key_field = "Name"
"#;

fn memory_config() -> RecordSyncConfig {
    RecordSyncConfig::from_toml(MEMORY_CONFIG).expect("config parses")
}

fn memory_engine(config: &RecordSyncConfig) -> (InMemoryStore, ReconcileEngine<InMemoryStore>) {
    let store = InMemoryStore::new();
    let engine = ReconcileEngine::new(store.clone(), config.engine_config());
    (store, engine)
}

fn reconcile_plan(keys: &[&str]) -> ReconcilePlan {
    let desired = keys.iter().map(|key| format!(r#"{{"key":"{key}"}}"#)).collect::<Vec<_>>();
    let json = format!(r#"{{"entity_type":"Account","desired":[{}]}}"#, desired.join(","));
    serde_json::from_str(&json).expect("reconcile plan parses")
}

const LINK_PLAN: &str = r#"{
    "entity_type": "Opportunity",
    "parent_type": "Account",
    "parent_key_field": "Account",
    "foreign_key_field": "AccountId",
    "parent_defaults": {"Industry": "Retail"},
    "desired": [
        {"key": "Deal 1", "fields": {"Account": "Acme"}},
        {"key": "Deal 2", "fields": {"Account": "Acme"}},
        {"key": "Deal 3", "fields": {"Account": ""}}
    ]
}"#;

// ============================================================================
// SECTION: Input Tests
// ============================================================================

#[test]
fn read_bytes_with_limit_allows_small_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("small.json");
    fs::write(&path, b"ok").expect("write small file");

    let bytes = read_bytes_with_limit(&path, 16).expect("read small file");
    assert_eq!(bytes, b"ok");
}

#[test]
fn read_bytes_with_limit_rejects_large_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("large.json");
    let limit = 8_usize;
    fs::write(&path, vec![b' '; limit + 1]).expect("write large file");

    match read_bytes_with_limit(&path, limit).expect_err("expected size limit failure") {
        ReadLimitError::TooLarge {
            size,
            limit: reported,
        } => {
            assert_eq!(size, 9);
            assert_eq!(reported, limit);
        }
        ReadLimitError::Io(err) => panic!("unexpected IO error: {err}"),
    }
}

#[test]
fn read_plan_rejects_unknown_fields() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("plan.json");
    fs::write(&path, r#"{"entity_type":"Account","desired":[],"extra":1}"#).expect("write plan");

    let err = read_plan::<ReconcilePlan>(&path).expect_err("unknown field rejected");
    assert!(err.to_string().contains("invalid plan"));
}

#[test]
fn read_plan_reports_missing_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = read_plan::<ReconcilePlan>(&dir.path().join("absent.json")).expect_err("missing");
    assert!(err.to_string().contains("failed to read plan"));
}

// ============================================================================
// SECTION: Command Tests
// ============================================================================

#[test]
fn reconcile_plan_is_idempotent() {
    let config = memory_config();
    let (store, engine) = memory_engine(&config);
    let plan = reconcile_plan(&["Acme", "Globex"]);

    let first = execute_reconcile(&engine, &config, &plan).expect("first run");
    assert_eq!(first.created(), 2);
    let second = execute_reconcile(&engine, &config, &plan).expect("second run");
    assert_eq!(second.updated(), 2);
    assert_eq!(second.created(), 0);
    assert_eq!(store.snapshot().expect("snapshot").len(), 2);
}

#[test]
fn reconcile_plan_respects_configured_batch_limit() {
    let config = memory_config();
    let (store, engine) = memory_engine(&config);
    let plan = reconcile_plan(&["A", "B", "C", "D"]);

    let err = execute_reconcile(&engine, &config, &plan).expect_err("batch too large");
    assert!(err.to_string().contains("exceeds limit of 3"));
    assert_eq!(store.call_counts().expect("counts").writes(), 0);
}

#[test]
fn reconcile_plan_rejects_undeclared_entity_type() {
    let config = memory_config();
    let (_, engine) = memory_engine(&config);
    let plan: ReconcilePlan =
        serde_json::from_str(r#"{"entity_type":"Lead","desired":[]}"#).expect("plan parses");

    let err = execute_reconcile(&engine, &config, &plan).expect_err("undeclared type");
    assert!(err.to_string().contains("entity Lead is not declared"));
}

#[test]
fn link_plan_creates_one_parent_and_assigns_foreign_keys() {
    let config = memory_config();
    let (_, engine) = memory_engine(&config);
    let plan: LinkPlan = serde_json::from_str(LINK_PLAN).expect("link plan parses");

    let output = execute_link(&engine, &config, &plan).expect("link");
    assert_eq!(output.created_parents.len(), 1);
    assert_eq!(output.linked, 2);
    assert_eq!(output.skipped, 1);

    let parent = &output.created_parents[0];
    assert_eq!(parent.text("Industry"), Some("Retail"));
    let parent_id = parent.id.expect("parent persisted");
    for key in ["Deal 1", "Deal 2"] {
        let child = output.children.record_for(key).expect("child reconciled");
        assert_eq!(child.reference("AccountId"), Some(parent_id));
    }
    let orphan = output.children.record_for("Deal 3").expect("orphan reconciled");
    assert_eq!(orphan.reference("AccountId"), None);

    let again = execute_link(&engine, &config, &plan).expect("second link");
    assert!(again.created_parents.is_empty());
    assert_eq!(again.children.updated(), 3);
}

#[test]
fn get_or_create_reports_branch_marker() {
    let config = memory_config();
    let (_, engine) = memory_engine(&config);
    let command = GetOrCreateCommand {
        entity_type: "Account".to_string(),
        key: "Acme".to_string(),
        marker_field: "Description".to_string(),
    };

    let created = execute_get_or_create(&engine, &config, &command).expect("create");
    assert_eq!(created.marker, BranchMarker::New);
    assert_eq!(created.record.text("Description"), Some("New"));

    let reused = execute_get_or_create(&engine, &config, &command).expect("reuse");
    assert_eq!(reused.marker, BranchMarker::Updated);
    assert_eq!(reused.record.id, created.record.id);
    assert_eq!(reused.record.text("Description"), Some("Updated"));
}

#[test]
fn find_reports_missing_key() {
    let config = memory_config();
    let (_, engine) = memory_engine(&config);
    let command = FindCommand {
        entity_type: "Account".to_string(),
        key: "Initech".to_string(),
    };

    let err = execute_find(&engine, &config, &command).expect_err("missing key");
    assert!(err.to_string().contains("Account record not found: Initech"));

    execute_reconcile(&engine, &config, &reconcile_plan(&["Initech"])).expect("seed");
    let record = execute_find(&engine, &config, &command).expect("found");
    assert_eq!(record.text("Name"), Some("Initech"));
}

#[test]
fn config_summary_lists_declared_entities() {
    let summary = config_summary(&memory_config());
    assert_eq!(summary.store, "memory");
    assert_eq!(summary.entities, vec!["Account".to_string(), "Opportunity".to_string()]);
    assert_eq!(summary.max_batch_size, 3);
}

// ============================================================================
// SECTION: Wiring Tests
// ============================================================================

#[test]
fn sqlite_engine_persists_across_invocations() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("records.db");
    let toml = format!(
        "[store]\ntype = \"sqlite\"\npath = \"{}\"\n\n{MEMORY_CONFIG}",
        db_path.display().to_string().replace('\\', "/")
    );
    let config = RecordSyncConfig::from_toml(&toml).expect("sqlite config parses");

    let engine = build_engine(&config).expect("first engine");
    execute_reconcile(&engine, &config, &reconcile_plan(&["Acme"])).expect("reconcile");
    drop(engine);

    let engine = build_engine(&config).expect("second engine");
    let command = FindCommand {
        entity_type: "Account".to_string(),
        key: "Acme".to_string(),
    };
    let record = execute_find(&engine, &config, &command).expect("persisted record");
    assert!(record.id.is_some());
}

#[test]
fn memory_engine_enforces_declared_read_only_types() {
    let toml = format!(
        "{MEMORY_CONFIG}\n[[entities]]\nentity_type = \"Ledger\"\n\
         key_field = \"Name\"\nread_only = true\n"
    );
    let config = RecordSyncConfig::from_toml(&toml).expect("config parses");
    let engine = build_engine(&config).expect("engine");
    let plan: ReconcilePlan =
        serde_json::from_str(r#"{"entity_type":"Ledger","desired":[{"key":"L1"}]}"#)
            .expect("plan parses");

    let err = execute_reconcile(&engine, &config, &plan).expect_err("read-only rejected");
    assert!(err.to_string().contains("operation failed"));
}
