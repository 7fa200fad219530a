//! Reconciler tests for recordsync core.
// crates/recordsync-core/tests/reconciler.rs
// ============================================================================
// Module: Reconciler Tests
// Description: Classification, batching, and write behavior of reconcile.
// ============================================================================

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

use recordsync_core::DesiredEntity;
use recordsync_core::Disposition;
use recordsync_core::EntitySchema;
use recordsync_core::InMemoryStore;
use recordsync_core::IntraBatchPolicy;
use recordsync_core::KeyIndexBuilder;
use recordsync_core::Record;
use recordsync_core::RecordId;
use recordsync_core::ReconcileError;
use recordsync_core::Reconciler;
use recordsync_core::StoreError;
use recordsync_core::StoreRules;
use serde_json::json;

fn account_schema() -> EntitySchema {
    EntitySchema::new("Account", "Name")
}

fn store_with_acme() -> InMemoryStore {
    let store = InMemoryStore::new();
    let mut acme = Record::keyed(&account_schema(), "Acme");
    acme.id = RecordId::from_raw(7);
    acme.set("Industry", "Manufacturing");
    store.insert_existing(acme).unwrap();
    store
}

/// Verifies an existing key is updated in place and a new key is created.
#[test]
fn existing_keys_update_and_new_keys_create() {
    let store = store_with_acme();
    let desired = vec![
        DesiredEntity::new("Acme").with_field("Industry", "Energy"),
        DesiredEntity::new("Globex").with_field("Industry", "Chemicals"),
    ];
    let index = KeyIndexBuilder::new(account_schema())
        .build(&store, desired.iter().map(|d| &d.key))
        .unwrap();

    let report = Reconciler::new(account_schema())
        .reconcile(&store, &desired, &index, |_, _, _| {})
        .unwrap();

    let acme = report.record_for("Acme").unwrap();
    let globex = report.record_for("Globex").unwrap();
    assert_eq!(acme.id, RecordId::from_raw(7));
    assert_eq!(acme.text("Industry"), Some("Energy"));
    assert!(globex.id.is_some());
    assert_ne!(globex.id, acme.id);
    assert_eq!(report.updated(), 1);
    assert_eq!(report.created(), 1);

    let stored = store.snapshot().unwrap();
    assert_eq!(stored.len(), 2);
    let counts = store.call_counts().unwrap();
    assert_eq!(counts.query, 1);
    assert_eq!(counts.upsert, 1);
    assert_eq!(counts.create + counts.update + counts.delete, 0);
}

/// Verifies outcomes follow input order and carry the branch taken.
#[test]
fn outcomes_follow_input_order() {
    let store = store_with_acme();
    let desired = vec![DesiredEntity::new("Globex"), DesiredEntity::new("Acme")];
    let index = KeyIndexBuilder::new(account_schema()).build(&store, ["Globex", "Acme"]).unwrap();

    let report = Reconciler::new(account_schema())
        .reconcile(&store, &desired, &index, |_, _, _| {})
        .unwrap();

    let dispositions: Vec<_> = report.outcomes.iter().map(|outcome| outcome.disposition).collect();
    assert_eq!(dispositions, vec![Disposition::Create, Disposition::Update]);
    assert_eq!(report.outcomes[0].key, "Globex");
    assert_eq!(report.outcomes[1].key, "Acme");
}

/// Verifies the transform sees the disposition and its writes are persisted.
#[test]
fn transform_runs_per_entity_with_disposition() {
    let store = store_with_acme();
    let desired = vec![DesiredEntity::new("Acme"), DesiredEntity::new("Globex")];
    let index = KeyIndexBuilder::new(account_schema()).build(&store, ["Acme", "Globex"]).unwrap();
    let mut calls = 0;

    Reconciler::new(account_schema())
        .reconcile(&store, &desired, &index, |record, _, disposition| {
            calls += 1;
            let label = match disposition {
                Disposition::Update => "seen",
                Disposition::Create => "fresh",
            };
            record.set("Description", label);
        })
        .unwrap();

    assert_eq!(calls, 2);
    let stored = store.snapshot().unwrap();
    let acme = stored.iter().find(|r| r.text("Name") == Some("Acme")).unwrap();
    let globex = stored.iter().find(|r| r.text("Name") == Some("Globex")).unwrap();
    assert_eq!(acme.text("Description"), Some("seen"));
    assert_eq!(globex.text("Description"), Some("fresh"));
}

/// Verifies a transform that rewrites the natural key aborts without writing.
#[test]
fn transform_cannot_change_natural_key() {
    let store = InMemoryStore::new();
    let desired = vec![DesiredEntity::new("Acme")];
    let index = KeyIndexBuilder::new(account_schema()).build(&store, ["Acme"]).unwrap();

    let error = Reconciler::new(account_schema())
        .reconcile(&store, &desired, &index, |record, _, _| record.set("Name", "Other"))
        .unwrap_err();

    assert!(matches!(error, ReconcileError::InvalidInput(_)));
    assert_eq!(store.call_counts().unwrap().writes(), 0);
}

/// Verifies duplicate desired keys merge into one record by default.
#[test]
fn duplicate_desired_keys_merge_by_default() {
    let store = InMemoryStore::new();
    let desired = vec![
        DesiredEntity::new("Acme").with_field("Industry", "Energy"),
        DesiredEntity::new("Acme").with_field("Rating", "Hot"),
    ];
    let index = KeyIndexBuilder::new(account_schema()).build(&store, ["Acme"]).unwrap();

    let report = Reconciler::new(account_schema())
        .reconcile(&store, &desired, &index, |_, _, _| {})
        .unwrap();

    assert_eq!(report.records.len(), 1);
    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.outcomes[0].position, report.outcomes[1].position);
    assert_eq!(report.created(), 1);
    let record = &report.records[0];
    assert_eq!(record.text("Industry"), Some("Energy"));
    assert_eq!(record.text("Rating"), Some("Hot"));
    assert_eq!(store.snapshot().unwrap().len(), 1);
}

/// Verifies the independent policy emits one record per desired entity.
#[test]
fn duplicate_desired_keys_stay_independent_when_configured() {
    let store = InMemoryStore::new();
    let desired = vec![DesiredEntity::new("Acme"), DesiredEntity::new("Acme")];
    let index = KeyIndexBuilder::new(account_schema()).build(&store, ["Acme"]).unwrap();

    let report = Reconciler::new(account_schema())
        .with_intra_batch(IntraBatchPolicy::Independent)
        .reconcile(&store, &desired, &index, |_, _, _| {})
        .unwrap();

    assert_eq!(report.records.len(), 2);
    assert_eq!(report.created(), 2);
    assert_eq!(store.snapshot().unwrap().len(), 2);
}

/// Verifies an oversized batch is rejected before any write.
#[test]
fn oversized_batch_is_rejected() {
    let store = InMemoryStore::new();
    let desired: Vec<DesiredEntity> =
        (0 .. 3).map(|n| DesiredEntity::new(format!("Account {n}"))).collect();
    let index = KeyIndexBuilder::new(account_schema())
        .build(&store, desired.iter().map(|d| &d.key))
        .unwrap();

    let error = Reconciler::new(account_schema())
        .with_max_batch_size(2)
        .reconcile(&store, &desired, &index, |_, _, _| {})
        .unwrap_err();

    assert_eq!(
        error,
        ReconcileError::BatchTooLarge {
            max: 2,
            actual: 3
        }
    );
    assert_eq!(store.call_counts().unwrap().writes(), 0);
}

/// Verifies blank desired keys are rejected.
#[test]
fn blank_desired_key_is_rejected() {
    let store = InMemoryStore::new();
    let index = KeyIndexBuilder::new(account_schema()).build(&store, ["Acme"]).unwrap();

    let error = Reconciler::new(account_schema())
        .plan(&[DesiredEntity::new("  ")], &index, |_, _, _| {})
        .unwrap_err();

    assert!(matches!(error, ReconcileError::InvalidInput(_)));
}

/// Verifies an empty plan commits without a store call.
#[test]
fn empty_plan_commit_skips_write() {
    let store = InMemoryStore::new();
    let index = KeyIndexBuilder::new(account_schema()).build(&store, Vec::<String>::new()).unwrap();

    let report = Reconciler::new(account_schema())
        .reconcile(&store, &[], &index, |_, _, _| {})
        .unwrap();

    assert!(report.records.is_empty());
    assert_eq!(store.call_counts().unwrap().upsert, 0);
}

/// Verifies a store validation failure aborts and assigns no identifiers.
#[test]
fn store_validation_failure_propagates() {
    let rules = StoreRules::new().require("Account", ["Industry"]);
    let store = InMemoryStore::with_rules(rules);
    let desired = vec![
        DesiredEntity::new("Acme").with_field("Industry", "Energy"),
        DesiredEntity::new("Globex"),
    ];
    let index = KeyIndexBuilder::new(account_schema()).build(&store, ["Acme", "Globex"]).unwrap();
    let plan = Reconciler::new(account_schema()).plan(&desired, &index, |_, _, _| {}).unwrap();
    let dispositions: Vec<_> = plan.outcomes().iter().map(|outcome| outcome.disposition).collect();
    assert_eq!(dispositions, vec![Disposition::Create, Disposition::Create]);
    assert!(plan.records().iter().all(|record| record.id.is_none()));

    let error = plan.commit(&store).unwrap_err();

    assert!(matches!(error, ReconcileError::Store(StoreError::Validation(_))));
    assert!(store.snapshot().unwrap().is_empty());
}

/// Verifies a read-only entity type surfaces a permission error.
#[test]
fn store_permission_failure_propagates() {
    let store = InMemoryStore::with_rules(StoreRules::new().read_only("Account"));
    let desired = vec![DesiredEntity::new("Acme")];
    let index = KeyIndexBuilder::new(account_schema()).build(&store, ["Acme"]).unwrap();

    let error = Reconciler::new(account_schema())
        .reconcile(&store, &desired, &index, |_, _, _| {})
        .unwrap_err();

    assert!(matches!(error, ReconcileError::Store(StoreError::Permission(_))));
    assert_eq!(error.kind(), "permission");
}

/// Verifies attribute values keep their JSON types through a reconcile.
#[test]
fn attribute_types_are_preserved() {
    let store = InMemoryStore::new();
    let desired = vec![
        DesiredEntity::new("Acme").with_field("Employees", 42).with_field("Active", true),
    ];
    let index = KeyIndexBuilder::new(account_schema()).build(&store, ["Acme"]).unwrap();

    let report = Reconciler::new(account_schema())
        .reconcile(&store, &desired, &index, |_, _, _| {})
        .unwrap();

    let acme = report.record_for("Acme").unwrap();
    assert_eq!(acme.field("Employees"), Some(&json!(42)));
    assert_eq!(acme.field("Active"), Some(&json!(true)));
}
