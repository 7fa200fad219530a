//! Association linker tests for recordsync core.
// crates/recordsync-core/tests/linker.rs
// ============================================================================
// Module: Association Linker Tests
// Description: Parent resolution, pending parent sharing, and binding.
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

use recordsync_core::AssociationLinker;
use recordsync_core::EntitySchema;
use recordsync_core::FieldMap;
use recordsync_core::InMemoryStore;
use recordsync_core::KeyIndexBuilder;
use recordsync_core::ParentKey;
use recordsync_core::Record;
use recordsync_core::RecordId;
use recordsync_core::ReconcileError;
use recordsync_core::StoreError;
use recordsync_core::StoreRules;
use serde_json::json;

fn account_schema() -> EntitySchema {
    EntitySchema::new("Account", "Name")
}

fn contact_schema() -> EntitySchema {
    EntitySchema::new("Contact", "Email")
}

fn contact(email: &str, last_name: &str) -> Record {
    let mut record = Record::keyed(&contact_schema(), email);
    record.set("LastName", last_name);
    record
}

fn linker() -> AssociationLinker {
    AssociationLinker::new(account_schema(), "AccountId", ParentKey::field("LastName"))
}

/// Verifies children sharing a missing parent key share one new parent.
#[test]
fn shared_missing_parent_is_created_once() {
    let store = InMemoryStore::new();
    let linker = linker();
    let mut children = vec![
        contact("john@doe.test", "Doe"),
        contact("mary@doe.test", "Doe"),
        contact("jane@x.test", "Jane"),
    ];
    let parent_keys = linker.parent_keys(&children);
    let parent_index = KeyIndexBuilder::new(account_schema()).build(&store, parent_keys).unwrap();

    assert_eq!(linker.foreign_key_field(), "AccountId");
    let plan = linker.plan(&children, parent_index).unwrap();
    assert_eq!(plan.pending_parents().len(), 2);
    let doe_key = Some("Doe".to_string());
    assert_eq!(plan.child_keys(), &[doe_key.clone(), doe_key, Some("Jane".to_string())]);
    let committed = plan.commit(&store).unwrap();
    assert_eq!(committed.created_parents().len(), 2);
    let report = committed.bind(&mut children).unwrap();

    assert_eq!(report.linked, 3);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.created_parents.len(), 2);
    let doe = children[0].reference("AccountId").unwrap();
    assert_eq!(children[1].reference("AccountId"), Some(doe));
    assert_ne!(children[2].reference("AccountId"), Some(doe));
    assert_eq!(report.parent_index.id_of("Doe"), Some(doe));
    assert_eq!(store.call_counts().unwrap().create, 1);
}

/// Verifies existing parents are reused without a create.
#[test]
fn existing_parent_is_reused() {
    let store = InMemoryStore::new();
    let mut doe = Record::keyed(&account_schema(), "Doe");
    doe.id = RecordId::from_raw(40);
    store.insert_existing(doe).unwrap();
    let linker = linker();
    let mut children = vec![contact("john@doe.test", "Doe")];
    let parent_index = KeyIndexBuilder::new(account_schema()).build(&store, ["Doe"]).unwrap();

    let committed = linker.plan(&children, parent_index).unwrap().commit(&store).unwrap();
    let report = committed.bind(&mut children).unwrap();

    assert!(report.created_parents.is_empty());
    assert_eq!(children[0].reference("AccountId"), RecordId::from_raw(40));
    assert_eq!(store.call_counts().unwrap().create, 0);
}

/// Verifies blank parent keys leave the child unassociated.
#[test]
fn blank_parent_key_is_skipped() {
    let store = InMemoryStore::new();
    let linker = linker();
    let mut children = vec![contact("nobody@x.test", "   "), contact("john@doe.test", "Doe")];
    let mut orphan_without_field = Record::keyed(&contact_schema(), "ghost@x.test");
    orphan_without_field.set("Title", "Ghost");
    children.push(orphan_without_field);
    let parent_keys = linker.parent_keys(&children);
    let parent_index = KeyIndexBuilder::new(account_schema()).build(&store, parent_keys).unwrap();

    let committed = linker.plan(&children, parent_index).unwrap().commit(&store).unwrap();
    let report = committed.bind(&mut children).unwrap();

    assert_eq!(report.linked, 1);
    assert_eq!(report.skipped, 2);
    assert_eq!(children[0].field("AccountId"), None);
    assert_eq!(children[2].field("AccountId"), None);
    assert!(children[1].reference("AccountId").is_some());
}

/// Verifies derived parent keys and parent defaults.
#[test]
fn derived_key_and_parent_defaults_apply() {
    let store = InMemoryStore::new();
    let mut defaults = FieldMap::new();
    defaults.insert("Industry".to_string(), json!("Unknown"));
    let linker = AssociationLinker::new(
        account_schema(),
        "AccountId",
        ParentKey::derive(|child| child.text("LastName").map(|name| format!("{name} Household"))),
    )
    .with_parent_defaults(defaults);
    let mut children = vec![contact("john@doe.test", "Doe")];
    let parent_index =
        KeyIndexBuilder::new(account_schema()).build(&store, ["Doe Household"]).unwrap();

    let report = linker.link(&store, &mut children, parent_index).unwrap();

    let parent = &report.created_parents[0];
    assert_eq!(parent.text("Name"), Some("Doe Household"));
    assert_eq!(parent.text("Industry"), Some("Unknown"));
    assert_eq!(children[0].reference("AccountId"), parent.id);
    let counts = store.call_counts().unwrap();
    assert_eq!(counts.create, 1);
    assert_eq!(counts.upsert, 1);
    assert!(children[0].is_persisted());
}

/// Verifies a failed parent create leaves children unwritten.
#[test]
fn parent_create_failure_stops_the_link() {
    let store = InMemoryStore::with_rules(StoreRules::new().read_only("Account"));
    let linker = linker();
    let mut children = vec![contact("john@doe.test", "Doe")];
    let parent_index = KeyIndexBuilder::new(account_schema()).build(&store, ["Doe"]).unwrap();

    let error = linker.link(&store, &mut children, parent_index).unwrap_err();

    assert!(matches!(error, ReconcileError::Store(StoreError::Permission(_))));
    assert_eq!(store.call_counts().unwrap().upsert, 0);
    assert!(store.snapshot().unwrap().is_empty());
    assert!(!children[0].is_persisted());
}

/// Verifies binding a different child slice is rejected.
#[test]
fn bind_rejects_mismatched_children() {
    let store = InMemoryStore::new();
    let linker = linker();
    let children = vec![contact("john@doe.test", "Doe")];
    let parent_index = KeyIndexBuilder::new(account_schema()).build(&store, ["Doe"]).unwrap();
    let committed = linker.plan(&children, parent_index).unwrap().commit(&store).unwrap();

    let mut other = vec![contact("a@x.test", "A"), contact("b@x.test", "B")];
    let error = committed.bind(&mut other).unwrap_err();

    assert!(matches!(error, ReconcileError::InvalidInput(_)));
}

/// Verifies a parent index for the wrong schema is rejected.
#[test]
fn plan_rejects_foreign_parent_index() {
    let store = InMemoryStore::new();
    let children = vec![contact("john@doe.test", "Doe")];
    let wrong_index = KeyIndexBuilder::new(contact_schema()).build(&store, ["Doe"]).unwrap();

    let error = linker().plan(&children, wrong_index).unwrap_err();

    assert!(matches!(error, ReconcileError::InvalidInput(_)));
}
