//! JSONL pipeline: round-trip fidelity, idempotent export, malformed
//! line tolerance, and conflict-resolver integration on import.

use std::fs;
use std::path::PathBuf;

use beads::model::{Issue, Status};
use beads::storage::{IssueFilter, OpenOptions, Store};
use beads::sync::{
    self, ExportOptions, FieldStrategy, ResolveConfig, count_jsonl_issues, export_issues,
    import_issues,
};
use beads::util::cancel::CancelToken;
use chrono::{TimeZone, Utc};
use tempfile::TempDir;

fn open_store() -> (TempDir, Store, PathBuf) {
    let temp = TempDir::new().expect("tempdir");
    let dir = temp.path().join(".beads");
    fs::create_dir_all(&dir).expect("create");
    let store = Store::open(&dir, &OpenOptions::default()).expect("open");
    let jsonl = dir.join(sync::ISSUES_FILE);
    (temp, store, jsonl)
}

fn make_issue(id: &str, title: &str) -> Issue {
    Issue {
        id: id.to_string(),
        title: title.to_string(),
        created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        updated_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        ..Issue::default()
    }
}

fn all_issues(store: &mut Store) -> Vec<Issue> {
    store
        .list_issues(
            &CancelToken::new(),
            &IssueFilter {
                include_closed: true,
                ..IssueFilter::default()
            },
        )
        .expect("list")
}

#[test]
fn export_import_roundtrip_reproduces_store() {
    let cancel = CancelToken::new();
    let (_temp_a, mut source, jsonl) = open_store();

    let mut rich = make_issue("bd-a1", "First");
    rich.description = Some("a body\nwith two lines".to_string());
    rich.labels = vec!["backend".into(), "api".into()];
    rich.waiters = vec!["agent-7".into()];
    rich.compaction_level = 2;
    rich.extra
        .insert("foreign_field".to_string(), serde_json::json!({"keep": true}));
    source.upsert_issue(&cancel, &rich).unwrap();

    let mut closed = make_issue("bd-b2", "Second");
    closed.status = Status::Closed;
    closed.close_reason = Some("fixed".to_string());
    closed.closed_at = Some(Utc.timestamp_opt(1_700_000_100, 0).unwrap());
    source.upsert_issue(&cancel, &closed).unwrap();

    source.upsert_issue(&cancel, &make_issue("bd-a1.1", "Child")).unwrap();

    export_issues(&mut source, &jsonl, &cancel, &ExportOptions::default()).unwrap();
    let before = all_issues(&mut source);

    // Wipe: a brand-new store hydrated only from the snapshot.
    let (_temp_b, mut target, _) = open_store();
    let result = import_issues(&mut target, &jsonl, &cancel, &ResolveConfig::default()).unwrap();
    assert_eq!(result.created, 3);
    assert!(result.errors.is_empty());

    let after = all_issues(&mut target);
    assert_eq!(before, after);

    // The foreign key survived the full trip.
    let reloaded = target.get_issue(&cancel, "bd-a1").unwrap();
    assert!(reloaded.extra.contains_key("foreign_field"));
}

#[test]
fn exported_lines_are_sorted_by_id() {
    let cancel = CancelToken::new();
    let (_temp, mut store, jsonl) = open_store();

    // Insert out of order.
    store.upsert_issue(&cancel, &make_issue("bd-z9", "Z")).unwrap();
    store.upsert_issue(&cancel, &make_issue("bd-a1", "A")).unwrap();
    store.upsert_issue(&cancel, &make_issue("bd-m5", "M")).unwrap();

    export_issues(&mut store, &jsonl, &cancel, &ExportOptions::default()).unwrap();

    let contents = fs::read_to_string(&jsonl).unwrap();
    let ids: Vec<String> = contents
        .lines()
        .map(|line| {
            serde_json::from_str::<serde_json::Value>(line).unwrap()["id"]
                .as_str()
                .unwrap()
                .to_string()
        })
        .collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
    assert!(contents.ends_with('\n'));
}

#[test]
fn second_export_is_a_noop() {
    let cancel = CancelToken::new();
    let (_temp, mut store, jsonl) = open_store();
    store.upsert_issue(&cancel, &make_issue("bd-a1", "A")).unwrap();

    let first = export_issues(&mut store, &jsonl, &cancel, &ExportOptions::default()).unwrap();
    assert!(first.wrote_file);
    assert_eq!(first.changed, 1);

    let second = export_issues(&mut store, &jsonl, &cancel, &ExportOptions::default()).unwrap();
    assert!(!second.wrote_file, "unchanged store must skip the write");
    assert_eq!(second.changed, 0);
    assert_eq!(second.skipped_unchanged, 1);

    // Editing one issue re-exports just that row's hash.
    let mut edited = store.get_issue(&cancel, "bd-a1").unwrap();
    edited.title = "A, edited".to_string();
    store.upsert_issue(&cancel, &edited).unwrap();

    let third = export_issues(&mut store, &jsonl, &cancel, &ExportOptions::default()).unwrap();
    assert!(third.wrote_file);
    assert_eq!(third.changed, 1);
}

#[test]
fn upsert_twice_then_export_matches_single_upsert() {
    let cancel = CancelToken::new();
    let (_temp, mut store, jsonl) = open_store();

    let issue = make_issue("bd-a1", "Idempotent");
    store.upsert_issue(&cancel, &issue).unwrap();
    store.upsert_issue(&cancel, &issue).unwrap();

    export_issues(&mut store, &jsonl, &cancel, &ExportOptions::default()).unwrap();
    let hashes = store.all_export_hashes(&cancel).unwrap();

    // Re-upserting identical content must leave the export state alone.
    store.upsert_issue(&cancel, &issue).unwrap();
    let result = export_issues(&mut store, &jsonl, &cancel, &ExportOptions::default()).unwrap();
    assert!(!result.wrote_file);
    assert_eq!(store.all_export_hashes(&cancel).unwrap(), hashes);
}

#[test]
fn deleting_an_issue_forces_a_rewrite() {
    let cancel = CancelToken::new();
    let (_temp, mut store, jsonl) = open_store();
    store.upsert_issue(&cancel, &make_issue("bd-a1", "A")).unwrap();
    store.upsert_issue(&cancel, &make_issue("bd-b2", "B")).unwrap();
    export_issues(&mut store, &jsonl, &cancel, &ExportOptions::default()).unwrap();

    store.delete_issue(&cancel, "bd-b2").unwrap();
    let result = export_issues(&mut store, &jsonl, &cancel, &ExportOptions::default()).unwrap();
    assert!(result.wrote_file, "deletion must shed the stale line");

    let (count, _, _) = count_jsonl_issues(&jsonl).unwrap();
    assert_eq!(count, 1);
}

#[test]
fn malformed_lines_are_reported_not_fatal() {
    let cancel = CancelToken::new();
    let (_temp, mut store, jsonl) = open_store();

    fs::write(
        &jsonl,
        concat!(
            "{\"id\":\"bd-a1\",\"title\":\"Good\",\"created_at\":\"2026-01-01T00:00:00Z\",\"updated_at\":\"2026-01-01T00:00:00Z\"}\n",
            "this is not json\n",
            "\n",
            "{\"id\":\"bd-b2\",\"title\":\"Also good\",\"created_at\":\"2026-01-01T00:00:00Z\",\"updated_at\":\"2026-01-01T00:00:00Z\"}\n",
        ),
    )
    .unwrap();

    let result = import_issues(&mut store, &jsonl, &cancel, &ResolveConfig::default()).unwrap();
    assert_eq!(result.created, 2);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].line, 2);
}

#[test]
fn import_applies_field_resolution() {
    let cancel = CancelToken::new();
    let (_temp, mut store, jsonl) = open_store();

    let mut local = make_issue("bd-a1", "Local title");
    local.labels = vec!["local".into()];
    store.upsert_issue(&cancel, &local).unwrap();

    let incoming = serde_json::json!({
        "id": "bd-a1",
        "title": "Newer title",
        "labels": ["remote"],
        "created_at": "2023-11-14T22:13:20Z",
        "updated_at": "2026-01-01T00:00:00Z",
    });
    fs::write(&jsonl, format!("{incoming}\n")).unwrap();

    let mut config = ResolveConfig::default();
    config
        .fields
        .insert("labels".to_string(), FieldStrategy::Union);

    let result = import_issues(&mut store, &jsonl, &cancel, &config).unwrap();
    assert_eq!(result.updated, 1);

    let merged = store.get_issue(&cancel, "bd-a1").unwrap();
    assert_eq!(merged.title, "Newer title");
    assert_eq!(merged.labels, vec!["local".to_string(), "remote".to_string()]);
}

#[test]
fn import_manual_strategy_keeps_store_copy_and_reports() {
    let cancel = CancelToken::new();
    let (_temp, mut store, jsonl) = open_store();

    store
        .upsert_issue(&cancel, &make_issue("bd-a1", "Ours"))
        .unwrap();
    let incoming = serde_json::json!({
        "id": "bd-a1",
        "title": "Theirs",
        "created_at": "2023-11-14T22:13:20Z",
        "updated_at": "2026-01-01T00:00:00Z",
    });
    fs::write(&jsonl, format!("{incoming}\n")).unwrap();

    let config = ResolveConfig {
        global: FieldStrategy::Manual,
        ..ResolveConfig::default()
    };
    let result = import_issues(&mut store, &jsonl, &cancel, &config).unwrap();
    assert_eq!(result.updated, 0);
    assert_eq!(result.unchanged, 1);
    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(result.conflicts[0].field, "title");

    assert_eq!(store.get_issue(&cancel, "bd-a1").unwrap().title, "Ours");
}

#[test]
fn import_is_idempotent() {
    let cancel = CancelToken::new();
    let (_temp, mut store, jsonl) = open_store();
    store.upsert_issue(&cancel, &make_issue("bd-a1", "A")).unwrap();
    store.upsert_issue(&cancel, &make_issue("bd-b2", "B")).unwrap();
    export_issues(&mut store, &jsonl, &cancel, &ExportOptions::default()).unwrap();

    let before = all_issues(&mut store);
    let result = import_issues(&mut store, &jsonl, &cancel, &ResolveConfig::default()).unwrap();
    assert_eq!(result.created, 0);
    assert_eq!(result.updated, 0);
    assert_eq!(result.unchanged, 2);
    assert_eq!(all_issues(&mut store), before);
}

#[test]
fn import_orders_parents_before_children() {
    let cancel = CancelToken::new();
    let (_temp, mut store, jsonl) = open_store();

    // Child listed first; the importer must still create the parent
    // before the child or the hierarchy check rejects it.
    fs::write(
        &jsonl,
        concat!(
            "{\"id\":\"bd-a1.1\",\"title\":\"Child\",\"created_at\":\"2026-01-01T00:00:00Z\",\"updated_at\":\"2026-01-01T00:00:00Z\"}\n",
            "{\"id\":\"bd-a1\",\"title\":\"Parent\",\"created_at\":\"2026-01-01T00:00:00Z\",\"updated_at\":\"2026-01-01T00:00:00Z\"}\n",
        ),
    )
    .unwrap();

    let result = import_issues(&mut store, &jsonl, &cancel, &ResolveConfig::default()).unwrap();
    assert_eq!(result.created, 2);
    assert!(result.errors.is_empty());
}

#[test]
fn cancelled_export_leaves_no_partial_file() {
    let cancel = CancelToken::new();
    let (_temp, mut store, jsonl) = open_store();
    store.upsert_issue(&cancel, &make_issue("bd-a1", "A")).unwrap();

    let cancelled = CancelToken::new();
    cancelled.cancel();
    let result = export_issues(&mut store, &jsonl, &cancelled, &ExportOptions::default());
    assert!(result.is_err());
    assert!(!jsonl.exists(), "no partial snapshot may appear");
}

#[test]
fn dependency_snapshot_roundtrip() {
    let cancel = CancelToken::new();
    let (_temp_a, mut source, _) = open_store();

    source.upsert_issue(&cancel, &make_issue("bd-a1", "A")).unwrap();
    source.upsert_issue(&cancel, &make_issue("bd-b2", "B")).unwrap();
    source
        .upsert_dependency(
            &cancel,
            &beads::model::Dependency {
                issue_id: "bd-b2".to_string(),
                depends_on_id: "bd-a1".to_string(),
                dep_type: beads::model::DependencyType::Blocks,
                metadata: Some("{\"note\":\"ordering\"}".to_string()),
                thread_id: Some("thread-1".to_string()),
                created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            },
        )
        .unwrap();

    let temp_out = TempDir::new().unwrap();
    let issues_path = temp_out.path().join(sync::ISSUES_FILE);
    let deps_path = temp_out.path().join(sync::DEPENDENCIES_FILE);
    export_issues(&mut source, &issues_path, &cancel, &ExportOptions::default()).unwrap();
    let exported = sync::export_dependencies(&mut source, &deps_path, &cancel).unwrap();
    assert_eq!(exported, 1);

    let (_temp_b, mut target, _) = open_store();
    import_issues(&mut target, &issues_path, &cancel, &ResolveConfig::default()).unwrap();
    let (applied, errors) = sync::import_dependencies(&mut target, &deps_path, &cancel).unwrap();
    assert_eq!(applied, 1);
    assert!(errors.is_empty());

    let deps = target.all_dependencies(&cancel).unwrap();
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].thread_id.as_deref(), Some("thread-1"));
}
