//! Doctor checks and the recovery pathway.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use beads::config::{Backend, Config, Metadata};
use beads::doctor::{
    self, CheckStatus, check_database_integrity, check_database_size, check_database_version,
    check_schema_compatibility, fix,
};
use beads::storage::{OpenOptions, Store, test_server_connection};
use beads::util::cancel::CancelToken;
use beads::version::VERSION;
use tempfile::TempDir;

fn beads_dir() -> (TempDir, PathBuf) {
    let temp = TempDir::new().expect("tempdir");
    let dir = temp.path().join(".beads");
    fs::create_dir_all(&dir).expect("create");
    (temp, dir)
}

fn write_jsonl(dir: &PathBuf, count: usize) {
    let mut contents = String::new();
    for i in 0..count {
        contents.push_str(&format!(
            "{{\"id\":\"bd-x{i}\",\"title\":\"Issue {i}\",\"created_at\":\"2026-01-01T00:00:00Z\",\"updated_at\":\"2026-01-01T00:00:00Z\"}}\n"
        ));
    }
    fs::write(dir.join("issues.jsonl"), contents).expect("write jsonl");
}

fn healthy_store(dir: &PathBuf) {
    let cancel = CancelToken::new();
    let mut store = Store::open(dir, &OpenOptions::default()).expect("open");
    store
        .set_metadata(&cancel, "bd_version", VERSION)
        .expect("stamp");
}

#[test]
fn healthy_workspace_passes_every_check() {
    let (_temp, dir) = beads_dir();
    healthy_store(&dir);

    let checks = doctor::run_all(&dir, VERSION, &Config::defaults_only());
    assert_eq!(checks.len(), 4);
    for check in &checks {
        assert_eq!(check.status, CheckStatus::Ok, "{}: {}", check.name, check.message);
    }
    assert!(!doctor::has_errors(&checks));
}

#[test]
fn fresh_clone_is_a_warning_with_hydrate_hint() {
    let (_temp, dir) = beads_dir();
    write_jsonl(&dir, 4);

    let check = check_database_version(&dir, VERSION, &Config::defaults_only());
    assert_eq!(check.status, CheckStatus::Warning);
    assert!(check.message.contains("Fresh clone"));
    assert!(check.detail.as_deref().unwrap().contains("4 issue(s)"));
    let fix_hint = check.fix.as_deref().unwrap();
    assert!(fix_hint.contains("bd init"));
    assert!(fix_hint.contains("bd"), "detected prefix appears in the hint");
}

#[test]
fn no_database_and_no_jsonl_is_an_error() {
    let (_temp, dir) = beads_dir();
    let check = check_database_version(&dir, VERSION, &Config::defaults_only());
    assert_eq!(check.status, CheckStatus::Error);
    assert!(check.fix.as_deref().unwrap().contains("bd init"));
}

#[test]
fn no_db_mode_is_ok() {
    let (_temp, dir) = beads_dir();
    write_jsonl(&dir, 1);
    fs::write(dir.join("config.yaml"), "no-db: true\n").expect("write config");

    let config = Config::load(Some(&dir)).expect("load");
    let check = check_database_version(&dir, VERSION, &config);
    assert_eq!(check.status, CheckStatus::Ok);
    assert!(check.message.contains("JSONL-only"));
}

#[test]
fn version_mismatch_is_a_warning_with_migrate_hint() {
    let (_temp, dir) = beads_dir();
    let cancel = CancelToken::new();
    {
        let mut store = Store::open(&dir, &OpenOptions::default()).expect("open");
        store
            .set_metadata(&cancel, "bd_version", "0.22.0")
            .expect("stamp old");
    }

    let check = check_database_version(&dir, VERSION, &Config::defaults_only());
    assert_eq!(check.status, CheckStatus::Warning);
    assert!(check.message.contains("0.22.0"));
    assert!(check.message.contains(VERSION));
    assert!(check.fix.as_deref().unwrap().contains("bd migrate"));
}

#[test]
fn schema_probe_reports_missing_elements_individually() {
    let (_temp, dir) = beads_dir();
    healthy_store(&dir);

    let check = check_schema_compatibility(&dir);
    assert_eq!(check.status, CheckStatus::Ok);

    // Drop a required table and a required column.
    {
        let conn = rusqlite::Connection::open(dir.join("beads.db")).expect("open raw");
        conn.execute_batch(
            "DROP TABLE export_hashes;
             ALTER TABLE issues DROP COLUMN compaction_level;",
        )
        .expect("damage schema");
    }

    let check = check_schema_compatibility(&dir);
    assert_eq!(check.status, CheckStatus::Error);
    let detail = check.detail.as_deref().unwrap();
    assert!(detail.contains("table:export_hashes"));
    assert!(detail.contains("issues.compaction_level"));
    assert!(check.fix.as_deref().unwrap().contains("bd migrate"));
}

/// A valid JSONL with N > 0 lines beside a zero-byte database must
/// classify as not-a-database and prescribe a JSONL rebuild that
/// mentions N.
#[test]
fn corrupt_db_with_jsonl_prescribes_rebuild() {
    let (_temp, dir) = beads_dir();
    write_jsonl(&dir, 3);
    fs::write(dir.join("beads.db"), b"").expect("zero-byte db");

    let check = check_database_integrity(&dir);
    assert_eq!(check.status, CheckStatus::Error);
    assert!(check.message.contains("not a valid database"));
    let detail = check.detail.as_deref().unwrap();
    assert!(detail.contains("3 issues"), "rebuild steps mention N: {detail}");
    assert!(detail.contains(".broken"));
}

#[test]
fn garbage_db_file_classifies_as_not_a_database() {
    let (_temp, dir) = beads_dir();
    write_jsonl(&dir, 2);
    fs::write(dir.join("beads.db"), b"definitely not a sqlite file, padded to look real")
        .expect("garbage db");

    let check = check_database_integrity(&dir);
    assert_eq!(check.status, CheckStatus::Error);
    assert!(check.message.contains("not a valid database"));
}

#[test]
fn integrity_of_healthy_database_is_ok() {
    let (_temp, dir) = beads_dir();
    healthy_store(&dir);

    let check = check_database_integrity(&dir);
    assert_eq!(check.status, CheckStatus::Ok);
    assert!(check.message.contains("No corruption"));
}

#[test]
fn size_check_warns_over_threshold_and_never_fixes() {
    let (_temp, dir) = beads_dir();
    let cancel = CancelToken::new();
    {
        let mut store = Store::open(&dir, &OpenOptions::default()).expect("open");
        for i in 0..5 {
            let issue = beads::model::Issue {
                id: format!("bd-c{i}"),
                title: format!("Closed {i}"),
                status: beads::model::Status::Closed,
                close_reason: Some("done".to_string()),
                closed_at: Some(chrono::Utc::now()),
                ..beads::model::Issue::default()
            };
            store.upsert_issue(&cancel, &issue).expect("upsert");
        }
    }

    // Threshold above the count: ok.
    let config = Config::defaults_only();
    let check = check_database_size(&dir, &config);
    assert_eq!(check.status, CheckStatus::Ok);

    // Threshold below the count: warning, with no automatic fix beyond
    // a human-directed suggestion.
    let mut low = Config::defaults_only();
    low.set_flag("doctor.suggest_pruning_issue_count", "3");
    let check = check_database_size(&dir, &low);
    assert_eq!(check.status, CheckStatus::Warning);
    assert!(check.fix.as_deref().unwrap().contains("bd cleanup"));

    // Zero disables the check.
    let mut disabled = Config::defaults_only();
    disabled.set_flag("doctor.suggest_pruning_issue_count", "0");
    let check = check_database_size(&dir, &disabled);
    assert_eq!(check.status, CheckStatus::Ok);
    assert!(check.message.contains("disabled"));
}

#[test]
fn dolt_backend_checks_report_unreachable_server() {
    let (_temp, dir) = beads_dir();
    let metadata = Metadata {
        backend: Backend::Dolt,
        mode: beads::config::DoltMode::Server,
        server_host: "192.0.2.1".to_string(),
        server_port: 3307,
        ..Metadata::default()
    };
    metadata.save(&dir).expect("save");

    let check = check_database_version(&dir, VERSION, &Config::defaults_only());
    assert_eq!(check.status, CheckStatus::Error);
    assert!(check.detail.as_deref().unwrap().contains("Dolt"));
}

/// The TCP probe against an RFC 5737 address returns false within
/// the 3-second dial bound.
#[test]
fn unreachable_server_probe_bounded() {
    let start = Instant::now();
    assert!(!test_server_connection("192.0.2.1", 3307));
    assert!(start.elapsed() < Duration::from_secs(4));
}

#[test]
fn rebuild_pathway_restores_a_working_store() {
    let (_temp, dir) = beads_dir();
    write_jsonl(&dir, 3);
    fs::write(dir.join("beads.db"), b"garbage that was once a database").expect("corrupt");

    let summary = fix::rebuild_from_jsonl(&dir).expect("rebuild");
    assert!(summary.contains("3 created"));
    assert!(dir.join("beads.db.broken").exists(), "data moved aside, not deleted");

    let checks = doctor::run_all(&dir, VERSION, &Config::defaults_only());
    assert!(!doctor::has_errors(&checks), "{checks:?}");
}

#[test]
fn rebuild_preserves_every_prior_backup() {
    let (_temp, dir) = beads_dir();
    write_jsonl(&dir, 1);
    fs::write(dir.join("beads.db"), b"first corruption").expect("corrupt");
    fix::rebuild_from_jsonl(&dir).expect("first rebuild");

    // Corrupt again; the second rebuild must not overwrite the first
    // backup.
    fs::write(dir.join("beads.db"), b"second corruption").expect("corrupt again");
    fix::rebuild_from_jsonl(&dir).expect("second rebuild");

    assert!(dir.join("beads.db.broken").exists());
    assert!(dir.join("beads.db.broken.1").exists());
}
