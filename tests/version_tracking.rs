//! Version tracking: first run, upgrade, downgrade, changelog order.

use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use beads::version::{
    self, LOCAL_VERSION_FILE, VERSION, VERSION_CHANGES, read_local_version, track_version_at,
    versions_since, write_local_version,
};
use tempfile::TempDir;

// Tracker state is process-wide; serialize the tests that touch it.
static TRACKER_LOCK: Mutex<()> = Mutex::new(());

fn tracker_guard() -> MutexGuard<'static, ()> {
    TRACKER_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn beads_dir() -> (TempDir, PathBuf) {
    let temp = TempDir::new().expect("tempdir");
    let dir = temp.path().join(".beads");
    fs::create_dir_all(&dir).expect("create .beads");
    (temp, dir)
}

#[test]
fn first_run_creates_file_and_is_silent() {
    let _guard = tracker_guard();
    version::reset_for_testing();
    let (_temp, dir) = beads_dir();

    track_version_at(&dir, VERSION);

    assert!(!version::upgrade_detected(), "first run is not an upgrade");
    assert_eq!(version::previous_version(), "");
    assert_eq!(read_local_version(&dir).as_deref(), Some(VERSION));
}

#[test]
fn upgrade_is_detected_and_file_advances() {
    let _guard = tracker_guard();
    version::reset_for_testing();
    let (_temp, dir) = beads_dir();

    write_local_version(&dir, "0.22.0").expect("seed");
    track_version_at(&dir, "0.23.0");

    assert!(version::upgrade_detected());
    assert_eq!(version::previous_version(), "0.22.0");
    assert_eq!(read_local_version(&dir).as_deref(), Some("0.23.0"));
}

#[test]
fn downgrade_is_ignored_but_recorded() {
    let _guard = tracker_guard();
    version::reset_for_testing();
    let (_temp, dir) = beads_dir();

    write_local_version(&dir, "99.99.99").expect("seed");
    track_version_at(&dir, "0.23.0");

    assert!(!version::upgrade_detected(), "downgrade must not migrate");
    assert_eq!(version::previous_version(), "");
    // The file still records the running binary's version so the next
    // equal-or-newer run stays quiet.
    assert_eq!(read_local_version(&dir).as_deref(), Some("0.23.0"));
}

#[test]
fn same_version_changes_nothing() {
    let _guard = tracker_guard();
    version::reset_for_testing();
    let (_temp, dir) = beads_dir();

    write_local_version(&dir, VERSION).expect("seed");
    track_version_at(&dir, VERSION);

    assert!(!version::upgrade_detected());
    assert_eq!(read_local_version(&dir).as_deref(), Some(VERSION));
}

#[test]
fn whitespace_in_version_file_is_tolerated() {
    let _guard = tracker_guard();
    version::reset_for_testing();
    let (_temp, dir) = beads_dir();

    fs::write(dir.join(LOCAL_VERSION_FILE), "  0.22.0\n\n").expect("seed");
    track_version_at(&dir, "0.23.0");

    assert!(version::upgrade_detected());
    assert_eq!(version::previous_version(), "0.22.0");
}

#[test]
fn versions_since_contract() {
    // Empty or unknown -> the whole table.
    assert_eq!(versions_since("").len(), VERSION_CHANGES.len());
    assert_eq!(versions_since("0.0.1").len(), VERSION_CHANGES.len());

    // Latest -> empty.
    assert!(versions_since(VERSION_CHANGES[0].version).is_empty());

    // Oldest -> everything newer, oldest first, never including `from`.
    let oldest = VERSION_CHANGES[VERSION_CHANGES.len() - 1].version;
    let since = versions_since(oldest);
    assert_eq!(since.len(), VERSION_CHANGES.len() - 1);
    assert!(since.iter().all(|change| change.version != oldest));
    for window in since.windows(2) {
        assert!(
            window[0].date <= window[1].date,
            "{} should not be newer than {}",
            window[0].version,
            window[1].version
        );
    }
    assert_eq!(since.last().unwrap().version, VERSION_CHANGES[0].version);
}

#[test]
fn auto_migrate_is_noop_without_upgrade() {
    let _guard = tracker_guard();
    version::reset_for_testing();
    let (_temp, dir) = beads_dir();

    // No upgrade detected: nothing happens, no database is created.
    version::auto_migrate_on_version_bump(&dir);
    assert!(!dir.join("beads.db").exists());
}

#[test]
fn auto_migrate_handles_missing_database() {
    let _guard = tracker_guard();
    version::reset_for_testing();
    let (_temp, dir) = beads_dir();

    write_local_version(&dir, "0.22.0").expect("seed");
    track_version_at(&dir, VERSION);
    assert!(version::upgrade_detected());

    // Graceful: upgrade detected but no database yet.
    version::auto_migrate_on_version_bump(&dir);
    assert!(!dir.join("beads.db").exists());
}

#[test]
fn auto_migrate_stamps_existing_database() {
    let _guard = tracker_guard();
    version::reset_for_testing();
    let (_temp, dir) = beads_dir();

    // Create a database at the "old" version.
    {
        let cancel = beads::CancelToken::new();
        let mut store =
            beads::Store::open(&dir, &beads::storage::OpenOptions::default()).expect("open");
        store
            .set_metadata(&cancel, "bd_version", "0.22.0")
            .expect("stamp old");
    }

    write_local_version(&dir, "0.22.0").expect("seed");
    track_version_at(&dir, VERSION);
    version::auto_migrate_on_version_bump(&dir);

    let cancel = beads::CancelToken::new();
    let mut store =
        beads::Store::open(&dir, &beads::storage::OpenOptions::default()).expect("reopen");
    assert_eq!(
        store.get_metadata(&cancel, "bd_version").unwrap().as_deref(),
        Some(VERSION)
    );
}
