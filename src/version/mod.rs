//! Binary/database version tracking and self-migration.
//!
//! A plain-text `.beads/.local_version` records the last binary version
//! that ran against a repository. On startup the tracker compares it to
//! the running binary: strictly older means an upgrade happened (the
//! migrator may run), strictly newer is a downgrade and is deliberately
//! ignored - not an error, just data - while the file still records the
//! running version so the next equal-or-newer run is quiet.
//!
//! Tracker state is process-wide and single-writer; the reset hook is
//! for tests only and is not thread-safe.

use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use crate::config;
use crate::error::{BeadsError, Result};
use crate::storage::{OpenOptions, Store};
use crate::util::cancel::CancelToken;

/// The running binary's version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version-state file inside `.beads/`.
pub const LOCAL_VERSION_FILE: &str = ".local_version";

/// One entry in the baked-in changelog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionChange {
    pub version: &'static str,
    /// Release date, `YYYY-MM-DD`.
    pub date: &'static str,
    pub summary: &'static str,
}

/// Baked-in changelog, newest first.
pub static VERSION_CHANGES: &[VersionChange] = &[
    VersionChange {
        version: "0.23.0",
        date: "2026-07-18",
        summary: "Dolt server backend: named writer lock and 3s connection probe",
    },
    VersionChange {
        version: "0.22.0",
        date: "2026-06-30",
        summary: "Per-field conflict strategies (union for sets, max for ordinals)",
    },
    VersionChange {
        version: "0.21.0",
        date: "2026-06-09",
        summary: "Unknown JSONL keys preserved across import/export",
    },
    VersionChange {
        version: "0.20.5",
        date: "2026-05-27",
        summary: "Stale write locks detected via owner pid; doctor --fix clears them",
    },
    VersionChange {
        version: "0.20.0",
        date: "2026-05-12",
        summary: "Child ID counters made monotonic across deletes",
    },
    VersionChange {
        version: "0.19.0",
        date: "2026-04-22",
        summary: "Layered configuration with override reporting",
    },
];

#[derive(Debug, Default)]
struct TrackerState {
    upgrade_detected: bool,
    previous_version: String,
    acknowledged: bool,
}

static STATE: Mutex<TrackerState> = Mutex::new(TrackerState {
    upgrade_detected: false,
    previous_version: String::new(),
    acknowledged: false,
});

fn state() -> std::sync::MutexGuard<'static, TrackerState> {
    STATE.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Whether this process detected a binary upgrade for the repository.
#[must_use]
pub fn upgrade_detected() -> bool {
    state().upgrade_detected
}

/// The version the repository last ran, when an upgrade was detected.
/// Empty otherwise (including on downgrade).
#[must_use]
pub fn previous_version() -> String {
    state().previous_version.clone()
}

/// Clear all tracker state. Test-only; not thread-safe.
pub fn reset_for_testing() {
    *state() = TrackerState::default();
}

/// Compare dotted versions numerically, component by component.
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |version: &str| -> Vec<u64> {
        version
            .trim()
            .split('.')
            .map(|part| part.parse().unwrap_or(0))
            .collect()
    };
    let left = parse(a);
    let right = parse(b);
    let len = left.len().max(right.len());
    for i in 0..len {
        let l = left.get(i).copied().unwrap_or(0);
        let r = right.get(i).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    Ordering::Equal
}

/// Read the recorded version, if any.
#[must_use]
pub fn read_local_version(beads_dir: &Path) -> Option<String> {
    let raw = fs::read_to_string(beads_dir.join(LOCAL_VERSION_FILE)).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Write the version file.
///
/// # Errors
///
/// Returns an I/O error on write failure.
pub fn write_local_version(beads_dir: &Path, version: &str) -> Result<()> {
    fs::write(beads_dir.join(LOCAL_VERSION_FILE), format!("{version}\n"))?;
    Ok(())
}

/// Track the running binary's version against the repository.
///
/// No repository context (no `.beads/` found) is a silent no-op.
pub fn track_version() {
    if let Ok(beads_dir) = config::discover_beads_dir(None) {
        track_version_in(&beads_dir);
    }
}

/// Track against a known `.beads` directory, using the binary version.
pub fn track_version_in(beads_dir: &Path) {
    track_version_at(beads_dir, VERSION);
}

/// Core state machine, parameterized on the current version for tests.
///
/// - first run: record the version, no upgrade
/// - recorded strictly older: upgrade detected, remember the previous
/// - equal: nothing
/// - recorded strictly newer: downgrade, ignored but still recorded
pub fn track_version_at(beads_dir: &Path, current: &str) {
    let recorded = read_local_version(beads_dir);

    match recorded {
        None => {
            if let Err(err) = write_local_version(beads_dir, current) {
                tracing::warn!(%err, "failed to write version file");
            }
        }
        Some(ref recorded) => match compare_versions(recorded, current) {
            Ordering::Less => {
                let mut guard = state();
                guard.upgrade_detected = true;
                guard.previous_version = recorded.clone();
                drop(guard);
                if let Err(err) = write_local_version(beads_dir, current) {
                    tracing::warn!(%err, "failed to write version file");
                }
                tracing::debug!(from = %recorded, to = %current, "binary upgrade detected");
            }
            Ordering::Equal => {}
            Ordering::Greater => {
                // Downgrade: not an error, and deliberately not an
                // upgrade either. Record the running version so the
                // next equal-or-newer run stays quiet.
                if let Err(err) = write_local_version(beads_dir, current) {
                    tracing::warn!(%err, "failed to write version file");
                }
                tracing::debug!(from = %recorded, to = %current, "binary downgrade; not migrating");
            }
        },
    }
}

/// Changelog entries strictly newer than `from`, oldest first.
///
/// Empty or unknown `from` returns the whole table (chronological);
/// `from` equal to the latest entry returns an empty slice.
#[must_use]
pub fn versions_since(from: &str) -> Vec<&'static VersionChange> {
    let known = VERSION_CHANGES.iter().any(|change| change.version == from);

    let mut result: Vec<&'static VersionChange> = if from.is_empty() || !known {
        VERSION_CHANGES.iter().collect()
    } else {
        VERSION_CHANGES
            .iter()
            .take_while(|change| change.version != from)
            .collect()
    };
    result.reverse();
    result
}

/// Run the schema migrator after a detected upgrade.
///
/// No-op when no upgrade was detected or no database exists yet. The
/// migration itself is idempotent, so an already-migrated database is
/// silently untouched. Failures are logged, never fatal - the doctor
/// surfaces anything persistent.
pub fn auto_migrate_on_version_bump(beads_dir: &Path) {
    if !upgrade_detected() {
        return;
    }

    let cancel = CancelToken::new();
    let opts = OpenOptions {
        create: false,
        ..OpenOptions::default()
    };
    match Store::open(beads_dir, &opts) {
        Ok(mut store) => {
            // Opening writably applies the idempotent schema migration;
            // stamping bd_version records who migrated.
            if let Err(err) = store.set_metadata(&cancel, "bd_version", VERSION) {
                tracing::warn!(%err, "failed to stamp bd_version after migration");
            } else {
                tracing::info!(version = VERSION, "database migrated after upgrade");
            }
        }
        Err(BeadsError::DatabaseNotFound { .. } | BeadsError::NotInitialized) => {}
        Err(err) => {
            tracing::warn!(%err, "auto-migration skipped");
        }
    }
}

/// Print the upgrade notice at most once per process.
pub fn maybe_show_upgrade_notification() {
    let mut guard = state();
    if !guard.upgrade_detected || guard.acknowledged {
        return;
    }
    guard.acknowledged = true;
    let previous = guard.previous_version.clone();
    drop(guard);

    eprintln!("bd upgraded: {previous} -> {VERSION}");
    for change in versions_since(&previous) {
        eprintln!("  {} ({}): {}", change.version, change.date, change.summary);
    }
}

/// Whether the notification has been emitted (or suppressed) already.
#[must_use]
pub fn upgrade_acknowledged() -> bool {
    state().acknowledged
}
