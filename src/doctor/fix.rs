//! Recovery actions prescribed by the doctor.
//!
//! Fixes never silently delete data: anything replaced is moved aside
//! with a `.broken` suffix first.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Metadata;
use crate::error::{BeadsError, Result};
use crate::storage::{OpenOptions, Store, lock};
use crate::sync::{self, ResolveConfig};
use crate::util::cancel::CancelToken;
use crate::version::VERSION;

/// Clear a stale sidecar lock. Returns a description of what happened,
/// or `None` when there was nothing to do.
///
/// # Errors
///
/// `DatabaseLocked` when the lock owner is still running.
pub fn fix_stale_lock(beads_dir: &Path) -> Result<Option<String>> {
    if !lock::is_stale(beads_dir) {
        return Ok(None);
    }
    if lock::clear_stale(beads_dir)? {
        Ok(Some(format!("removed stale lock file {}", lock::LOCK_FILE)))
    } else {
        Ok(None)
    }
}

/// Re-point `metadata.json` at a database file actually present.
///
/// Heals the common mismatch after a manual rename: the configured
/// database is missing but exactly one other `.db` file sits in
/// `.beads/`. Ambiguous situations are left alone.
///
/// # Errors
///
/// Propagates metadata read/write failures.
pub fn fix_database_config(beads_dir: &Path) -> Result<Option<String>> {
    let mut metadata = Metadata::load(beads_dir)?;
    let configured = metadata.db_path(beads_dir);
    if configured.exists() {
        return Ok(None);
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(beads_dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if name.ends_with(".db") && path.is_file() {
            candidates.push(path);
        }
    }

    if candidates.len() != 1 {
        return Ok(None);
    }

    let found = candidates.remove(0);
    let name = found
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("beads.db")
        .to_string();
    let old = metadata.db_filename();
    metadata.database = name.clone();
    metadata.save(beads_dir)?;
    Ok(Some(format!(
        "metadata.json pointed at missing '{old}'; now using '{name}'"
    )))
}

/// Rebuild the embedded database from the JSONL snapshot.
///
/// The corrupt database (if any) is moved aside as `<name>.broken`,
/// a fresh store is created, and the snapshot re-imported.
///
/// # Errors
///
/// `Config` when no usable JSONL exists; storage errors during the
/// rebuild.
pub fn rebuild_from_jsonl(beads_dir: &Path) -> Result<String> {
    let Some((jsonl_path, count)) = super::discover_jsonl(beads_dir) else {
        return Err(BeadsError::Config(
            "no JSONL snapshot available to rebuild from".to_string(),
        ));
    };
    if count == 0 {
        return Err(BeadsError::Config(
            "JSONL snapshot is empty; refusing to rebuild".to_string(),
        ));
    }

    let metadata = Metadata::load(beads_dir)?;
    let db_path = metadata.db_path(beads_dir);
    let mut moved_aside = None;
    if db_path.exists() {
        let backup = broken_path(&db_path);
        fs::rename(&db_path, &backup)?;
        moved_aside = Some(backup);
    }

    let cancel = CancelToken::new();
    let mut store = Store::open(beads_dir, &OpenOptions::default())?;
    let result = sync::import_issues(&mut store, &jsonl_path, &cancel, &ResolveConfig::default())?;

    let deps_path = beads_dir.join(sync::DEPENDENCIES_FILE);
    let mut deps_applied = 0;
    if deps_path.is_file() {
        let (applied, _) = sync::import_dependencies(&mut store, &deps_path, &cancel)?;
        deps_applied = applied;
    }

    store.set_metadata(&cancel, "bd_version", VERSION)?;

    let mut summary = format!(
        "rebuilt database from {} ({} created, {} errors",
        jsonl_path.display(),
        result.created,
        result.errors.len()
    );
    if deps_applied > 0 {
        summary.push_str(&format!(", {deps_applied} dependencies"));
    }
    summary.push(')');
    if let Some(backup) = moved_aside {
        summary.push_str(&format!("; previous database kept at {}", backup.display()));
    }
    Ok(summary)
}

fn broken_path(db_path: &Path) -> PathBuf {
    let mut candidate = append_suffix(db_path, ".broken");
    // Never overwrite an earlier backup.
    let mut counter = 1;
    while candidate.exists() {
        candidate = append_suffix(db_path, &format!(".broken.{counter}"));
        counter += 1;
    }
    candidate
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map_or_else(
        || std::ffi::OsString::from("beads.db"),
        std::ffi::OsStr::to_os_string,
    );
    name.push(suffix);
    path.with_file_name(name)
}
