//! JSONL export/import.
//!
//! `issues.jsonl` (one issue per line, sorted ascending by ID) and the
//! optional `dependencies.jsonl` form the portable snapshot under
//! version control. Export is idempotent: issues whose content hash
//! matches their `export_hashes` row count as unchanged, and when
//! nothing changed the file write is elided entirely. Import tolerates
//! malformed lines - they are recorded and reported, never fatal.

pub mod resolve;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::SyncMode;
use crate::error::{BeadsError, Result};
use crate::model::{Dependency, Issue};
use crate::storage::{IssueFilter, Store};
use crate::util::cancel::CancelToken;

pub use resolve::{FieldConflict, FieldStrategy, ResolveConfig, Resolution, resolve_issue};

/// Canonical issues snapshot filename.
pub const ISSUES_FILE: &str = "issues.jsonl";
/// Optional dependency snapshot filename.
pub const DEPENDENCIES_FILE: &str = "dependencies.jsonl";

/// Options for `export_issues`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportOptions {
    /// Rewrite the file even when no issue changed.
    pub force: bool,
}

/// Result of an export.
#[derive(Debug, Clone)]
pub struct ExportResult {
    /// Issues whose hash changed since the last export.
    pub changed: usize,
    /// Issues skipped as unchanged.
    pub skipped_unchanged: usize,
    /// Whether the snapshot file was (re)written.
    pub wrote_file: bool,
    pub path: PathBuf,
}

/// One tolerated import failure.
#[derive(Debug, Clone)]
pub struct ImportError {
    pub line: usize,
    pub reason: String,
}

/// Result of an import.
#[derive(Debug, Clone, Default)]
pub struct ImportResult {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub errors: Vec<ImportError>,
    pub conflicts: Vec<FieldConflict>,
}

impl ImportResult {
    #[must_use]
    pub const fn applied(&self) -> usize {
        self.created + self.updated
    }
}

/// Export the full issue snapshot to `path`.
///
/// The file is always a complete sorted snapshot; `export_hashes` only
/// decides whether a rewrite is needed. Writes are atomic: the snapshot
/// lands in `<path>.tmp`, is fsynced, then renamed over the target.
/// Cancellation is checked between lines.
///
/// # Errors
///
/// Storage or I/O errors; `Cancelled` when the token fires mid-export.
pub fn export_issues(
    store: &mut Store,
    path: &Path,
    cancel: &CancelToken,
    opts: &ExportOptions,
) -> Result<ExportResult> {
    cancel.check()?;

    let issues = store.list_issues(
        cancel,
        &IssueFilter {
            include_closed: true,
            ..IssueFilter::default()
        },
    )?;
    let previous = store.all_export_hashes(cancel)?;

    let mut changed: Vec<(String, String)> = Vec::new();
    let mut skipped = 0usize;
    for issue in &issues {
        let hash = issue
            .content_hash
            .clone()
            .unwrap_or_else(|| issue.compute_content_hash());
        if previous.get(&issue.id) == Some(&hash) {
            skipped += 1;
        } else {
            changed.push((issue.id.clone(), hash));
        }
    }
    // A hash row without a live issue means something was deleted since
    // the last export; the snapshot must shed that line.
    let stale_rows = previous
        .keys()
        .any(|id| !issues.iter().any(|issue| &issue.id == id));

    if changed.is_empty() && !stale_rows && !opts.force && path.exists() {
        tracing::debug!(path = %path.display(), "export skipped: no changes");
        return Ok(ExportResult {
            changed: 0,
            skipped_unchanged: skipped,
            wrote_file: false,
            path: path.to_path_buf(),
        });
    }

    write_jsonl_atomic(path, issues.iter(), cancel)?;

    if stale_rows {
        store.clear_export_hashes(cancel)?;
        let all: Vec<(String, String)> = issues
            .iter()
            .map(|issue| {
                (
                    issue.id.clone(),
                    issue
                        .content_hash
                        .clone()
                        .unwrap_or_else(|| issue.compute_content_hash()),
                )
            })
            .collect();
        store.set_export_hashes(cancel, &all)?;
    } else if !changed.is_empty() {
        store.set_export_hashes(cancel, &changed)?;
    }

    tracing::info!(
        path = %path.display(),
        total = issues.len(),
        changed = changed.len(),
        "exported issues"
    );

    Ok(ExportResult {
        changed: changed.len(),
        skipped_unchanged: skipped,
        wrote_file: true,
        path: path.to_path_buf(),
    })
}

/// Export all dependency edges to `path` (atomic, sorted).
///
/// # Errors
///
/// Storage or I/O errors.
pub fn export_dependencies(store: &mut Store, path: &Path, cancel: &CancelToken) -> Result<usize> {
    let deps = store.all_dependencies(cancel)?;
    write_jsonl_atomic(path, deps.iter(), cancel)?;
    Ok(deps.len())
}

fn write_jsonl_atomic<'a, T: serde::Serialize + 'a>(
    path: &Path,
    records: impl Iterator<Item = &'a T>,
    cancel: &CancelToken,
) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        BeadsError::Config(format!("invalid output path: {}", path.display()))
    })?;
    fs::create_dir_all(parent)?;

    let tmp_path = tmp_path_for(path);
    let file = File::create(&tmp_path)?;
    let mut writer = BufWriter::new(file);

    for record in records {
        cancel.check()?;
        let json = serde_json::to_string(record)?;
        writeln!(writer, "{json}")?;
    }

    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| BeadsError::Io(e.into_error()))?
        .sync_all()?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map_or_else(
        || std::ffi::OsString::from("snapshot"),
        std::ffi::OsStr::to_os_string,
    );
    name.push(".tmp");
    path.with_file_name(name)
}

/// Import the issue snapshot at `path` into the store.
///
/// Per line: parse failures are recorded and skipped; issues absent
/// from the store are inserted; present issues run the field-level
/// conflict resolver and only changed records are written back.
///
/// # Errors
///
/// I/O errors opening the file; storage errors; `Cancelled`.
pub fn import_issues(
    store: &mut Store,
    path: &Path,
    cancel: &CancelToken,
    config: &ResolveConfig,
) -> Result<ImportResult> {
    cancel.check()?;

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut result = ImportResult::default();
    let mut parsed: Vec<(usize, Issue)> = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        cancel.check()?;
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Issue>(trimmed) {
            Ok(issue) if issue.id.is_empty() => {
                result.errors.push(ImportError {
                    line: idx + 1,
                    reason: "missing id".to_string(),
                });
            }
            Ok(issue) => parsed.push((idx + 1, issue)),
            Err(err) => {
                result.errors.push(ImportError {
                    line: idx + 1,
                    reason: err.to_string(),
                });
            }
        }
    }

    // Parents before children regardless of file order.
    parsed.sort_by(|a, b| a.1.id.cmp(&b.1.id));

    for (line, incoming) in parsed {
        cancel.check()?;
        match store.get_issue(cancel, &incoming.id) {
            Err(BeadsError::IssueNotFound { .. }) => {
                match store.upsert_issue(cancel, &incoming) {
                    Ok(_) => result.created += 1,
                    Err(err) => result.errors.push(ImportError {
                        line,
                        reason: err.to_string(),
                    }),
                }
            }
            Ok(local) => {
                let resolution = resolve_issue(&local, &incoming, config);
                let resolution_changed = resolution.changed();
                result.conflicts.extend(resolution.conflicts);
                if resolution_changed {
                    match store.upsert_issue(cancel, &resolution.issue) {
                        Ok(_) => result.updated += 1,
                        Err(err) => result.errors.push(ImportError {
                            line,
                            reason: err.to_string(),
                        }),
                    }
                } else {
                    result.unchanged += 1;
                }
            }
            Err(err) => return Err(err),
        }
    }

    tracing::info!(
        path = %path.display(),
        created = result.created,
        updated = result.updated,
        unchanged = result.unchanged,
        errors = result.errors.len(),
        "imported issues"
    );

    Ok(result)
}

/// Import dependency edges from `path`. Same malformed-line tolerance
/// as the issue import.
///
/// # Errors
///
/// I/O errors opening the file; storage errors; `Cancelled`.
pub fn import_dependencies(
    store: &mut Store,
    path: &Path,
    cancel: &CancelToken,
) -> Result<(usize, Vec<ImportError>)> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut applied = 0usize;
    let mut errors = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        cancel.check()?;
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Dependency>(trimmed) {
            Ok(dep) => match store.upsert_dependency(cancel, &dep) {
                Ok(()) => applied += 1,
                Err(err) => errors.push(ImportError {
                    line: idx + 1,
                    reason: err.to_string(),
                }),
            },
            Err(err) => errors.push(ImportError {
                line: idx + 1,
                reason: err.to_string(),
            }),
        }
    }

    Ok((applied, errors))
}

/// Count issues in a JSONL file without touching the store.
///
/// Returns `(count, prefix histogram, malformed line count)`; used by
/// the doctor to size a rebuild and detect the repo prefix.
///
/// # Errors
///
/// I/O errors opening or reading the file.
pub fn count_jsonl_issues(path: &Path) -> Result<(usize, BTreeMap<String, usize>, usize)> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut count = 0usize;
    let mut malformed = 0usize;
    let mut prefixes: BTreeMap<String, usize> = BTreeMap::new();

    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
            malformed += 1;
            continue;
        };
        let Some(id) = value.get("id").and_then(serde_json::Value::as_str) else {
            malformed += 1;
            continue;
        };
        count += 1;
        let prefix = id.rfind('-').map_or(id, |dash| &id[..dash]);
        *prefixes.entry(prefix.to_string()).or_insert(0) += 1;
    }

    Ok((count, prefixes, malformed))
}

/// Event that may trigger an export or import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    Push,
    Pull,
    Change,
}

/// Whether the configured mode exports the JSONL snapshot on `trigger`.
#[must_use]
pub fn should_export(mode: SyncMode, export_on: &str, trigger: SyncTrigger) -> bool {
    if !mode.uses_jsonl() {
        return false;
    }
    match trigger {
        SyncTrigger::Push => export_on == "push",
        SyncTrigger::Change => mode == SyncMode::Realtime || export_on == "change",
        SyncTrigger::Pull => false,
    }
}

/// Whether the configured mode imports the JSONL snapshot on `trigger`.
#[must_use]
pub fn should_import(mode: SyncMode, import_on: &str, trigger: SyncTrigger) -> bool {
    if !mode.uses_jsonl() {
        return false;
    }
    match trigger {
        SyncTrigger::Pull => import_on == "pull",
        SyncTrigger::Change => import_on == "change",
        SyncTrigger::Push => false,
    }
}
