//! Diagnostic checks and failure classification.
//!
//! Each check is independent and returns `{status, message, detail,
//! fix}`. Checks are ordered; later checks assume earlier ones passed
//! but degrade to "N/A" rather than erroring when they did not. All
//! probes open the store read-only so they can run beside a writer.
//!
//! "No repository" and "no database" are distinct: with no `.beads/`
//! at all the doctor command is a silent no-op, while a repository
//! whose store is missing gets a fresh-clone warning with a hydrate
//! hint.

pub mod fix;

use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::{Backend, Config, Metadata};
use crate::storage::schema::REQUIRED_SCHEMA;
use crate::storage::{DoltStore, OpenOptions, lock};
use crate::sync::count_jsonl_issues;
use crate::util::cancel::CancelToken;

/// Status of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

/// One named diagnostic result.
#[derive(Debug, Clone, Serialize)]
pub struct DoctorCheck {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix: Option<String>,
}

impl DoctorCheck {
    fn ok(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.into(),
            detail: None,
            fix: None,
        }
    }

    fn warning(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.into(),
            detail: None,
            fix: None,
        }
    }

    fn error(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.into(),
            detail: None,
            fix: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.fix = Some(fix.into());
        self
    }
}

/// Classification of a database failure, mapped to a recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorClass {
    /// Stale or contended lock; find and kill, or clear lock files.
    Locked,
    /// The file is not a database; rebuild from JSONL if possible.
    NotADatabase,
    /// Migration or validation failed; rebuild or repair in place.
    MigrationFailed,
    /// Anything else; force-repair or JSONL rebuild.
    Generic,
}

/// Run every check in order.
#[must_use]
pub fn run_all(beads_dir: &Path, cli_version: &str, config: &Config) -> Vec<DoctorCheck> {
    vec![
        check_database_version(beads_dir, cli_version, config),
        check_schema_compatibility(beads_dir),
        check_database_integrity(beads_dir),
        check_database_size(beads_dir, config),
    ]
}

/// True when any check errored (drives the command's exit code;
/// warnings exit 0).
#[must_use]
pub fn has_errors(checks: &[DoctorCheck]) -> bool {
    checks
        .iter()
        .any(|check| check.status == CheckStatus::Error)
}

fn load_metadata(beads_dir: &Path) -> std::result::Result<Metadata, DoctorCheck> {
    Metadata::load(beads_dir).map_err(|err| {
        DoctorCheck::error("Database", "Unable to read metadata.json")
            .with_detail(err.to_string())
            .with_fix("Run 'bd doctor --fix' to repair the workspace config")
    })
}

/// JSONL availability: `(path, issue count)` for the canonical file or
/// the legacy `beads.jsonl` fallback.
#[must_use]
pub fn discover_jsonl(beads_dir: &Path) -> Option<(PathBuf, usize)> {
    for name in ["issues.jsonl", "beads.jsonl"] {
        let path = beads_dir.join(name);
        if path.is_file() {
            let count = count_jsonl_issues(&path).map(|(count, _, _)| count).unwrap_or(0);
            return Some((path, count));
        }
    }
    None
}

fn detect_prefix(path: &Path) -> Option<String> {
    let (_, prefixes, _) = count_jsonl_issues(path).ok()?;
    prefixes
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(prefix, _)| prefix)
}

/// Check 1: the backing store exists and its `bd_version` matches the
/// binary.
#[must_use]
pub fn check_database_version(beads_dir: &Path, cli_version: &str, config: &Config) -> DoctorCheck {
    const NAME: &str = "Database";

    let metadata = match load_metadata(beads_dir) {
        Ok(metadata) => metadata,
        Err(check) => return check,
    };

    if metadata.backend == Backend::Dolt {
        return check_dolt_version(NAME, &metadata, cli_version);
    }

    let db_path = metadata.db_path(beads_dir);
    if !db_path.exists() {
        if let Some((jsonl_path, count)) = discover_jsonl(beads_dir) {
            if config.get_bool("no-db") {
                return DoctorCheck::ok(NAME, "JSONL-only mode")
                    .with_detail("Using issues.jsonl (no database)");
            }
            let fix = match detect_prefix(&jsonl_path) {
                Some(prefix) => format!(
                    "Run 'bd init' to hydrate the database from JSONL (detected prefix: {prefix})"
                ),
                None => "Run 'bd init' to hydrate the database from JSONL".to_string(),
            };
            return DoctorCheck::warning(NAME, "Fresh clone detected (no database)")
                .with_detail(format!("Found {count} issue(s) in JSONL to import"))
                .with_fix(fix);
        }
        return DoctorCheck::error(NAME, "No database found")
            .with_fix("Run 'bd init' to create the database");
    }

    match embedded_database_version(&db_path) {
        DbVersion::Unreadable => DoctorCheck::error(NAME, "Unable to read database version")
            .with_detail("Storage: SQLite")
            .with_fix("Database may be corrupted. Run 'bd doctor --fix'"),
        DbVersion::Missing => DoctorCheck::warning(NAME, "Database missing version metadata")
            .with_detail("Storage: SQLite")
            .with_fix("Run 'bd migrate' to stamp the schema version"),
        DbVersion::Found(version) if version != cli_version => DoctorCheck::warning(
            NAME,
            format!("version {version} (CLI: {cli_version})"),
        )
        .with_detail("Storage: SQLite")
        .with_fix("Run 'bd migrate' to sync the database with the CLI version"),
        DbVersion::Found(version) => {
            DoctorCheck::ok(NAME, format!("version {version}")).with_detail("Storage: SQLite")
        }
    }
}

fn check_dolt_version(name: &str, metadata: &Metadata, cli_version: &str) -> DoctorCheck {
    let cancel = CancelToken::new();
    let mut store = match DoltStore::connect(metadata, &OpenOptions::read_only()) {
        Ok(store) => store,
        Err(err) => {
            return DoctorCheck::error(name, "Unable to open database")
                .with_detail(format!("Storage: Dolt\n\nError: {err}"))
                .with_fix("Check that 'dolt sql-server' is running, or run: bd dolt test");
        }
    };

    match store.get_metadata(&cancel, "bd_version") {
        Err(err) => DoctorCheck::error(name, "Unable to read database version")
            .with_detail(format!("Storage: Dolt\n\nError: {err}"))
            .with_fix("Database may be corrupted. Run 'bd doctor --fix' to rebuild from JSONL"),
        Ok(None) => DoctorCheck::warning(name, "Database missing version metadata")
            .with_detail("Storage: Dolt")
            .with_fix("Run 'bd doctor --fix' to repair metadata"),
        Ok(Some(version)) if version != cli_version => {
            DoctorCheck::warning(name, format!("version {version} (CLI: {cli_version})"))
                .with_detail("Storage: Dolt")
                .with_fix("Update bd and re-run (dolt metadata is updated automatically)")
        }
        Ok(Some(version)) => {
            DoctorCheck::ok(name, format!("version {version}")).with_detail("Storage: Dolt")
        }
    }
}

enum DbVersion {
    Found(String),
    Missing,
    Unreadable,
}

fn embedded_database_version(db_path: &Path) -> DbVersion {
    let Ok(conn) = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY) else {
        return DbVersion::Unreadable;
    };

    if let Ok(version) = conn.query_row(
        "SELECT value FROM metadata WHERE key = 'bd_version'",
        [],
        |row| row.get::<_, String>(0),
    ) {
        return DbVersion::Found(version);
    }

    // Distinguish "no metadata table" (pre-migrator database) from "no
    // row" (created but never stamped).
    let table_exists = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name='metadata'")
        .and_then(|mut stmt| stmt.exists([]));
    match table_exists {
        Ok(true) => DbVersion::Missing,
        Ok(false) => DbVersion::Missing,
        Err(_) => DbVersion::Unreadable,
    }
}

/// Check 2: required tables and columns are present. Missing elements
/// are listed individually. The server backend gets a query sanity
/// check instead of a column probe.
#[must_use]
pub fn check_schema_compatibility(beads_dir: &Path) -> DoctorCheck {
    const NAME: &str = "Schema Compatibility";

    let metadata = match load_metadata(beads_dir) {
        Ok(metadata) => metadata,
        Err(check) => return check,
    };

    if metadata.backend == Backend::Dolt {
        let cancel = CancelToken::new();
        let mut store = match DoltStore::connect(&metadata, &OpenOptions::read_only()) {
            Ok(store) => store,
            Err(err) => {
                return DoctorCheck::error(NAME, "Failed to open database")
                    .with_detail(format!("Storage: Dolt\n\nError: {err}"));
            }
        };
        return match store.statistics(&cancel) {
            Ok(_) => DoctorCheck::ok(NAME, "Basic queries succeeded").with_detail("Storage: Dolt"),
            Err(err) => DoctorCheck::error(NAME, "Database schema is incomplete or incompatible")
                .with_detail(format!("Storage: Dolt\n\nError: {err}"))
                .with_fix("Run 'bd doctor --fix' to rebuild from JSONL"),
        };
    }

    let db_path = metadata.db_path(beads_dir);
    if !db_path.exists() {
        return DoctorCheck::ok(NAME, "N/A (no database)");
    }

    let conn = match Connection::open_with_flags(&db_path, OpenFlags::SQLITE_OPEN_READ_ONLY) {
        Ok(conn) => conn,
        Err(err) => {
            return DoctorCheck::error(NAME, "Failed to open database")
                .with_detail(err.to_string())
                .with_fix("Database may be corrupted. Run 'bd doctor --fix'");
        }
    };

    let mut missing = Vec::new();
    for (table, columns) in REQUIRED_SCHEMA {
        let probe = format!("SELECT {} FROM {table} LIMIT 0", columns.join(", "));
        match conn.prepare(&probe) {
            Ok(_) => {}
            Err(err) => {
                let message = err.to_string();
                if message.contains("no such table") {
                    missing.push(format!("table:{table}"));
                } else {
                    // Narrow down which columns are absent.
                    for column in *columns {
                        let single = format!("SELECT {column} FROM {table} LIMIT 0");
                        if conn
                            .prepare(&single)
                            .err()
                            .map(|e| e.to_string().contains("no such column"))
                            .unwrap_or(false)
                        {
                            missing.push(format!("{table}.{column}"));
                        }
                    }
                }
            }
        }
    }

    if missing.is_empty() {
        DoctorCheck::ok(NAME, "All required tables and columns present")
    } else {
        DoctorCheck::error(NAME, "Database schema is incomplete or incompatible")
            .with_detail(format!("Missing: {}", missing.join(", ")))
            .with_fix("Run 'bd migrate' to upgrade the schema")
    }
}

/// Check 3: native integrity probe. On failure the error is classified
/// and a concrete recovery action prescribed.
#[must_use]
pub fn check_database_integrity(beads_dir: &Path) -> DoctorCheck {
    const NAME: &str = "Database Integrity";

    let metadata = match load_metadata(beads_dir) {
        Ok(metadata) => metadata,
        Err(check) => return check,
    };

    if metadata.backend == Backend::Dolt {
        let cancel = CancelToken::new();
        let mut store = match DoltStore::connect(&metadata, &OpenOptions::read_only()) {
            Ok(store) => store,
            Err(err) => {
                return DoctorCheck::error(NAME, "Failed to open database")
                    .with_detail(format!("Storage: Dolt\n\nError: {err}"))
                    .with_fix("Run 'bd doctor --fix' to rebuild from JSONL");
            }
        };
        if let Err(err) = store.get_metadata(&cancel, "bd_version") {
            return DoctorCheck::error(NAME, "Basic query failed")
                .with_detail(format!("Storage: Dolt\n\nError: {err}"));
        }
        if let Err(err) = store.statistics(&cancel) {
            return DoctorCheck::error(NAME, "Basic query failed")
                .with_detail(format!("Storage: Dolt\n\nError: {err}"));
        }
        return DoctorCheck::ok(NAME, "Basic query check passed")
            .with_detail("Storage: Dolt (no integrity_check equivalent)");
    }

    let db_path = metadata.db_path(beads_dir);
    if !db_path.exists() {
        return DoctorCheck::ok(NAME, "N/A (no database)");
    }

    let jsonl = discover_jsonl(beads_dir);
    let jsonl_count = jsonl.as_ref().map_or(0, |(_, count)| *count);
    let jsonl_available = jsonl_count > 0;

    // A zero-byte file carries no schema at all; the engine would call
    // it a valid empty database, but as a store it is unusable.
    let empty_file = fs_len(&db_path) == Some(0);
    let probe = if empty_file {
        Err("file is not a database (zero bytes)".to_string())
    } else {
        Connection::open_with_flags(&db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|err| err.to_string())
            .and_then(|conn| run_integrity_pragma(&conn).map_err(|err| err.to_string()))
    };

    match probe {
        Err(message) => {
            let (class, label, recovery) =
                classify_database_error(&message, jsonl_count, jsonl_available);
            tracing::debug!(?class, "integrity probe failed");
            DoctorCheck::error(NAME, label)
                .with_detail(format!("{recovery}\n\nError: {message}"))
                .with_fix("See recovery steps above")
        }
        Ok(results) if results.len() == 1 && results[0] == "ok" => {
            DoctorCheck::ok(NAME, "No corruption detected")
        }
        Ok(results) => {
            let message = if jsonl_available {
                format!("Database corruption detected (JSONL has {jsonl_count} issues for recovery)")
            } else {
                "Database corruption detected".to_string()
            };
            let fix = if jsonl_available {
                "Run 'bd doctor --fix' to recover from the JSONL backup"
            } else {
                "Restore .beads/issues.jsonl from git, then run 'bd doctor --fix'"
            };
            DoctorCheck::error(NAME, message)
                .with_detail(results.join("; "))
                .with_fix(fix)
        }
    }
}

fn fs_len(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|meta| meta.len())
}

fn run_integrity_pragma(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("PRAGMA integrity_check")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    rows.collect()
}

/// Check 4: warn when closed issues pile up. Threshold comes from
/// `doctor.suggest_pruning_issue_count` (default 5000, 0 disables).
///
/// Never auto-fixed: pruning permanently deletes history, so it stays
/// an explicit human decision.
#[must_use]
pub fn check_database_size(beads_dir: &Path, config: &Config) -> DoctorCheck {
    const NAME: &str = "Large Database";

    let metadata = match load_metadata(beads_dir) {
        Ok(metadata) => metadata,
        Err(check) => return check,
    };
    if metadata.backend == Backend::Dolt {
        return DoctorCheck::ok(NAME, "N/A (dolt backend)");
    }

    let db_path = metadata.db_path(beads_dir);
    if !db_path.exists() {
        return DoctorCheck::ok(NAME, "N/A (no database)");
    }

    let threshold = config
        .get_int("doctor.suggest_pruning_issue_count")
        .unwrap_or(5000);
    if threshold == 0 {
        return DoctorCheck::ok(NAME, "Check disabled (threshold = 0)");
    }

    let closed: i64 = match Connection::open_with_flags(&db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .and_then(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM issues WHERE status = 'closed'",
                [],
                |row| row.get(0),
            )
        }) {
        Ok(count) => count,
        Err(_) => return DoctorCheck::ok(NAME, "N/A (unable to count issues)"),
    };

    if closed > threshold {
        DoctorCheck::warning(NAME, format!("{closed} closed issues (threshold: {threshold})"))
            .with_detail("A large closed-issue count may slow queries")
            .with_fix("Consider 'bd cleanup --older-than 90' to prune old closed issues")
    } else {
        DoctorCheck::ok(NAME, format!("{closed} closed issues (threshold: {threshold})"))
    }
}

/// Classify a database failure and prescribe recovery steps.
///
/// Returns `(class, short label, recovery steps)`. The JSONL issue
/// count is woven into the steps when a rebuild is possible.
#[must_use]
pub fn classify_database_error(
    message: &str,
    jsonl_count: usize,
    jsonl_available: bool,
) -> (ErrorClass, String, String) {
    let lower = message.to_lowercase();

    if lower.contains("locked") || lower.contains("stale lock") {
        return (
            ErrorClass::Locked,
            "Database is locked".to_string(),
            format!(
                "1. Check for running bd processes: ps aux | grep bd\n\
                 2. Kill any stale processes\n\
                 3. Run: bd doctor --fix (removes stale lock files)\n\
                 4. If still stuck, manually remove: .beads/{}",
                lock::LOCK_FILE
            ),
        );
    }

    if lower.contains("not a database") || lower.contains("file is not a database") {
        let steps = if jsonl_available {
            format!(
                "Database file is corrupted beyond repair.\n\n\
                 Recovery steps:\n\
                 1. Back up the corrupt database: mv .beads/beads.db .beads/beads.db.broken\n\
                 2. Rebuild from JSONL ({jsonl_count} issues): bd doctor --fix --source=jsonl\n\
                 3. Verify: bd stats"
            )
        } else {
            "Database file is corrupted and no JSONL backup was found.\n\
             Manual recovery required:\n\
             1. Restore from git: git checkout HEAD -- .beads/issues.jsonl\n\
             2. Rebuild the database: bd doctor --fix --force"
                .to_string()
        };
        return (
            ErrorClass::NotADatabase,
            "File is not a valid database".to_string(),
            steps,
        );
    }

    if lower.contains("migration") || lower.contains("validation failed") {
        let steps = if jsonl_available {
            format!(
                "Database has validation errors (possibly orphaned dependencies).\n\n\
                 Recovery steps:\n\
                 1. Back up the database: mv .beads/beads.db .beads/beads.db.broken\n\
                 2. Rebuild from JSONL ({jsonl_count} issues): bd doctor --fix --source=jsonl\n\
                 3. Verify: bd stats\n\n\
                 Alternative: bd doctor --fix --force (attempts in-place repair)"
            )
        } else {
            "Database validation failed and no JSONL backup is available.\n\
             Try: bd doctor --fix --force"
                .to_string()
        };
        return (
            ErrorClass::MigrationFailed,
            "Database migration or validation failed".to_string(),
            steps,
        );
    }

    let steps = if jsonl_available {
        format!("Run 'bd doctor --fix --source=jsonl' to rebuild from JSONL ({jsonl_count} issues)")
    } else {
        "Run 'bd doctor --fix --force' to attempt recovery".to_string()
    };
    (
        ErrorClass::Generic,
        "Failed to open database".to_string(),
        steps,
    )
}
