//! Schema definitions and the idempotent migrator.
//!
//! Both backends carry the same logical schema; the DDL comes in a
//! `SQLite` dialect and a MySQL dialect for the Dolt server. The doctor's
//! schema probe walks `REQUIRED_SCHEMA` rather than the DDL so a column
//! dropped by hand is reported individually.

use rusqlite::Connection;

use crate::error::Result;

/// The complete `SQLite` schema.
///
/// TEXT timestamps are RFC 3339. `labels`, `waiters`, and `extra` are
/// JSON text so the issues table alone carries every issue attribute.
pub const SCHEMA_SQL: &str = r"
    CREATE TABLE IF NOT EXISTS issues (
        id TEXT PRIMARY KEY,
        content_hash TEXT,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL,
        issue_type TEXT NOT NULL,
        priority INTEGER NOT NULL,
        estimated_minutes INTEGER,
        assignee TEXT,
        sender TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        closed_at TEXT,
        close_reason TEXT,
        pinned INTEGER NOT NULL DEFAULT 0,
        ephemeral INTEGER NOT NULL DEFAULT 0,
        compaction_level INTEGER NOT NULL DEFAULT 0,
        labels TEXT NOT NULL DEFAULT '[]',
        waiters TEXT NOT NULL DEFAULT '[]',
        extra TEXT NOT NULL DEFAULT '{}',
        CHECK (length(title) >= 1),
        CHECK (priority >= 0 AND priority <= 4)
    );

    CREATE INDEX IF NOT EXISTS idx_issues_status ON issues(status);
    CREATE INDEX IF NOT EXISTS idx_issues_assignee ON issues(assignee);
    CREATE INDEX IF NOT EXISTS idx_issues_updated_at ON issues(updated_at);

    CREATE TABLE IF NOT EXISTS dependencies (
        issue_id TEXT NOT NULL,
        depends_on_id TEXT NOT NULL,
        type TEXT NOT NULL,
        metadata TEXT,
        thread_id TEXT,
        created_at TEXT NOT NULL,
        PRIMARY KEY (issue_id, depends_on_id, type)
    );
    CREATE INDEX IF NOT EXISTS idx_dependencies_depends_on ON dependencies(depends_on_id);

    CREATE TABLE IF NOT EXISTS metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS child_counters (
        parent_id TEXT PRIMARY KEY,
        last_child INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS export_hashes (
        issue_id TEXT PRIMARY KEY,
        content_hash TEXT NOT NULL,
        exported_at TEXT NOT NULL
    );
";

/// MySQL-dialect DDL for the Dolt server backend, one statement per
/// entry (the server protocol executes them individually).
pub const DOLT_SCHEMA_SQL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS issues (
        id VARCHAR(255) PRIMARY KEY,
        content_hash VARCHAR(64),
        title TEXT NOT NULL,
        description TEXT,
        status VARCHAR(32) NOT NULL,
        issue_type VARCHAR(32) NOT NULL,
        priority INT NOT NULL,
        estimated_minutes INT,
        assignee VARCHAR(255),
        sender VARCHAR(255),
        created_at VARCHAR(64) NOT NULL,
        updated_at VARCHAR(64) NOT NULL,
        closed_at VARCHAR(64),
        close_reason TEXT,
        pinned TINYINT NOT NULL DEFAULT 0,
        ephemeral TINYINT NOT NULL DEFAULT 0,
        compaction_level INT NOT NULL DEFAULT 0,
        labels TEXT,
        waiters TEXT,
        extra TEXT
    )",
    "CREATE TABLE IF NOT EXISTS dependencies (
        issue_id VARCHAR(255) NOT NULL,
        depends_on_id VARCHAR(255) NOT NULL,
        `type` VARCHAR(64) NOT NULL,
        metadata TEXT,
        thread_id VARCHAR(255),
        created_at VARCHAR(64) NOT NULL,
        PRIMARY KEY (issue_id, depends_on_id, `type`)
    )",
    "CREATE TABLE IF NOT EXISTS metadata (
        `key` VARCHAR(255) PRIMARY KEY,
        value TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS child_counters (
        parent_id VARCHAR(255) PRIMARY KEY,
        last_child BIGINT NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS export_hashes (
        issue_id VARCHAR(255) PRIMARY KEY,
        content_hash VARCHAR(64) NOT NULL,
        exported_at VARCHAR(64) NOT NULL
    )",
];

/// Required `table -> columns` map probed by the doctor's schema check.
/// Missing tables and missing columns are reported individually.
pub const REQUIRED_SCHEMA: &[(&str, &[&str])] = &[
    (
        "issues",
        &[
            "id",
            "title",
            "content_hash",
            "status",
            "close_reason",
            "pinned",
            "sender",
            "ephemeral",
            "compaction_level",
        ],
    ),
    (
        "dependencies",
        &["issue_id", "depends_on_id", "type", "metadata", "thread_id"],
    ),
    ("child_counters", &["parent_id", "last_child"]),
    ("export_hashes", &["issue_id", "content_hash"]),
    ("metadata", &["key", "value"]),
];

/// Apply the schema to an embedded database.
///
/// Idempotent: every statement is `IF NOT EXISTS` and the migrations
/// only add what is missing, so re-running on a current database is a
/// no-op with no output.
///
/// # Errors
///
/// Returns an error if the DDL or a pragma fails.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    run_migrations(conn)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!(
        "SELECT 1 FROM pragma_table_info('{table}') WHERE name = ?"
    ))?;
    Ok(stmt.exists([column])?)
}

/// Additive migrations for databases created by older binaries.
fn run_migrations(conn: &Connection) -> Result<()> {
    // 0.22 -> 0.23: waiters moved onto the issues table.
    if !has_column(conn, "issues", "waiters")? {
        conn.execute(
            "ALTER TABLE issues ADD COLUMN waiters TEXT NOT NULL DEFAULT '[]'",
            [],
        )?;
        tracing::debug!("migrated issues table: added waiters column");
    }
    // 0.20 -> 0.21: unknown-key preservation.
    if !has_column(conn, "issues", "extra")? {
        conn.execute(
            "ALTER TABLE issues ADD COLUMN extra TEXT NOT NULL DEFAULT '{}'",
            [],
        )?;
        tracing::debug!("migrated issues table: added extra column");
    }
    Ok(())
}
