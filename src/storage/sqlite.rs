//! Embedded `SQLite` backend.
//!
//! A single-file transactional store. Writers hold the sidecar lock for
//! the lifetime of the handle; doctor probes open read-only with no lock
//! so they can run beside a writer under WAL snapshot isolation.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Metadata;
use crate::error::{BeadsError, Result};
use crate::model::{Dependency, DependencyType, Issue, Statistics};
use crate::storage::lock::{self, LockGuard};
use crate::storage::schema::apply_schema;
use crate::storage::{IssueFilter, OpenOptions as StoreOpenOptions};
use crate::util::cancel::CancelToken;
use crate::util::id::{self, parent_id};
use std::str::FromStr;

/// SQLite-backed store.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
    max_depth: usize,
    // Held for the handle's lifetime; Drop releases it on all exit paths.
    _lock: Option<LockGuard>,
}

const ISSUE_COLUMNS: &str = "id, content_hash, title, description, status, issue_type, priority, \
     estimated_minutes, assignee, sender, created_at, updated_at, closed_at, close_reason, \
     pinned, ephemeral, compaction_level, labels, waiters, extra";

impl SqliteStore {
    /// Open the embedded database for a workspace.
    ///
    /// # Errors
    ///
    /// - `DatabaseNotFound` when the file is absent and `create` is off
    ///   (or the handle is read-only)
    /// - `DatabaseLocked` / `StaleLock` when the sidecar lock is held
    pub fn open(beads_dir: &Path, metadata: &Metadata, opts: &StoreOpenOptions) -> Result<Self> {
        let path = metadata.db_path(beads_dir);

        if opts.read_only {
            if !path.exists() {
                return Err(BeadsError::DatabaseNotFound { path });
            }
            let conn = Connection::open_with_flags(
                &path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            return Ok(Self {
                conn,
                path,
                max_depth: opts.max_depth,
                _lock: None,
            });
        }

        if !opts.create && !path.exists() {
            return Err(BeadsError::DatabaseNotFound { path });
        }

        let guard = lock::acquire(beads_dir)?;
        let conn = Connection::open(&path)?;
        conn.busy_timeout(Duration::from_millis(opts.lock_timeout_ms))?;
        apply_schema(&conn)?;

        Ok(Self {
            conn,
            path,
            max_depth: opts.max_depth,
            _lock: Some(guard),
        })
    }

    /// In-memory store for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if schema application fails.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
            max_depth: id::DEFAULT_MAX_DEPTH,
            _lock: None,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    // === metadata ===

    /// Read a metadata value; absent keys return `None`.
    ///
    /// # Errors
    ///
    /// Returns a database error on query failure.
    pub fn get_metadata(&self, cancel: &CancelToken, key: &str) -> Result<Option<String>> {
        cancel.check()?;
        let value = self
            .conn
            .query_row("SELECT value FROM metadata WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Write a metadata value.
    ///
    /// # Errors
    ///
    /// Returns a database error on failure.
    pub fn set_metadata(&mut self, cancel: &CancelToken, key: &str, value: &str) -> Result<()> {
        cancel.check()?;
        self.conn.execute(
            "INSERT INTO metadata (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;
        Ok(())
    }

    // === issues ===

    /// Insert or replace an issue. Validates the ID shape, hierarchy
    /// depth, parent existence for dotted IDs, and field invariants;
    /// recomputes `content_hash`. Returns the id.
    ///
    /// # Errors
    ///
    /// `InvalidId`, `DepthExceeded`, `ParentMissing`, or validation
    /// errors; database errors on write failure.
    pub fn upsert_issue(&mut self, cancel: &CancelToken, issue: &Issue) -> Result<String> {
        cancel.check()?;

        let parts = id::parse_id(&issue.id)?;
        if parts.depth() > self.max_depth {
            return Err(BeadsError::DepthExceeded {
                id: issue.id.clone(),
                max_depth: self.max_depth,
            });
        }
        if let Some(parent) = parent_id(&issue.id) {
            if !self.issue_exists(&parent)? {
                return Err(BeadsError::ParentMissing {
                    id: issue.id.clone(),
                    parent,
                });
            }
        }

        let mut issue = issue.clone();
        issue.normalize();
        issue.validate()?;
        issue.content_hash = Some(issue.compute_content_hash());

        self.conn.execute(
            "INSERT INTO issues (id, content_hash, title, description, status, issue_type,
                priority, estimated_minutes, assignee, sender, created_at, updated_at,
                closed_at, close_reason, pinned, ephemeral, compaction_level, labels,
                waiters, extra)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                ?16, ?17, ?18, ?19, ?20)
             ON CONFLICT(id) DO UPDATE SET
                content_hash = excluded.content_hash,
                title = excluded.title,
                description = excluded.description,
                status = excluded.status,
                issue_type = excluded.issue_type,
                priority = excluded.priority,
                estimated_minutes = excluded.estimated_minutes,
                assignee = excluded.assignee,
                sender = excluded.sender,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                closed_at = excluded.closed_at,
                close_reason = excluded.close_reason,
                pinned = excluded.pinned,
                ephemeral = excluded.ephemeral,
                compaction_level = excluded.compaction_level,
                labels = excluded.labels,
                waiters = excluded.waiters,
                extra = excluded.extra",
            rusqlite::params![
                issue.id,
                issue.content_hash,
                issue.title,
                issue.description.as_deref().unwrap_or(""),
                issue.status.as_str(),
                issue.issue_type.as_str(),
                issue.priority.0,
                issue.estimated_minutes,
                issue.assignee,
                issue.sender,
                issue.created_at.to_rfc3339(),
                issue.updated_at.to_rfc3339(),
                issue.closed_at.map(|dt| dt.to_rfc3339()),
                issue.close_reason,
                i32::from(issue.pinned),
                i32::from(issue.ephemeral),
                issue.compaction_level,
                serde_json::to_string(&issue.labels)?,
                serde_json::to_string(&issue.waiters)?,
                serde_json::to_string(&issue.extra)?,
            ],
        )?;

        Ok(issue.id)
    }

    /// Fetch one issue.
    ///
    /// # Errors
    ///
    /// `IssueNotFound` when the id is absent.
    pub fn get_issue(&self, cancel: &CancelToken, id: &str) -> Result<Issue> {
        cancel.check()?;
        self.get_issue_opt(id)?
            .ok_or_else(|| BeadsError::IssueNotFound { id: id.to_string() })
    }

    fn get_issue_opt(&self, id: &str) -> Result<Option<Issue>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?"),
                [id],
                raw_issue_from_row,
            )
            .optional()?;
        row.map(RawIssueRow::into_issue).transpose()
    }

    fn issue_exists(&self, id: &str) -> Result<bool> {
        let mut stmt = self.conn.prepare("SELECT 1 FROM issues WHERE id = ?")?;
        Ok(stmt.exists([id])?)
    }

    /// Physically delete an issue and its own edges.
    ///
    /// Reserved for the explicit cleanup path; closing is the normal
    /// lifecycle end. The child counter row is retained so freed child
    /// suffixes are never reused.
    ///
    /// # Errors
    ///
    /// `Conflict` when other issues still depend on it or dotted
    /// children exist; `IssueNotFound` when absent.
    pub fn delete_issue(&mut self, cancel: &CancelToken, id: &str) -> Result<()> {
        cancel.check()?;
        if !self.issue_exists(id)? {
            return Err(BeadsError::IssueNotFound { id: id.to_string() });
        }

        let dependents: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM dependencies WHERE depends_on_id = ? AND issue_id != ?",
            [id, id],
            |row| row.get(0),
        )?;
        if dependents > 0 {
            return Err(BeadsError::Conflict {
                message: format!("{id} has {dependents} dependent issue(s)"),
            });
        }

        let children: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM issues WHERE id LIKE ? || '.%'",
            [id],
            |row| row.get(0),
        )?;
        if children > 0 {
            return Err(BeadsError::Conflict {
                message: format!("{id} has {children} child issue(s)"),
            });
        }

        self.conn.execute(
            "DELETE FROM dependencies WHERE issue_id = ? OR depends_on_id = ?",
            [id, id],
        )?;
        // The export-hash row stays: it marks the snapshot line this
        // issue still occupies, so the next export knows to shed it.
        self.conn.execute("DELETE FROM issues WHERE id = ?", [id])?;
        Ok(())
    }

    /// List issues matching a filter, sorted ascending by ID.
    ///
    /// # Errors
    ///
    /// Returns database errors or row-conversion failures.
    pub fn list_issues(&self, cancel: &CancelToken, filter: &IssueFilter) -> Result<Vec<Issue>> {
        cancel.check()?;

        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            clauses.push("status = ?".to_string());
            params.push(Box::new(status.as_str().to_string()));
        } else if !filter.include_closed {
            clauses.push("status != 'closed'".to_string());
        }
        if let Some(issue_type) = filter.issue_type {
            clauses.push("issue_type = ?".to_string());
            params.push(Box::new(issue_type.as_str().to_string()));
        }
        if let Some(ref assignee) = filter.assignee {
            clauses.push("assignee = ?".to_string());
            params.push(Box::new(assignee.clone()));
        }
        if let Some(priority) = filter.priority {
            clauses.push("priority = ?".to_string());
            params.push(Box::new(priority.0));
        }
        if let Some(ref label) = filter.label {
            // Labels are a JSON array; match the quoted element.
            clauses.push("labels LIKE ?".to_string());
            params.push(Box::new(format!("%\"{label}\"%")));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues{where_clause} ORDER BY id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(params.iter().map(AsRef::as_ref)),
            raw_issue_from_row,
        )?;

        let mut issues = Vec::new();
        for row in rows {
            cancel.check()?;
            issues.push(row?.into_issue()?);
        }
        Ok(issues)
    }

    // === dependencies ===

    /// Insert or replace a dependency edge.
    ///
    /// # Errors
    ///
    /// `SelfDependency` for self-edges, `IssueNotFound` for dangling
    /// endpoints, and `HierarchyViolation` for a parent-child edge that
    /// does not follow the dotted-ID forest.
    pub fn upsert_dependency(&mut self, cancel: &CancelToken, dep: &Dependency) -> Result<()> {
        cancel.check()?;

        if dep.issue_id == dep.depends_on_id {
            return Err(BeadsError::SelfDependency {
                id: dep.issue_id.clone(),
            });
        }
        if !self.issue_exists(&dep.issue_id)? {
            return Err(BeadsError::IssueNotFound {
                id: dep.issue_id.clone(),
            });
        }
        // External references point outside this store; skip the
        // local-existence check for them.
        if !matches!(dep.dep_type, DependencyType::External(_))
            && !self.issue_exists(&dep.depends_on_id)?
        {
            return Err(BeadsError::IssueNotFound {
                id: dep.depends_on_id.clone(),
            });
        }
        // parent-child edges form a forest keyed by dotted IDs, which
        // rules out cycles structurally.
        if dep.dep_type == DependencyType::ParentChild
            && parent_id(&dep.issue_id).as_deref() != Some(dep.depends_on_id.as_str())
        {
            return Err(BeadsError::HierarchyViolation {
                from: dep.issue_id.clone(),
                to: dep.depends_on_id.clone(),
            });
        }

        self.conn.execute(
            "INSERT INTO dependencies (issue_id, depends_on_id, type, metadata, thread_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(issue_id, depends_on_id, type) DO UPDATE SET
                metadata = excluded.metadata,
                thread_id = excluded.thread_id",
            rusqlite::params![
                dep.issue_id,
                dep.depends_on_id,
                dep.dep_type.as_str(),
                dep.metadata,
                dep.thread_id,
                dep.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Delete a dependency edge. Missing edges are a no-op.
    ///
    /// # Errors
    ///
    /// Returns database errors on failure.
    pub fn delete_dependency(&mut self, cancel: &CancelToken, dep: &Dependency) -> Result<()> {
        cancel.check()?;
        self.conn.execute(
            "DELETE FROM dependencies WHERE issue_id = ? AND depends_on_id = ? AND type = ?",
            rusqlite::params![dep.issue_id, dep.depends_on_id, dep.dep_type.as_str()],
        )?;
        Ok(())
    }

    /// All edges touching `issue_id`, in either direction.
    ///
    /// # Errors
    ///
    /// Returns database errors on failure.
    pub fn dependencies_for(&self, cancel: &CancelToken, issue_id: &str) -> Result<Vec<Dependency>> {
        cancel.check()?;
        self.query_dependencies(
            "SELECT issue_id, depends_on_id, type, metadata, thread_id, created_at
             FROM dependencies WHERE issue_id = ?1 OR depends_on_id = ?1
             ORDER BY issue_id, depends_on_id",
            &[&issue_id as &dyn rusqlite::ToSql],
        )
    }

    /// Every edge in the store, ordered for stable export.
    ///
    /// # Errors
    ///
    /// Returns database errors on failure.
    pub fn all_dependencies(&self, cancel: &CancelToken) -> Result<Vec<Dependency>> {
        cancel.check()?;
        self.query_dependencies(
            "SELECT issue_id, depends_on_id, type, metadata, thread_id, created_at
             FROM dependencies ORDER BY issue_id, depends_on_id, type",
            &[],
        )
    }

    fn query_dependencies(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Dependency>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut deps = Vec::new();
        for row in rows {
            let (issue_id, depends_on_id, type_str, metadata, thread_id, created_at) = row?;
            deps.push(Dependency {
                issue_id,
                depends_on_id,
                dep_type: DependencyType::from_str(&type_str)?,
                metadata,
                thread_id,
                created_at: parse_timestamp(&created_at)?,
            });
        }
        Ok(deps)
    }

    // === counters / export hashes ===

    /// Allocate the next child suffix for a parent. Strictly monotonic;
    /// suffixes freed by deletes are never handed out again.
    ///
    /// # Errors
    ///
    /// Returns database errors on failure.
    pub fn next_child_suffix(&mut self, cancel: &CancelToken, parent_id: &str) -> Result<i64> {
        cancel.check()?;
        let next: i64 = self.conn.query_row(
            "INSERT INTO child_counters (parent_id, last_child) VALUES (?, 1)
             ON CONFLICT(parent_id) DO UPDATE SET last_child = last_child + 1
             RETURNING last_child",
            [parent_id],
            |row| row.get(0),
        )?;
        Ok(next)
    }

    /// Last-exported content hash for an issue.
    ///
    /// # Errors
    ///
    /// Returns database errors on failure.
    pub fn export_hash(&self, cancel: &CancelToken, issue_id: &str) -> Result<Option<String>> {
        cancel.check()?;
        let hash = self
            .conn
            .query_row(
                "SELECT content_hash FROM export_hashes WHERE issue_id = ?",
                [issue_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    /// All export-hash rows.
    ///
    /// # Errors
    ///
    /// Returns database errors on failure.
    pub fn all_export_hashes(
        &self,
        cancel: &CancelToken,
    ) -> Result<std::collections::HashMap<String, String>> {
        cancel.check()?;
        let mut stmt = self
            .conn
            .prepare("SELECT issue_id, content_hash FROM export_hashes")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut map = std::collections::HashMap::new();
        for row in rows {
            let (id, hash): (String, String) = row?;
            map.insert(id, hash);
        }
        Ok(map)
    }

    /// Record export hashes for a batch of issues.
    ///
    /// # Errors
    ///
    /// Returns database errors on failure.
    pub fn set_export_hashes(
        &mut self,
        cancel: &CancelToken,
        hashes: &[(String, String)],
    ) -> Result<()> {
        cancel.check()?;
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO export_hashes (issue_id, content_hash, exported_at)
                 VALUES (?, ?, ?)
                 ON CONFLICT(issue_id) DO UPDATE SET
                    content_hash = excluded.content_hash,
                    exported_at = excluded.exported_at",
            )?;
            for (issue_id, content_hash) in hashes {
                stmt.execute(rusqlite::params![issue_id, content_hash, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Drop all export hashes (forces the next export to rewrite).
    ///
    /// # Errors
    ///
    /// Returns database errors on failure.
    pub fn clear_export_hashes(&mut self, cancel: &CancelToken) -> Result<usize> {
        cancel.check()?;
        Ok(self.conn.execute("DELETE FROM export_hashes", [])?)
    }

    // === statistics / tx ===

    /// Store-level counts.
    ///
    /// # Errors
    ///
    /// Returns database errors on failure.
    pub fn statistics(&self, cancel: &CancelToken) -> Result<Statistics> {
        cancel.check()?;
        let mut stats = Statistics::default();
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM issues GROUP BY status")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?)))?;
        for row in rows {
            let (status, count) = row?;
            stats.total += count;
            match status.as_str() {
                "open" => stats.open = count,
                "in_progress" => stats.in_progress = count,
                "blocked" => stats.blocked = count,
                "deferred" => stats.deferred = count,
                "closed" => stats.closed = count,
                _ => {}
            }
        }
        stats.pinned = self
            .conn
            .query_row("SELECT COUNT(*) FROM issues WHERE pinned = 1", [], |row| {
                row.get(0)
            })?;
        stats.dependencies =
            self.conn
                .query_row("SELECT COUNT(*) FROM dependencies", [], |row| row.get(0))?;
        Ok(stats)
    }

    /// Execute a raw statement (transaction brackets from the store
    /// dispatcher).
    ///
    /// # Errors
    ///
    /// Returns database errors on failure.
    pub fn execute_raw(&mut self, statement: &str) -> Result<()> {
        self.conn.execute_batch(statement)?;
        Ok(())
    }

    /// Run `f` inside a single immediate transaction. Errors (including
    /// cancellation observed inside `f`) roll everything back.
    ///
    /// # Errors
    ///
    /// Propagates errors from `f` or the commit.
    pub fn with_tx<R>(
        &mut self,
        cancel: &CancelToken,
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        cancel.check()?;
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(value) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(err) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(err)
            }
        }
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| BeadsError::Corrupted {
            detail: format!("bad timestamp '{raw}': {err}"),
        })
}

/// Raw row shape; converted to `Issue` outside the rusqlite closure so
/// conversion failures surface as crate errors, not driver errors.
struct RawIssueRow {
    id: String,
    content_hash: Option<String>,
    title: String,
    description: String,
    status: String,
    issue_type: String,
    priority: i32,
    estimated_minutes: Option<i32>,
    assignee: Option<String>,
    sender: Option<String>,
    created_at: String,
    updated_at: String,
    closed_at: Option<String>,
    close_reason: Option<String>,
    pinned: i32,
    ephemeral: i32,
    compaction_level: i32,
    labels: String,
    waiters: String,
    extra: String,
}

fn raw_issue_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawIssueRow> {
    Ok(RawIssueRow {
        id: row.get(0)?,
        content_hash: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        status: row.get(4)?,
        issue_type: row.get(5)?,
        priority: row.get(6)?,
        estimated_minutes: row.get(7)?,
        assignee: row.get(8)?,
        sender: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        closed_at: row.get(12)?,
        close_reason: row.get(13)?,
        pinned: row.get(14)?,
        ephemeral: row.get(15)?,
        compaction_level: row.get(16)?,
        labels: row.get(17)?,
        waiters: row.get(18)?,
        extra: row.get(19)?,
    })
}

impl RawIssueRow {
    fn into_issue(self) -> Result<Issue> {
        Ok(Issue {
            id: self.id,
            content_hash: self.content_hash,
            title: self.title,
            description: if self.description.is_empty() {
                None
            } else {
                Some(self.description)
            },
            status: FromStr::from_str(&self.status)?,
            issue_type: FromStr::from_str(&self.issue_type)?,
            priority: crate::model::Priority(self.priority),
            estimated_minutes: self.estimated_minutes,
            assignee: self.assignee,
            sender: self.sender,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            closed_at: self.closed_at.as_deref().map(parse_timestamp).transpose()?,
            close_reason: self.close_reason,
            pinned: self.pinned != 0,
            ephemeral: self.ephemeral != 0,
            compaction_level: self.compaction_level,
            labels: serde_json::from_str(&self.labels)?,
            waiters: serde_json::from_str(&self.waiters)?,
            extra: serde_json::from_str(&self.extra)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IssueType, Priority, Status};
    use chrono::TimeZone;

    fn cancel() -> CancelToken {
        CancelToken::new()
    }

    fn make_issue(id: &str) -> Issue {
        Issue {
            id: id.to_string(),
            title: format!("Issue {id}"),
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            updated_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            ..Issue::default()
        }
    }

    #[test]
    fn upsert_and_get_roundtrip() {
        let mut store = SqliteStore::open_memory().unwrap();
        let mut issue = make_issue("bd-a1");
        issue.description = Some("body".to_string());
        issue.labels = vec!["z".into(), "a".into()];
        issue
            .extra
            .insert("foreign".to_string(), serde_json::json!({"x": 1}));

        store.upsert_issue(&cancel(), &issue).unwrap();
        let loaded = store.get_issue(&cancel(), "bd-a1").unwrap();

        assert_eq!(loaded.title, issue.title);
        assert_eq!(loaded.description.as_deref(), Some("body"));
        assert_eq!(loaded.labels, vec!["a".to_string(), "z".to_string()]);
        assert!(loaded.extra.contains_key("foreign"));
        assert!(loaded.content_hash.is_some());
    }

    #[test]
    fn upsert_is_idempotent() {
        let mut store = SqliteStore::open_memory().unwrap();
        let issue = make_issue("bd-a1");

        store.upsert_issue(&cancel(), &issue).unwrap();
        let first = store.get_issue(&cancel(), "bd-a1").unwrap();
        store.upsert_issue(&cancel(), &issue).unwrap();
        let second = store.get_issue(&cancel(), "bd-a1").unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn upsert_rejects_bad_ids() {
        let mut store = SqliteStore::open_memory().unwrap();
        let issue = make_issue("not_an_id");
        assert!(matches!(
            store.upsert_issue(&cancel(), &issue),
            Err(BeadsError::InvalidId { .. })
        ));
    }

    #[test]
    fn child_requires_parent() {
        let mut store = SqliteStore::open_memory().unwrap();
        let child = make_issue("bd-a1.1");
        match store.upsert_issue(&cancel(), &child) {
            Err(BeadsError::ParentMissing { parent, .. }) => assert_eq!(parent, "bd-a1"),
            other => panic!("expected ParentMissing, got {other:?}"),
        }

        store.upsert_issue(&cancel(), &make_issue("bd-a1")).unwrap();
        store.upsert_issue(&cancel(), &child).unwrap();
    }

    #[test]
    fn depth_limit_enforced() {
        let mut store = SqliteStore::open_memory().unwrap();
        store.upsert_issue(&cancel(), &make_issue("bd-a1")).unwrap();
        store
            .upsert_issue(&cancel(), &make_issue("bd-a1.1"))
            .unwrap();
        store
            .upsert_issue(&cancel(), &make_issue("bd-a1.1.1"))
            .unwrap();
        store
            .upsert_issue(&cancel(), &make_issue("bd-a1.1.1.1"))
            .unwrap();
        assert!(matches!(
            store.upsert_issue(&cancel(), &make_issue("bd-a1.1.1.1.1")),
            Err(BeadsError::DepthExceeded { .. })
        ));
    }

    #[test]
    fn get_missing_is_not_found() {
        let store = SqliteStore::open_memory().unwrap();
        assert!(matches!(
            store.get_issue(&cancel(), "bd-nope"),
            Err(BeadsError::IssueNotFound { .. })
        ));
    }

    #[test]
    fn delete_conflicts_with_dependents() {
        let mut store = SqliteStore::open_memory().unwrap();
        store.upsert_issue(&cancel(), &make_issue("bd-a1")).unwrap();
        store.upsert_issue(&cancel(), &make_issue("bd-b2")).unwrap();
        store
            .upsert_dependency(
                &cancel(),
                &Dependency {
                    issue_id: "bd-b2".to_string(),
                    depends_on_id: "bd-a1".to_string(),
                    dep_type: DependencyType::Blocks,
                    metadata: None,
                    thread_id: None,
                    created_at: Utc::now(),
                },
            )
            .unwrap();

        assert!(matches!(
            store.delete_issue(&cancel(), "bd-a1"),
            Err(BeadsError::Conflict { .. })
        ));

        // Deleting the dependent first frees the target.
        store.delete_issue(&cancel(), "bd-b2").unwrap();
        store.delete_issue(&cancel(), "bd-a1").unwrap();
    }

    #[test]
    fn delete_conflicts_with_children() {
        let mut store = SqliteStore::open_memory().unwrap();
        store.upsert_issue(&cancel(), &make_issue("bd-a1")).unwrap();
        store
            .upsert_issue(&cancel(), &make_issue("bd-a1.1"))
            .unwrap();
        assert!(matches!(
            store.delete_issue(&cancel(), "bd-a1"),
            Err(BeadsError::Conflict { .. })
        ));
    }

    #[test]
    fn self_dependency_rejected() {
        let mut store = SqliteStore::open_memory().unwrap();
        store.upsert_issue(&cancel(), &make_issue("bd-a1")).unwrap();
        let dep = Dependency {
            issue_id: "bd-a1".to_string(),
            depends_on_id: "bd-a1".to_string(),
            dep_type: DependencyType::Blocks,
            metadata: None,
            thread_id: None,
            created_at: Utc::now(),
        };
        assert!(matches!(
            store.upsert_dependency(&cancel(), &dep),
            Err(BeadsError::SelfDependency { .. })
        ));
    }

    #[test]
    fn parent_child_edge_must_follow_hierarchy() {
        let mut store = SqliteStore::open_memory().unwrap();
        store.upsert_issue(&cancel(), &make_issue("bd-a1")).unwrap();
        store.upsert_issue(&cancel(), &make_issue("bd-b2")).unwrap();
        store
            .upsert_issue(&cancel(), &make_issue("bd-a1.1"))
            .unwrap();

        let bad = Dependency {
            issue_id: "bd-b2".to_string(),
            depends_on_id: "bd-a1".to_string(),
            dep_type: DependencyType::ParentChild,
            metadata: None,
            thread_id: None,
            created_at: Utc::now(),
        };
        assert!(matches!(
            store.upsert_dependency(&cancel(), &bad),
            Err(BeadsError::HierarchyViolation { .. })
        ));

        let good = Dependency {
            issue_id: "bd-a1.1".to_string(),
            depends_on_id: "bd-a1".to_string(),
            dep_type: DependencyType::ParentChild,
            metadata: None,
            thread_id: None,
            created_at: Utc::now(),
        };
        store.upsert_dependency(&cancel(), &good).unwrap();
    }

    #[test]
    fn blocks_edges_may_cycle() {
        let mut store = SqliteStore::open_memory().unwrap();
        store.upsert_issue(&cancel(), &make_issue("bd-a1")).unwrap();
        store.upsert_issue(&cancel(), &make_issue("bd-b2")).unwrap();

        for (from, to) in [("bd-a1", "bd-b2"), ("bd-b2", "bd-a1")] {
            store
                .upsert_dependency(
                    &cancel(),
                    &Dependency {
                        issue_id: from.to_string(),
                        depends_on_id: to.to_string(),
                        dep_type: DependencyType::Blocks,
                        metadata: None,
                        thread_id: None,
                        created_at: Utc::now(),
                    },
                )
                .unwrap();
        }
        assert_eq!(store.all_dependencies(&cancel()).unwrap().len(), 2);
    }

    #[test]
    fn external_dependency_skips_target_check() {
        let mut store = SqliteStore::open_memory().unwrap();
        store.upsert_issue(&cancel(), &make_issue("bd-a1")).unwrap();
        let dep = Dependency {
            issue_id: "bd-a1".to_string(),
            depends_on_id: "gt-9x".to_string(),
            dep_type: DependencyType::External("gastown".to_string()),
            metadata: None,
            thread_id: None,
            created_at: Utc::now(),
        };
        store.upsert_dependency(&cancel(), &dep).unwrap();

        let deps = store.dependencies_for(&cancel(), "bd-a1").unwrap();
        assert_eq!(
            deps[0].dep_type,
            DependencyType::External("gastown".to_string())
        );
    }

    #[test]
    fn child_counter_is_monotonic_across_deletes() {
        let mut store = SqliteStore::open_memory().unwrap();
        store.upsert_issue(&cancel(), &make_issue("bd-a1")).unwrap();

        assert_eq!(store.next_child_suffix(&cancel(), "bd-a1").unwrap(), 1);
        assert_eq!(store.next_child_suffix(&cancel(), "bd-a1").unwrap(), 2);

        store
            .upsert_issue(&cancel(), &make_issue("bd-a1.2"))
            .unwrap();
        store.delete_issue(&cancel(), "bd-a1.2").unwrap();

        // The freed suffix 2 must not come back.
        assert_eq!(store.next_child_suffix(&cancel(), "bd-a1").unwrap(), 3);
    }

    #[test]
    fn list_filters() {
        let mut store = SqliteStore::open_memory().unwrap();
        let mut a = make_issue("bd-a1");
        a.labels = vec!["backend".to_string()];
        store.upsert_issue(&cancel(), &a).unwrap();

        let mut b = make_issue("bd-b2");
        b.status = Status::Closed;
        b.close_reason = Some("done".to_string());
        b.issue_type = IssueType::Bug;
        store.upsert_issue(&cancel(), &b).unwrap();

        let open = store
            .list_issues(&cancel(), &IssueFilter::default())
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, "bd-a1");

        let all = store
            .list_issues(
                &cancel(),
                &IssueFilter {
                    include_closed: true,
                    ..IssueFilter::default()
                },
            )
            .unwrap();
        assert_eq!(all.len(), 2);

        let bugs = store
            .list_issues(
                &cancel(),
                &IssueFilter {
                    issue_type: Some(IssueType::Bug),
                    include_closed: true,
                    ..IssueFilter::default()
                },
            )
            .unwrap();
        assert_eq!(bugs.len(), 1);

        let labelled = store
            .list_issues(
                &cancel(),
                &IssueFilter {
                    label: Some("backend".to_string()),
                    ..IssueFilter::default()
                },
            )
            .unwrap();
        assert_eq!(labelled.len(), 1);

        let critical = store
            .list_issues(
                &cancel(),
                &IssueFilter {
                    priority: Some(Priority::CRITICAL),
                    include_closed: true,
                    ..IssueFilter::default()
                },
            )
            .unwrap();
        assert_eq!(critical.len(), 2);
    }

    #[test]
    fn metadata_roundtrip() {
        let mut store = SqliteStore::open_memory().unwrap();
        assert_eq!(store.get_metadata(&cancel(), "bd_version").unwrap(), None);
        store
            .set_metadata(&cancel(), "bd_version", "0.23.0")
            .unwrap();
        store.set_metadata(&cancel(), "issue_prefix", "bd").unwrap();
        assert_eq!(
            store.get_metadata(&cancel(), "bd_version").unwrap(),
            Some("0.23.0".to_string())
        );
        store
            .set_metadata(&cancel(), "bd_version", "0.24.0")
            .unwrap();
        assert_eq!(
            store.get_metadata(&cancel(), "bd_version").unwrap(),
            Some("0.24.0".to_string())
        );
    }

    #[test]
    fn export_hash_tracking() {
        let mut store = SqliteStore::open_memory().unwrap();
        assert_eq!(store.export_hash(&cancel(), "bd-a1").unwrap(), None);

        store
            .set_export_hashes(
                &cancel(),
                &[("bd-a1".to_string(), "abc".to_string())],
            )
            .unwrap();
        assert_eq!(
            store.export_hash(&cancel(), "bd-a1").unwrap(),
            Some("abc".to_string())
        );

        assert_eq!(store.clear_export_hashes(&cancel()).unwrap(), 1);
        assert_eq!(store.export_hash(&cancel(), "bd-a1").unwrap(), None);
    }

    #[test]
    fn statistics_counts() {
        let mut store = SqliteStore::open_memory().unwrap();
        store.upsert_issue(&cancel(), &make_issue("bd-a1")).unwrap();
        let mut closed = make_issue("bd-b2");
        closed.status = Status::Closed;
        closed.close_reason = Some("done".to_string());
        store.upsert_issue(&cancel(), &closed).unwrap();
        let mut pinned = make_issue("bd-c3");
        pinned.pinned = true;
        store.upsert_issue(&cancel(), &pinned).unwrap();

        let stats = store.statistics(&cancel()).unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.open, 2);
        assert_eq!(stats.closed, 1);
        assert_eq!(stats.pinned, 1);
    }

    #[test]
    fn tx_rolls_back_on_error() {
        let mut store = SqliteStore::open_memory().unwrap();
        let result: Result<()> = store.with_tx(&cancel(), |store| {
            store.upsert_issue(&CancelToken::new(), &make_issue("bd-a1"))?;
            Err(BeadsError::Cancelled)
        });
        assert!(matches!(result, Err(BeadsError::Cancelled)));
        assert!(matches!(
            store.get_issue(&cancel(), "bd-a1"),
            Err(BeadsError::IssueNotFound { .. })
        ));
    }

    #[test]
    fn cancelled_token_short_circuits() {
        let mut store = SqliteStore::open_memory().unwrap();
        let token = CancelToken::new();
        token.cancel();
        assert!(matches!(
            store.upsert_issue(&token, &make_issue("bd-a1")),
            Err(BeadsError::Cancelled)
        ));
        assert!(matches!(
            store.get_metadata(&token, "bd_version"),
            Err(BeadsError::Cancelled)
        ));
    }
}
