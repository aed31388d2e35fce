//! Dolt server backend.
//!
//! A network client to an external `dolt sql-server` speaking the MySQL
//! dialect. Branching operations (`commit`, `push`, `pull`) go through
//! Dolt's stored procedures. Remote authentication is delegated to
//! `DOLT_REMOTE_USER` / `DOLT_REMOTE_PASSWORD`, which the server reads
//! itself.

use chrono::{DateTime, Utc};
use mysql::prelude::Queryable;
use mysql::{Conn, OptsBuilder, Row};
use std::net::{TcpStream, ToSocketAddrs};
use std::str::FromStr;
use std::time::Duration;

use crate::config::Metadata;
use crate::error::{BeadsError, Result};
use crate::model::{Dependency, DependencyType, Issue, Priority, Statistics};
use crate::storage::schema::DOLT_SCHEMA_SQL;
use crate::storage::{CommitOutcome, IssueFilter, OpenOptions as StoreOpenOptions};
use crate::util::cancel::CancelToken;
use crate::util::id::{self, parent_id};

/// TCP dial timeout for the connection probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Probe the configured server with a bounded TCP dial.
///
/// Returns within [`PROBE_TIMEOUT`] per resolved address; any refused or
/// unresolvable address yields `false`, never an error.
#[must_use]
pub fn test_server_connection(host: &str, port: u16) -> bool {
    let Ok(addrs) = (host, port).to_socket_addrs() else {
        return false;
    };
    for addr in addrs {
        if TcpStream::connect_timeout(&addr, PROBE_TIMEOUT).is_ok() {
            return true;
        }
    }
    false
}

/// Dolt-server-backed store.
pub struct DoltStore {
    conn: Conn,
    lock_name: Option<String>,
    max_depth: usize,
}

impl std::fmt::Debug for DoltStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DoltStore")
            .field("lock_name", &self.lock_name)
            .finish_non_exhaustive()
    }
}

impl Drop for DoltStore {
    fn drop(&mut self) {
        if let Some(name) = self.lock_name.take() {
            let _ = self
                .conn
                .exec_drop("SELECT RELEASE_LOCK(?)", (name,));
        }
    }
}

impl DoltStore {
    /// Connect to the configured server and prepare the database.
    ///
    /// Writable handles take a named server-side lock so at most one
    /// writer runs per database; read-only handles skip both the lock
    /// and the schema DDL.
    ///
    /// # Errors
    ///
    /// - `RemoteUnavailable` when the TCP probe fails
    /// - `ServerLocked` when another session holds the writer lock
    pub fn connect(metadata: &Metadata, opts: &StoreOpenOptions) -> Result<Self> {
        let addr = format!("{}:{}", metadata.server_host, metadata.server_port);
        if !test_server_connection(&metadata.server_host, metadata.server_port) {
            return Err(BeadsError::RemoteUnavailable { addr });
        }

        let builder = OptsBuilder::new()
            .ip_or_hostname(Some(metadata.server_host.clone()))
            .tcp_port(metadata.server_port)
            .user(Some(metadata.server_user.clone()));
        let mut conn = Conn::new(builder)?;

        let database = metadata.server_database().to_string();
        if !opts.read_only {
            conn.query_drop(format!("CREATE DATABASE IF NOT EXISTS `{database}`"))?;
        }
        conn.query_drop(format!("USE `{database}`"))?;

        let mut store = Self {
            conn,
            lock_name: None,
            max_depth: opts.max_depth,
        };

        if !opts.read_only {
            let lock_name = format!("beads_writer_{database}");
            let timeout_secs = (opts.lock_timeout_ms / 1000).max(1);
            let acquired: Option<i64> = store
                .conn
                .exec_first("SELECT GET_LOCK(?, ?)", (&lock_name, timeout_secs))?;
            if acquired != Some(1) {
                return Err(BeadsError::ServerLocked { name: lock_name });
            }
            store.lock_name = Some(lock_name);
            for statement in DOLT_SCHEMA_SQL {
                store.conn.query_drop(*statement)?;
            }
        }

        Ok(store)
    }

    // === metadata ===

    /// Read a metadata value; absent keys return `None`.
    ///
    /// # Errors
    ///
    /// Returns a server error on query failure.
    pub fn get_metadata(&mut self, cancel: &CancelToken, key: &str) -> Result<Option<String>> {
        cancel.check()?;
        let value: Option<String> = self
            .conn
            .exec_first("SELECT value FROM metadata WHERE `key` = ?", (key,))?;
        Ok(value)
    }

    /// Write a metadata value.
    ///
    /// # Errors
    ///
    /// Returns a server error on failure.
    pub fn set_metadata(&mut self, cancel: &CancelToken, key: &str, value: &str) -> Result<()> {
        cancel.check()?;
        self.conn.exec_drop(
            "INSERT INTO metadata (`key`, value) VALUES (?, ?)
             ON DUPLICATE KEY UPDATE value = VALUES(value)",
            (key, value),
        )?;
        Ok(())
    }

    // === issues ===

    /// Insert or replace an issue; same validation as the embedded
    /// backend. Returns the id.
    ///
    /// # Errors
    ///
    /// `InvalidId`, `DepthExceeded`, `ParentMissing`, validation errors,
    /// or server errors.
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

        self.conn.exec_drop(
            "INSERT INTO issues (id, content_hash, title, description, status, issue_type,
                priority, estimated_minutes, assignee, sender, created_at, updated_at,
                closed_at, close_reason, pinned, ephemeral, compaction_level, labels,
                waiters, extra)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON DUPLICATE KEY UPDATE
                content_hash = VALUES(content_hash), title = VALUES(title),
                description = VALUES(description), status = VALUES(status),
                issue_type = VALUES(issue_type), priority = VALUES(priority),
                estimated_minutes = VALUES(estimated_minutes), assignee = VALUES(assignee),
                sender = VALUES(sender), created_at = VALUES(created_at),
                updated_at = VALUES(updated_at), closed_at = VALUES(closed_at),
                close_reason = VALUES(close_reason), pinned = VALUES(pinned),
                ephemeral = VALUES(ephemeral), compaction_level = VALUES(compaction_level),
                labels = VALUES(labels), waiters = VALUES(waiters), extra = VALUES(extra)",
            mysql::Params::Positional(vec![
                issue.id.clone().into(),
                issue.content_hash.clone().into(),
                issue.title.clone().into(),
                issue.description.as_deref().unwrap_or("").into(),
                issue.status.as_str().into(),
                issue.issue_type.as_str().into(),
                issue.priority.0.into(),
                issue.estimated_minutes.into(),
                issue.assignee.clone().into(),
                issue.sender.clone().into(),
                issue.created_at.to_rfc3339().into(),
                issue.updated_at.to_rfc3339().into(),
                issue.closed_at.map(|dt| dt.to_rfc3339()).into(),
                issue.close_reason.clone().into(),
                i32::from(issue.pinned).into(),
                i32::from(issue.ephemeral).into(),
                issue.compaction_level.into(),
                serde_json::to_string(&issue.labels)?.into(),
                serde_json::to_string(&issue.waiters)?.into(),
                serde_json::to_string(&issue.extra)?.into(),
            ]),
        )?;

        Ok(issue.id)
    }

    /// Fetch one issue.
    ///
    /// # Errors
    ///
    /// `IssueNotFound` when the id is absent.
    pub fn get_issue(&mut self, cancel: &CancelToken, id: &str) -> Result<Issue> {
        cancel.check()?;
        let row: Option<Row> = self.conn.exec_first(
            format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?"),
            (id,),
        )?;
        match row {
            Some(row) => issue_from_row(&row),
            None => Err(BeadsError::IssueNotFound { id: id.to_string() }),
        }
    }

    fn issue_exists(&mut self, id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .exec_first("SELECT 1 FROM issues WHERE id = ?", (id,))?;
        Ok(found.is_some())
    }

    /// Physically delete an issue and its own edges.
    ///
    /// # Errors
    ///
    /// `Conflict` when dependents or dotted children remain.
    pub fn delete_issue(&mut self, cancel: &CancelToken, id: &str) -> Result<()> {
        cancel.check()?;
        if !self.issue_exists(id)? {
            return Err(BeadsError::IssueNotFound { id: id.to_string() });
        }

        let dependents: Option<i64> = self.conn.exec_first(
            "SELECT COUNT(*) FROM dependencies WHERE depends_on_id = ? AND issue_id != ?",
            (id, id),
        )?;
        if dependents.unwrap_or(0) > 0 {
            return Err(BeadsError::Conflict {
                message: format!("{id} has {} dependent issue(s)", dependents.unwrap_or(0)),
            });
        }
        let children: Option<i64> = self.conn.exec_first(
            "SELECT COUNT(*) FROM issues WHERE id LIKE CONCAT(?, '.%')",
            (id,),
        )?;
        if children.unwrap_or(0) > 0 {
            return Err(BeadsError::Conflict {
                message: format!("{id} has {} child issue(s)", children.unwrap_or(0)),
            });
        }

        self.conn.exec_drop(
            "DELETE FROM dependencies WHERE issue_id = ? OR depends_on_id = ?",
            (id, id),
        )?;
        // The export-hash row stays: it marks the snapshot line this
        // issue still occupies, so the next export knows to shed it.
        self.conn
            .exec_drop("DELETE FROM issues WHERE id = ?", (id,))?;
        Ok(())
    }

    /// List issues matching a filter, sorted ascending by ID.
    ///
    /// # Errors
    ///
    /// Returns server errors or row-conversion failures.
    pub fn list_issues(&mut self, cancel: &CancelToken, filter: &IssueFilter) -> Result<Vec<Issue>> {
        cancel.check()?;

        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<mysql::Value> = Vec::new();

        if let Some(status) = filter.status {
            clauses.push("status = ?".to_string());
            params.push(status.as_str().into());
        } else if !filter.include_closed {
            clauses.push("status != 'closed'".to_string());
        }
        if let Some(issue_type) = filter.issue_type {
            clauses.push("issue_type = ?".to_string());
            params.push(issue_type.as_str().into());
        }
        if let Some(ref assignee) = filter.assignee {
            clauses.push("assignee = ?".to_string());
            params.push(assignee.as_str().into());
        }
        if let Some(priority) = filter.priority {
            clauses.push("priority = ?".to_string());
            params.push(priority.0.into());
        }
        if let Some(ref label) = filter.label {
            clauses.push("labels LIKE ?".to_string());
            params.push(format!("%\"{label}\"%").into());
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues{where_clause} ORDER BY id ASC");

        let rows: Vec<Row> = self.conn.exec(sql, mysql::Params::Positional(params))?;
        let mut issues = Vec::new();
        for row in rows {
            cancel.check()?;
            issues.push(issue_from_row(&row)?);
        }
        Ok(issues)
    }

    // === dependencies ===

    /// Insert or replace a dependency edge; same validation as the
    /// embedded backend.
    ///
    /// # Errors
    ///
    /// `SelfDependency`, `IssueNotFound`, or `HierarchyViolation`.
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
        if !matches!(dep.dep_type, DependencyType::External(_))
            && !self.issue_exists(&dep.depends_on_id)?
        {
            return Err(BeadsError::IssueNotFound {
                id: dep.depends_on_id.clone(),
            });
        }
        if dep.dep_type == DependencyType::ParentChild
            && parent_id(&dep.issue_id).as_deref() != Some(dep.depends_on_id.as_str())
        {
            return Err(BeadsError::HierarchyViolation {
                from: dep.issue_id.clone(),
                to: dep.depends_on_id.clone(),
            });
        }

        self.conn.exec_drop(
            "INSERT INTO dependencies (issue_id, depends_on_id, `type`, metadata, thread_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON DUPLICATE KEY UPDATE
                metadata = VALUES(metadata), thread_id = VALUES(thread_id)",
            (
                &dep.issue_id,
                &dep.depends_on_id,
                dep.dep_type.as_str(),
                &dep.metadata,
                &dep.thread_id,
                dep.created_at.to_rfc3339(),
            ),
        )?;
        Ok(())
    }

    /// Delete a dependency edge. Missing edges are a no-op.
    ///
    /// # Errors
    ///
    /// Returns server errors on failure.
    pub fn delete_dependency(&mut self, cancel: &CancelToken, dep: &Dependency) -> Result<()> {
        cancel.check()?;
        self.conn.exec_drop(
            "DELETE FROM dependencies WHERE issue_id = ? AND depends_on_id = ? AND `type` = ?",
            (&dep.issue_id, &dep.depends_on_id, dep.dep_type.as_str()),
        )?;
        Ok(())
    }

    /// All edges touching `issue_id`, in either direction.
    ///
    /// # Errors
    ///
    /// Returns server errors on failure.
    pub fn dependencies_for(
        &mut self,
        cancel: &CancelToken,
        issue_id: &str,
    ) -> Result<Vec<Dependency>> {
        cancel.check()?;
        let rows: Vec<DependencyRow> = self.conn.exec(
            "SELECT issue_id, depends_on_id, `type`, metadata, thread_id, created_at
             FROM dependencies WHERE issue_id = ? OR depends_on_id = ?
             ORDER BY issue_id, depends_on_id",
            (issue_id, issue_id),
        )?;
        deps_from_rows(rows)
    }

    /// Every edge in the store, ordered for stable export.
    ///
    /// # Errors
    ///
    /// Returns server errors on failure.
    pub fn all_dependencies(&mut self, cancel: &CancelToken) -> Result<Vec<Dependency>> {
        cancel.check()?;
        let rows: Vec<DependencyRow> = self.conn.query(
            "SELECT issue_id, depends_on_id, `type`, metadata, thread_id, created_at
             FROM dependencies ORDER BY issue_id, depends_on_id, `type`",
        )?;
        deps_from_rows(rows)
    }

    // === counters / export hashes ===

    /// Allocate the next child suffix for a parent; strictly monotonic.
    ///
    /// # Errors
    ///
    /// Returns server errors on failure.
    pub fn next_child_suffix(&mut self, cancel: &CancelToken, parent_id: &str) -> Result<i64> {
        cancel.check()?;
        self.conn.exec_drop(
            "INSERT INTO child_counters (parent_id, last_child) VALUES (?, LAST_INSERT_ID(1))
             ON DUPLICATE KEY UPDATE last_child = LAST_INSERT_ID(last_child + 1)",
            (parent_id,),
        )?;
        let next: Option<i64> = self.conn.query_first("SELECT LAST_INSERT_ID()")?;
        next.ok_or_else(|| {
            BeadsError::Other(anyhow::anyhow!("LAST_INSERT_ID returned no row"))
        })
    }

    /// Last-exported content hash for an issue.
    ///
    /// # Errors
    ///
    /// Returns server errors on failure.
    pub fn export_hash(&mut self, cancel: &CancelToken, issue_id: &str) -> Result<Option<String>> {
        cancel.check()?;
        let hash: Option<String> = self.conn.exec_first(
            "SELECT content_hash FROM export_hashes WHERE issue_id = ?",
            (issue_id,),
        )?;
        Ok(hash)
    }

    /// All export-hash rows.
    ///
    /// # Errors
    ///
    /// Returns server errors on failure.
    pub fn all_export_hashes(
        &mut self,
        cancel: &CancelToken,
    ) -> Result<std::collections::HashMap<String, String>> {
        cancel.check()?;
        let rows: Vec<(String, String)> = self
            .conn
            .query("SELECT issue_id, content_hash FROM export_hashes")?;
        Ok(rows.into_iter().collect())
    }

    /// Record export hashes for a batch of issues.
    ///
    /// # Errors
    ///
    /// Returns server errors on failure.
    pub fn set_export_hashes(
        &mut self,
        cancel: &CancelToken,
        hashes: &[(String, String)],
    ) -> Result<()> {
        cancel.check()?;
        let now = Utc::now().to_rfc3339();
        for (issue_id, content_hash) in hashes {
            self.conn.exec_drop(
                "INSERT INTO export_hashes (issue_id, content_hash, exported_at)
                 VALUES (?, ?, ?)
                 ON DUPLICATE KEY UPDATE
                    content_hash = VALUES(content_hash), exported_at = VALUES(exported_at)",
                (issue_id, content_hash, &now),
            )?;
        }
        Ok(())
    }

    /// Drop all export hashes.
    ///
    /// # Errors
    ///
    /// Returns server errors on failure.
    pub fn clear_export_hashes(&mut self, cancel: &CancelToken) -> Result<usize> {
        cancel.check()?;
        self.conn.query_drop("DELETE FROM export_hashes")?;
        Ok(usize::try_from(self.conn.affected_rows()).unwrap_or(0))
    }

    // === statistics / tx ===

    /// Store-level counts. Doubles as the doctor's query sanity check.
    ///
    /// # Errors
    ///
    /// Returns server errors on failure.
    pub fn statistics(&mut self, cancel: &CancelToken) -> Result<Statistics> {
        cancel.check()?;
        let mut stats = Statistics::default();
        let rows: Vec<(String, u64)> = self
            .conn
            .query("SELECT status, COUNT(*) FROM issues GROUP BY status")?;
        for (status, count) in rows {
            let count = usize::try_from(count).unwrap_or(usize::MAX);
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
        let pinned: Option<u64> = self
            .conn
            .query_first("SELECT COUNT(*) FROM issues WHERE pinned = 1")?;
        stats.pinned = usize::try_from(pinned.unwrap_or(0)).unwrap_or(usize::MAX);
        let deps: Option<u64> = self.conn.query_first("SELECT COUNT(*) FROM dependencies")?;
        stats.dependencies = usize::try_from(deps.unwrap_or(0)).unwrap_or(usize::MAX);
        Ok(stats)
    }

    /// Execute a raw statement (transaction brackets from the store
    /// dispatcher).
    ///
    /// # Errors
    ///
    /// Returns server errors on failure.
    pub fn execute_raw(&mut self, statement: &str) -> Result<()> {
        self.conn.query_drop(statement)?;
        Ok(())
    }

    /// Run `f` inside a single server transaction.
    ///
    /// # Errors
    ///
    /// Propagates errors from `f` or the commit; rolls back on error.
    pub fn with_tx<R>(
        &mut self,
        cancel: &CancelToken,
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        cancel.check()?;
        self.conn.query_drop("START TRANSACTION")?;
        match f(self) {
            Ok(value) => {
                self.conn.query_drop("COMMIT")?;
                Ok(value)
            }
            Err(err) => {
                let _ = self.conn.query_drop("ROLLBACK");
                Err(err)
            }
        }
    }

    // === branching / remote ===

    /// Create a named revision from the uncommitted working set.
    ///
    /// A clean working set is not an error: the no-op is surfaced as
    /// [`CommitOutcome::NothingToCommit`].
    ///
    /// # Errors
    ///
    /// Returns server errors on failure.
    pub fn commit(&mut self, cancel: &CancelToken, message: Option<&str>) -> Result<CommitOutcome> {
        cancel.check()?;
        let message = message.unwrap_or("bd: commit");
        match self
            .conn
            .exec_drop("CALL DOLT_COMMIT('-A', '-m', ?)", (message,))
        {
            Ok(()) => Ok(CommitOutcome::Committed),
            Err(err) => {
                let lower = err.to_string().to_lowercase();
                if lower.contains("nothing to commit") || lower.contains("no changes") {
                    Ok(CommitOutcome::NothingToCommit)
                } else {
                    Err(err.into())
                }
            }
        }
    }

    /// Push commits to the configured remote.
    ///
    /// Cancellation of an in-flight push is best-effort; the remote may
    /// be left committed-but-unpushed, which is harmless.
    ///
    /// # Errors
    ///
    /// `RemoteError` on server-side failure.
    pub fn push(&mut self, cancel: &CancelToken) -> Result<()> {
        cancel.check()?;
        self.conn
            .query_drop("CALL DOLT_PUSH()")
            .map_err(|err| BeadsError::RemoteError {
                detail: err.to_string(),
            })
    }

    /// Overwrite the remote branch head.
    ///
    /// # Errors
    ///
    /// `RemoteError` on server-side failure.
    pub fn force_push(&mut self, cancel: &CancelToken) -> Result<()> {
        cancel.check()?;
        self.conn
            .query_drop("CALL DOLT_PUSH('--force')")
            .map_err(|err| BeadsError::RemoteError {
                detail: err.to_string(),
            })
    }

    /// Pull commits from the configured remote.
    ///
    /// # Errors
    ///
    /// `RemoteError` on server-side failure.
    pub fn pull(&mut self, cancel: &CancelToken) -> Result<()> {
        cancel.check()?;
        self.conn
            .query_drop("CALL DOLT_PULL()")
            .map_err(|err| BeadsError::RemoteError {
                detail: err.to_string(),
            })
    }
}

const ISSUE_COLUMNS: &str = "id, content_hash, title, description, status, issue_type, priority, \
     estimated_minutes, assignee, sender, created_at, updated_at, closed_at, close_reason, \
     pinned, ephemeral, compaction_level, labels, waiters, extra";

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| BeadsError::Corrupted {
            detail: format!("bad timestamp '{raw}': {err}"),
        })
}

type DependencyRow = (String, String, String, Option<String>, Option<String>, String);

fn deps_from_rows(rows: Vec<DependencyRow>) -> Result<Vec<Dependency>> {
    let mut deps = Vec::new();
    for (issue_id, depends_on_id, type_str, metadata, thread_id, created_at) in rows {
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

fn column_error(name: &str) -> BeadsError {
    BeadsError::Corrupted {
        detail: format!("unexpected value in issues.{name}"),
    }
}

fn issue_from_row(row: &Row) -> Result<Issue> {
    let description: String = row
        .get::<Option<String>, _>(3)
        .ok_or_else(|| column_error("description"))?
        .unwrap_or_default();
    let labels: String = row
        .get::<Option<String>, _>(17)
        .ok_or_else(|| column_error("labels"))?
        .unwrap_or_else(|| "[]".to_string());
    let waiters: String = row
        .get::<Option<String>, _>(18)
        .ok_or_else(|| column_error("waiters"))?
        .unwrap_or_else(|| "[]".to_string());
    let extra: String = row
        .get::<Option<String>, _>(19)
        .ok_or_else(|| column_error("extra"))?
        .unwrap_or_else(|| "{}".to_string());

    let status: String = row.get(4).ok_or_else(|| column_error("status"))?;
    let issue_type: String = row.get(5).ok_or_else(|| column_error("issue_type"))?;
    let created_at: String = row.get(10).ok_or_else(|| column_error("created_at"))?;
    let updated_at: String = row.get(11).ok_or_else(|| column_error("updated_at"))?;
    let closed_at: Option<String> = row
        .get::<Option<String>, _>(12)
        .ok_or_else(|| column_error("closed_at"))?;

    Ok(Issue {
        id: row.get(0).ok_or_else(|| column_error("id"))?,
        content_hash: row
            .get::<Option<String>, _>(1)
            .ok_or_else(|| column_error("content_hash"))?,
        title: row.get(2).ok_or_else(|| column_error("title"))?,
        description: if description.is_empty() {
            None
        } else {
            Some(description)
        },
        status: FromStr::from_str(&status)?,
        issue_type: FromStr::from_str(&issue_type)?,
        priority: Priority(row.get(6).ok_or_else(|| column_error("priority"))?),
        estimated_minutes: row
            .get::<Option<i32>, _>(7)
            .ok_or_else(|| column_error("estimated_minutes"))?,
        assignee: row
            .get::<Option<String>, _>(8)
            .ok_or_else(|| column_error("assignee"))?,
        sender: row
            .get::<Option<String>, _>(9)
            .ok_or_else(|| column_error("sender"))?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        closed_at: closed_at.as_deref().map(parse_timestamp).transpose()?,
        close_reason: row
            .get::<Option<String>, _>(13)
            .ok_or_else(|| column_error("close_reason"))?,
        pinned: row.get::<i32, _>(14).ok_or_else(|| column_error("pinned"))? != 0,
        ephemeral: row
            .get::<i32, _>(15)
            .ok_or_else(|| column_error("ephemeral"))?
            != 0,
        compaction_level: row
            .get(16)
            .ok_or_else(|| column_error("compaction_level"))?,
        labels: serde_json::from_str(&labels)?,
        waiters: serde_json::from_str(&waiters)?,
        extra: serde_json::from_str(&extra)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    // RFC 5737 TEST-NET-1: guaranteed unroutable, so the dial must fail
    // by timeout rather than by reset.
    #[test]
    fn unreachable_server_probe_fails_within_bound() {
        let start = Instant::now();
        assert!(!test_server_connection("192.0.2.1", 3307));
        assert!(start.elapsed() <= Duration::from_secs(4));
    }

    #[test]
    fn unresolvable_host_probe_fails_fast() {
        assert!(!test_server_connection("host.invalid", 3307));
    }

    #[test]
    fn connect_to_unreachable_server_errors() {
        let metadata = Metadata {
            backend: crate::config::Backend::Dolt,
            database: "beads".to_string(),
            mode: crate::config::DoltMode::Server,
            server_host: "192.0.2.1".to_string(),
            server_port: 3307,
            server_user: "root".to_string(),
        };
        let result = DoltStore::connect(&metadata, &StoreOpenOptions::default());
        assert!(matches!(
            result,
            Err(BeadsError::RemoteUnavailable { .. })
        ));
    }
}
