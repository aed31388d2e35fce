//! Storage abstraction.
//!
//! Two interchangeable backends behind one tagged enum: `Sqlite`
//! (embedded single-file engine) and `Dolt` (network client to a
//! branchable SQL server). The variant is chosen at construction time
//! from `metadata.json`; call sites dispatch once at the store boundary.
//!
//! Both backends satisfy the same contract: read-your-writes within a
//! session, at most one concurrent writer (sidecar lock file embedded,
//! named server lock on Dolt), and the shared table set (`metadata`,
//! `issues`, `dependencies`, `child_counters`, `export_hashes`).

pub mod dolt;
pub mod lock;
pub mod schema;
pub mod sqlite;

use std::collections::HashMap;
use std::path::Path;

use crate::config::{Backend, DoltMode, Metadata};
use crate::error::{BeadsError, Result};
use crate::model::{Dependency, Issue, IssueType, Priority, Statistics, Status};
use crate::util::cancel::CancelToken;

pub use dolt::{DoltStore, test_server_connection};
pub use sqlite::SqliteStore;

/// Options for opening a store.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Open without the write lock; doctor probes use this so they can
    /// run beside a live writer.
    pub read_only: bool,
    /// Create the backing database when absent.
    pub create: bool,
    /// Busy/lock-wait timeout in milliseconds.
    pub lock_timeout_ms: u64,
    /// Maximum dotted-ID nesting depth.
    pub max_depth: usize,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            read_only: false,
            create: true,
            lock_timeout_ms: 30_000,
            max_depth: crate::util::id::DEFAULT_MAX_DEPTH,
        }
    }
}

impl OpenOptions {
    /// Read-only options for diagnostic probes.
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            create: false,
            ..Self::default()
        }
    }
}

/// Predicate set for `list_issues`.
#[derive(Debug, Clone, Default)]
pub struct IssueFilter {
    pub status: Option<Status>,
    pub issue_type: Option<IssueType>,
    pub assignee: Option<String>,
    pub priority: Option<Priority>,
    pub label: Option<String>,
    /// Closed issues are excluded unless requested (or matched by
    /// an explicit `status` filter).
    pub include_closed: bool,
}

/// Result of a `commit` on the server backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// The working set was clean; surfaced, not an error.
    NothingToCommit,
}

/// A store handle over either backend.
#[derive(Debug)]
pub enum Store {
    Sqlite(SqliteStore),
    Dolt(DoltStore),
}

macro_rules! dispatch {
    ($self:ident, $store:ident => $body:expr) => {
        match $self {
            Store::Sqlite($store) => $body,
            Store::Dolt($store) => $body,
        }
    };
}

impl Store {
    /// Open the backend configured in the workspace's `metadata.json`.
    ///
    /// # Errors
    ///
    /// Backend-specific open errors; `Unsupported` for a Dolt backend
    /// still configured in embedded mode.
    pub fn open(beads_dir: &Path, opts: &OpenOptions) -> Result<Self> {
        let metadata = Metadata::load_with_env(beads_dir)?;
        match metadata.backend {
            Backend::Sqlite => Ok(Self::Sqlite(SqliteStore::open(beads_dir, &metadata, opts)?)),
            Backend::Dolt => {
                if metadata.mode == DoltMode::Embedded {
                    return Err(BeadsError::Unsupported {
                        op: "embedded dolt mode".to_string(),
                        backend: "dolt".to_string(),
                    });
                }
                Ok(Self::Dolt(DoltStore::connect(&metadata, opts)?))
            }
        }
    }

    #[must_use]
    pub const fn backend_name(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "sqlite",
            Self::Dolt(_) => "dolt",
        }
    }

    /// Read a metadata value.
    ///
    /// # Errors
    ///
    /// Backend errors on query failure.
    pub fn get_metadata(&mut self, cancel: &CancelToken, key: &str) -> Result<Option<String>> {
        match self {
            Self::Sqlite(store) => store.get_metadata(cancel, key),
            Self::Dolt(store) => store.get_metadata(cancel, key),
        }
    }

    /// Write a metadata value.
    ///
    /// # Errors
    ///
    /// Backend errors on write failure.
    pub fn set_metadata(&mut self, cancel: &CancelToken, key: &str, value: &str) -> Result<()> {
        dispatch!(self, store => store.set_metadata(cancel, key, value))
    }

    /// Insert or replace an issue; returns the id.
    ///
    /// # Errors
    ///
    /// `InvalidId`, `ParentMissing`, `DepthExceeded`, validation errors.
    pub fn upsert_issue(&mut self, cancel: &CancelToken, issue: &Issue) -> Result<String> {
        dispatch!(self, store => store.upsert_issue(cancel, issue))
    }

    /// Fetch one issue.
    ///
    /// # Errors
    ///
    /// `IssueNotFound` when absent.
    pub fn get_issue(&mut self, cancel: &CancelToken, id: &str) -> Result<Issue> {
        dispatch!(self, store => store.get_issue(cancel, id))
    }

    /// Physically delete an issue (explicit cleanup path only).
    ///
    /// # Errors
    ///
    /// `Conflict` when dependents or children remain.
    pub fn delete_issue(&mut self, cancel: &CancelToken, id: &str) -> Result<()> {
        dispatch!(self, store => store.delete_issue(cancel, id))
    }

    /// List issues matching a filter, sorted ascending by ID.
    ///
    /// # Errors
    ///
    /// Backend errors on query failure.
    pub fn list_issues(&mut self, cancel: &CancelToken, filter: &IssueFilter) -> Result<Vec<Issue>> {
        dispatch!(self, store => store.list_issues(cancel, filter))
    }

    /// Insert or replace a dependency edge.
    ///
    /// # Errors
    ///
    /// `SelfDependency`, `IssueNotFound`, `HierarchyViolation`.
    pub fn upsert_dependency(&mut self, cancel: &CancelToken, dep: &Dependency) -> Result<()> {
        dispatch!(self, store => store.upsert_dependency(cancel, dep))
    }

    /// Delete a dependency edge.
    ///
    /// # Errors
    ///
    /// Backend errors on failure.
    pub fn delete_dependency(&mut self, cancel: &CancelToken, dep: &Dependency) -> Result<()> {
        dispatch!(self, store => store.delete_dependency(cancel, dep))
    }

    /// All edges touching one issue, in either direction.
    ///
    /// # Errors
    ///
    /// Backend errors on failure.
    pub fn dependencies_for(
        &mut self,
        cancel: &CancelToken,
        issue_id: &str,
    ) -> Result<Vec<Dependency>> {
        dispatch!(self, store => store.dependencies_for(cancel, issue_id))
    }

    /// Every edge in the store, ordered for stable export.
    ///
    /// # Errors
    ///
    /// Backend errors on failure.
    pub fn all_dependencies(&mut self, cancel: &CancelToken) -> Result<Vec<Dependency>> {
        dispatch!(self, store => store.all_dependencies(cancel))
    }

    /// Allocate the next child suffix for a parent; strictly monotonic.
    ///
    /// # Errors
    ///
    /// Backend errors on failure.
    pub fn next_child_suffix(&mut self, cancel: &CancelToken, parent_id: &str) -> Result<i64> {
        dispatch!(self, store => store.next_child_suffix(cancel, parent_id))
    }

    /// Last-exported content hash for an issue.
    ///
    /// # Errors
    ///
    /// Backend errors on failure.
    pub fn export_hash(&mut self, cancel: &CancelToken, issue_id: &str) -> Result<Option<String>> {
        dispatch!(self, store => store.export_hash(cancel, issue_id))
    }

    /// All export-hash rows.
    ///
    /// # Errors
    ///
    /// Backend errors on failure.
    pub fn all_export_hashes(&mut self, cancel: &CancelToken) -> Result<HashMap<String, String>> {
        dispatch!(self, store => store.all_export_hashes(cancel))
    }

    /// Record export hashes for a batch of issues.
    ///
    /// # Errors
    ///
    /// Backend errors on failure.
    pub fn set_export_hashes(
        &mut self,
        cancel: &CancelToken,
        hashes: &[(String, String)],
    ) -> Result<()> {
        dispatch!(self, store => store.set_export_hashes(cancel, hashes))
    }

    /// Drop all export hashes (forces the next export to rewrite).
    ///
    /// # Errors
    ///
    /// Backend errors on failure.
    pub fn clear_export_hashes(&mut self, cancel: &CancelToken) -> Result<usize> {
        dispatch!(self, store => store.clear_export_hashes(cancel))
    }

    /// Store-level counts.
    ///
    /// # Errors
    ///
    /// Backend errors on failure.
    pub fn statistics(&mut self, cancel: &CancelToken) -> Result<Statistics> {
        dispatch!(self, store => store.statistics(cancel))
    }

    /// Run `f` in one transaction; errors roll back.
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
        // The closure sees the Store wrapper so call sites compose; the
        // transaction brackets live on the concrete connection.
        match self {
            Self::Sqlite(_) => {
                self.sqlite_tx_begin()?;
                match f(self) {
                    Ok(value) => {
                        self.sqlite_tx_end("COMMIT")?;
                        Ok(value)
                    }
                    Err(err) => {
                        let _ = self.sqlite_tx_end("ROLLBACK");
                        Err(err)
                    }
                }
            }
            Self::Dolt(_) => {
                self.dolt_tx_exec("START TRANSACTION")?;
                match f(self) {
                    Ok(value) => {
                        self.dolt_tx_exec("COMMIT")?;
                        Ok(value)
                    }
                    Err(err) => {
                        let _ = self.dolt_tx_exec("ROLLBACK");
                        Err(err)
                    }
                }
            }
        }
    }

    fn sqlite_tx_begin(&mut self) -> Result<()> {
        if let Self::Sqlite(store) = self {
            store.execute_raw("BEGIN IMMEDIATE")?;
        }
        Ok(())
    }

    fn sqlite_tx_end(&mut self, statement: &str) -> Result<()> {
        if let Self::Sqlite(store) = self {
            store.execute_raw(statement)?;
        }
        Ok(())
    }

    fn dolt_tx_exec(&mut self, statement: &str) -> Result<()> {
        if let Self::Dolt(store) = self {
            store.execute_raw(statement)?;
        }
        Ok(())
    }

    /// Create a named revision from the working set (server only).
    ///
    /// # Errors
    ///
    /// `Unsupported` on the embedded backend; server errors otherwise.
    pub fn commit(&mut self, cancel: &CancelToken, message: Option<&str>) -> Result<CommitOutcome> {
        match self {
            Self::Sqlite(_) => Err(unsupported("commit")),
            Self::Dolt(store) => store.commit(cancel, message),
        }
    }

    /// Push to the configured remote (server only).
    ///
    /// # Errors
    ///
    /// `Unsupported` on the embedded backend; `RemoteError` otherwise.
    pub fn push(&mut self, cancel: &CancelToken) -> Result<()> {
        match self {
            Self::Sqlite(_) => Err(unsupported("push")),
            Self::Dolt(store) => store.push(cancel),
        }
    }

    /// Overwrite the remote branch head (server only).
    ///
    /// # Errors
    ///
    /// `Unsupported` on the embedded backend; `RemoteError` otherwise.
    pub fn force_push(&mut self, cancel: &CancelToken) -> Result<()> {
        match self {
            Self::Sqlite(_) => Err(unsupported("force-push")),
            Self::Dolt(store) => store.force_push(cancel),
        }
    }

    /// Pull from the configured remote (server only).
    ///
    /// # Errors
    ///
    /// `Unsupported` on the embedded backend; `RemoteError` otherwise.
    pub fn pull(&mut self, cancel: &CancelToken) -> Result<()> {
        match self {
            Self::Sqlite(_) => Err(unsupported("pull")),
            Self::Dolt(store) => store.pull(cancel),
        }
    }
}

fn unsupported(op: &str) -> BeadsError {
    BeadsError::Unsupported {
        op: op.to_string(),
        backend: "sqlite".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_rejects_remote_operations() {
        let store = SqliteStore::open_memory().unwrap();
        let mut store = Store::Sqlite(store);
        let cancel = CancelToken::new();

        assert!(matches!(
            store.commit(&cancel, None),
            Err(BeadsError::Unsupported { .. })
        ));
        assert!(matches!(
            store.push(&cancel),
            Err(BeadsError::Unsupported { .. })
        ));
        assert!(matches!(
            store.pull(&cancel),
            Err(BeadsError::Unsupported { .. })
        ));
        assert!(matches!(
            store.force_push(&cancel),
            Err(BeadsError::Unsupported { .. })
        ));
    }

    #[test]
    fn dependencies_for_dispatches_per_issue() {
        let mut store = Store::Sqlite(SqliteStore::open_memory().unwrap());
        let cancel = CancelToken::new();

        for id in ["bd-a1", "bd-b2", "bd-c3"] {
            let issue = crate::model::Issue {
                id: id.to_string(),
                title: format!("Issue {id}"),
                ..crate::model::Issue::default()
            };
            store.upsert_issue(&cancel, &issue).unwrap();
        }
        store
            .upsert_dependency(
                &cancel,
                &crate::model::Dependency {
                    issue_id: "bd-b2".to_string(),
                    depends_on_id: "bd-a1".to_string(),
                    dep_type: crate::model::DependencyType::Blocks,
                    metadata: None,
                    thread_id: None,
                    created_at: chrono::Utc::now(),
                },
            )
            .unwrap();

        // Both endpoints see the edge; an unrelated issue sees nothing.
        assert_eq!(store.dependencies_for(&cancel, "bd-a1").unwrap().len(), 1);
        assert_eq!(store.dependencies_for(&cancel, "bd-b2").unwrap().len(), 1);
        assert!(store.dependencies_for(&cancel, "bd-c3").unwrap().is_empty());
    }

    #[test]
    fn store_tx_rolls_back_through_dispatch() {
        let mut store = Store::Sqlite(SqliteStore::open_memory().unwrap());
        let cancel = CancelToken::new();

        let issue = crate::model::Issue {
            id: "bd-t1".to_string(),
            title: "tx".to_string(),
            ..crate::model::Issue::default()
        };

        let result: Result<()> = store.with_tx(&cancel, |store| {
            store.upsert_issue(&CancelToken::new(), &issue)?;
            Err(BeadsError::Cancelled)
        });
        assert!(result.is_err());
        assert!(matches!(
            store.get_issue(&cancel, "bd-t1"),
            Err(BeadsError::IssueNotFound { .. })
        ));
    }
}
