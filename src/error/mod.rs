//! Error types for `beads`.
//!
//! Every boundary operation returns a structured error carrying a kind,
//! a human message, an optional underlying cause, and an optional fix
//! hint. The CLI layer maps kinds to exit codes and picks between JSON
//! and text rendering.

use std::path::PathBuf;
use thiserror::Error;

/// Coarse error taxonomy used by the CLI layer and the doctor engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidInput,
    Conflict,
    VersionMismatch,
    Locked,
    Corrupted,
    RemoteUnavailable,
    PermissionDenied,
    Cancelled,
    Internal,
}

/// Primary error type for `beads` operations.
#[derive(Error, Debug)]
pub enum BeadsError {
    // === Storage ===
    /// Database file not found at the resolved path.
    #[error("Database not found at '{path}'")]
    DatabaseNotFound { path: PathBuf },

    /// Another process holds the write lock.
    #[error("Database is locked by pid {pid} ({path})")]
    DatabaseLocked { path: PathBuf, pid: u32 },

    /// The lock file exists but its owner is gone.
    #[error("Stale lock file at '{path}' (owner pid {pid} is not running)")]
    StaleLock { path: PathBuf, pid: u32 },

    /// Another session holds the server-side writer lock.
    #[error("Server writer lock '{name}' is held by another session")]
    ServerLocked { name: String },

    /// Persisted schema version doesn't match the binary.
    #[error("Version mismatch: database has {found}, binary is {expected}")]
    VersionMismatch { expected: String, found: String },

    /// Integrity failure in the backing store.
    #[error("Database corrupted: {detail}")]
    Corrupted { detail: String },

    /// The operation is not supported by this backend.
    #[error("Operation '{op}' is not supported by the {backend} backend")]
    Unsupported { op: String, backend: String },

    /// `SQLite` driver error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// MySQL/Dolt driver error.
    #[error("Server error: {0}")]
    Server(#[from] mysql::Error),

    /// The configured Dolt server could not be reached.
    #[error("Dolt server unreachable at {addr}")]
    RemoteUnavailable { addr: String },

    /// A remote push/pull failed on the server side.
    #[error("Remote operation failed: {detail}")]
    RemoteError { detail: String },

    // === Issues ===
    /// Issue with the specified ID was not found.
    #[error("Issue not found: {id}")]
    IssueNotFound { id: String },

    /// Issue ID does not match `<prefix>-<base36>(.<n>)*`.
    #[error("Invalid issue ID format: {id}")]
    InvalidId { id: String },

    /// A dotted child was written before its parent.
    #[error("Parent '{parent}' of '{id}' does not exist")]
    ParentMissing { id: String, parent: String },

    /// Hierarchy nesting exceeds the configured limit.
    #[error("ID '{id}' exceeds max hierarchy depth {max_depth}")]
    DepthExceeded { id: String, max_depth: usize },

    // === Validation ===
    /// Field validation failed.
    #[error("Validation failed: {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Invalid status value.
    #[error("Invalid status: {status}")]
    InvalidStatus { status: String },

    /// Invalid issue type value.
    #[error("Invalid issue type: {issue_type}")]
    InvalidType { issue_type: String },

    /// Priority out of valid range (0-4).
    #[error("Priority must be 0-4, got: {priority}")]
    InvalidPriority { priority: i32 },

    /// Invalid dependency type value.
    #[error("Invalid dependency type: {dep_type}")]
    InvalidDependencyType { dep_type: String },

    // === Dependencies ===
    /// Self-referential dependency edge.
    #[error("Issue cannot depend on itself: {id}")]
    SelfDependency { id: String },

    /// A parent-child edge that does not follow the dotted-ID forest.
    #[error("parent-child edge {from} -> {to} does not match the ID hierarchy")]
    HierarchyViolation { from: String, to: String },

    /// Constraint or merge conflict.
    #[error("Conflict: {message}")]
    Conflict { message: String },

    // === Sync ===
    /// Failed to parse a line in the JSONL file.
    #[error("JSONL parse error at line {line}: {reason}")]
    JsonlParse { line: usize, reason: String },

    // === Configuration ===
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No `.beads` directory found walking up from the working directory.
    #[error("Beads not initialized: run 'bd init' first")]
    NotInitialized,

    /// Workspace already initialized.
    #[error("Already initialized at '{path}'")]
    AlreadyInitialized { path: PathBuf },

    // === Cross-cutting ===
    /// The operation observed a cancelled token.
    #[error("Operation cancelled")]
    Cancelled,

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Wrapped internal error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BeadsError {
    /// The taxonomy kind for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DatabaseNotFound { .. } | Self::IssueNotFound { .. } | Self::NotInitialized => {
                ErrorKind::NotFound
            }
            Self::AlreadyInitialized { .. } => ErrorKind::AlreadyExists,
            Self::InvalidId { .. }
            | Self::ParentMissing { .. }
            | Self::DepthExceeded { .. }
            | Self::Validation { .. }
            | Self::InvalidStatus { .. }
            | Self::InvalidType { .. }
            | Self::InvalidPriority { .. }
            | Self::InvalidDependencyType { .. }
            | Self::SelfDependency { .. }
            | Self::HierarchyViolation { .. }
            | Self::Unsupported { .. }
            | Self::JsonlParse { .. }
            | Self::Config(_)
            | Self::Yaml(_) => ErrorKind::InvalidInput,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::VersionMismatch { .. } => ErrorKind::VersionMismatch,
            Self::DatabaseLocked { .. } | Self::StaleLock { .. } | Self::ServerLocked { .. } => {
                ErrorKind::Locked
            }
            Self::Corrupted { .. } => ErrorKind::Corrupted,
            Self::RemoteUnavailable { .. } | Self::RemoteError { .. } => {
                ErrorKind::RemoteUnavailable
            }
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                ErrorKind::PermissionDenied
            }
            Self::Sqlite(_) | Self::Server(_) | Self::Io(_) | Self::Json(_) | Self::Other(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Human-friendly suggestion for resolving this error, when one exists.
    #[must_use]
    pub fn fix_hint(&self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run: bd init"),
            Self::DatabaseNotFound { .. } => Some("Check the path or run: bd init"),
            Self::DatabaseLocked { .. } => {
                Some("Another bd process is running; wait for it or raise --lock-timeout")
            }
            Self::StaleLock { .. } => Some("Run 'bd doctor --fix' to clear the stale lock"),
            Self::VersionMismatch { .. } => Some("Run 'bd migrate' to update the database schema"),
            Self::Corrupted { .. } => Some("Run 'bd doctor' for a diagnosis and recovery steps"),
            Self::RemoteUnavailable { .. } => {
                Some("Check that 'dolt sql-server' is running, or run: bd dolt test")
            }
            Self::ParentMissing { .. } => Some("Create the parent issue first"),
            Self::DepthExceeded { .. } => {
                Some("Raise hierarchy.max-depth in config.yaml or flatten the hierarchy")
            }
            Self::SelfDependency { .. } => Some("An issue cannot depend on itself"),
            Self::InvalidPriority { .. } => {
                Some("Use a priority between 0 (critical) and 4 (backlog)")
            }
            Self::InvalidStatus { .. } => {
                Some("Valid statuses: open, in_progress, blocked, deferred, closed")
            }
            Self::InvalidType { .. } => Some("Valid types: task, bug, feature, epic, chore"),
            Self::AlreadyInitialized { .. } => Some("Use --force to reinitialize"),
            _ => None,
        }
    }

    /// Exit code for the CLI: 0 success, 1 error, 2 usage (handled by clap).
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        1
    }

    /// Convenience constructor for field validation failures.
    #[must_use]
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Render as a structured JSON object for `--json` error output.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
                "hint": self.fix_hint(),
            }
        })
    }
}

/// Result type using `BeadsError`.
pub type Result<T> = std::result::Result<T, BeadsError>;
