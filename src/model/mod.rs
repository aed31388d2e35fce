//! Core data types for `beads`.
//!
//! This module defines the fundamental types used throughout the crate:
//! - `Issue` - the primary work item
//! - `Status` - issue lifecycle states
//! - `IssueType` - categories of issues
//! - `Dependency` - directed relations between issues
//! - `Statistics` - store-level counts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(b: &bool) -> bool {
    !*b
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero(n: &i32) -> bool {
    *n == 0
}

/// Issue lifecycle status. `closed` is the only terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Open,
    InProgress,
    Blocked,
    Deferred,
    Closed,
}

impl Status {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Deferred => "deferred",
            Self::Closed => "closed",
        }
    }

    /// Terminal statuses require a `close_reason` and a `closed_at`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Status {
    type Err = crate::error::BeadsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "in_progress" | "inprogress" => Ok(Self::InProgress),
            "blocked" => Ok(Self::Blocked),
            "deferred" => Ok(Self::Deferred),
            "closed" => Ok(Self::Closed),
            other => Err(crate::error::BeadsError::InvalidStatus {
                status: other.to_string(),
            }),
        }
    }
}

/// Issue priority (0=Critical, 4=Backlog).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(transparent)]
pub struct Priority(pub i32);

impl Priority {
    pub const CRITICAL: Self = Self(0);
    pub const HIGH: Self = Self(1);
    pub const MEDIUM: Self = Self(2);
    pub const LOW: Self = Self(3);
    pub const BACKLOG: Self = Self(4);
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

impl FromStr for Priority {
    type Err = crate::error::BeadsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_uppercase();
        let val = s.strip_prefix('P').unwrap_or(&s);

        match val.parse::<i32>() {
            Ok(p) if (0..=4).contains(&p) => Ok(Self(p)),
            _ => Err(crate::error::BeadsError::InvalidPriority {
                priority: val.parse().unwrap_or(-1),
            }),
        }
    }
}

/// Issue kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    #[default]
    Task,
    Bug,
    Feature,
    Epic,
    Chore,
}

impl IssueType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Bug => "bug",
            Self::Feature => "feature",
            Self::Epic => "epic",
            Self::Chore => "chore",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IssueType {
    type Err = crate::error::BeadsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "task" => Ok(Self::Task),
            "bug" => Ok(Self::Bug),
            "feature" => Ok(Self::Feature),
            "epic" => Ok(Self::Epic),
            "chore" => Ok(Self::Chore),
            other => Err(crate::error::BeadsError::InvalidType {
                issue_type: other.to_string(),
            }),
        }
    }
}

/// Dependency relationship type.
///
/// A closed enumeration plus `external:<target>` for cross-project
/// references. `parent-child` edges are constrained to mirror the
/// dotted-ID forest; `blocks`/`related` edges may form cycles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DependencyType {
    Blocks,
    ParentChild,
    DiscoveredFrom,
    Related,
    /// Cross-project reference; carries the external project name.
    External(String),
}

impl DependencyType {
    #[must_use]
    pub fn as_str(&self) -> String {
        match self {
            Self::Blocks => "blocks".to_string(),
            Self::ParentChild => "parent-child".to_string(),
            Self::DiscoveredFrom => "discovered-from".to_string(),
            Self::Related => "related".to_string(),
            Self::External(target) => format!("external:{target}"),
        }
    }

    /// Whether this edge type gates downstream work.
    #[must_use]
    pub const fn is_blocking(&self) -> bool {
        matches!(self, Self::Blocks | Self::ParentChild)
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DependencyType {
    type Err = crate::error::BeadsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        if let Some(target) = lower.strip_prefix("external:") {
            if target.is_empty() {
                return Err(crate::error::BeadsError::InvalidDependencyType {
                    dep_type: s.to_string(),
                });
            }
            return Ok(Self::External(target.to_string()));
        }
        match lower.as_str() {
            "blocks" => Ok(Self::Blocks),
            "parent-child" => Ok(Self::ParentChild),
            "discovered-from" => Ok(Self::DiscoveredFrom),
            "related" => Ok(Self::Related),
            other => Err(crate::error::BeadsError::InvalidDependencyType {
                dep_type: other.to_string(),
            }),
        }
    }
}

impl Serialize for DependencyType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_str())
    }
}

impl<'de> Deserialize<'de> for DependencyType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::from_str(&value).map_err(serde::de::Error::custom)
    }
}

/// The primary issue entity.
///
/// Unknown keys encountered on import are captured in `extra` and
/// written back on export, so foreign fields survive a round-trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    /// Unique hierarchical ID (e.g. `bd-k3f` or `bd-k3f.2`).
    pub id: String,

    /// Stable digest over the normalized content; recomputed on upsert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,

    /// Title (1-500 chars).
    pub title: String,

    /// Free-text body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub status: Status,

    #[serde(default)]
    pub issue_type: IssueType,

    #[serde(default)]
    pub priority: Priority,

    /// Estimated effort in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_minutes: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,

    /// Originating agent for message-style issues.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,

    /// Set iff `status` is terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub pinned: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub ephemeral: bool,

    /// How heavily the body has been summarized (0 = full text).
    #[serde(default, skip_serializing_if = "is_zero")]
    pub compaction_level: i32,

    /// Unordered label set, stored sorted and deduplicated.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,

    /// Identifiers waiting on this issue, stored sorted and deduplicated.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub waiters: Vec<String>,

    /// Unknown keys preserved across import/export. An empty map
    /// flattens to nothing, so it never appears on the wire.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for Issue {
    fn default() -> Self {
        Self {
            id: String::new(),
            content_hash: None,
            title: String::new(),
            description: None,
            status: Status::default(),
            issue_type: IssueType::default(),
            priority: Priority::default(),
            estimated_minutes: None,
            assignee: None,
            sender: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            closed_at: None,
            close_reason: None,
            pinned: false,
            ephemeral: false,
            compaction_level: 0,
            labels: Vec::new(),
            waiters: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }
}

impl Issue {
    /// Compute the deterministic content hash for this issue.
    ///
    /// Delegates to [`crate::util::hash::content_hash`].
    #[must_use]
    pub fn compute_content_hash(&self) -> String {
        crate::util::hash::content_hash(self)
    }

    /// Sort and deduplicate the set-valued fields.
    pub fn normalize(&mut self) {
        self.labels.sort();
        self.labels.dedup();
        self.waiters.sort();
        self.waiters.dedup();
    }

    /// Validate field-level invariants.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the title is empty or over 500
    /// chars, or when `close_reason` disagrees with the status.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.title.is_empty() {
            return Err(crate::error::BeadsError::validation(
                "title",
                "cannot be empty",
            ));
        }
        if self.title.chars().count() > 500 {
            return Err(crate::error::BeadsError::validation(
                "title",
                "must be at most 500 characters",
            ));
        }
        if self.close_reason.is_some() && !self.status.is_terminal() {
            return Err(crate::error::BeadsError::validation(
                "close_reason",
                "only set on closed issues",
            ));
        }
        if self.status.is_terminal() && self.close_reason.is_none() {
            return Err(crate::error::BeadsError::validation(
                "close_reason",
                "required when closing an issue",
            ));
        }
        Ok(())
    }
}

/// Directed relation between two issues.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dependency {
    /// The issue that has the dependency (source).
    pub issue_id: String,

    /// The issue being depended on (target).
    pub depends_on_id: String,

    #[serde(rename = "type")]
    pub dep_type: DependencyType,

    /// Optional opaque metadata (JSON text).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,

    /// Thread ID for conversation linking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// Store-level counts returned by `GetStatistics`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Statistics {
    pub total: usize,
    pub open: usize,
    pub in_progress: usize,
    pub blocked: usize,
    pub deferred: usize,
    pub closed: usize,
    pub pinned: usize,
    pub dependencies: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_issue() -> Issue {
        Issue {
            id: "bd-test".to_string(),
            title: "Test issue".to_string(),
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            updated_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            ..Issue::default()
        }
    }

    #[test]
    fn status_roundtrip() {
        for status in [
            Status::Open,
            Status::InProgress,
            Status::Blocked,
            Status::Deferred,
            Status::Closed,
        ] {
            let parsed = Status::from_str(status.as_str()).unwrap();
            assert_eq!(parsed, status);
        }
        assert!(Status::from_str("tombstone").is_err());
    }

    #[test]
    fn status_terminal() {
        assert!(Status::Closed.is_terminal());
        assert!(!Status::Open.is_terminal());
        assert!(!Status::Deferred.is_terminal());
    }

    #[test]
    fn priority_parsing() {
        assert_eq!(Priority::from_str("P0").unwrap(), Priority::CRITICAL);
        assert_eq!(Priority::from_str("p3").unwrap(), Priority::LOW);
        assert_eq!(Priority::from_str("2").unwrap(), Priority::MEDIUM);
        assert!(Priority::from_str("5").is_err());
        assert!(Priority::from_str("-1").is_err());
        assert!(Priority::from_str("high").is_err());
    }

    #[test]
    fn dependency_type_roundtrip() {
        for raw in ["blocks", "parent-child", "discovered-from", "related"] {
            let parsed = DependencyType::from_str(raw).unwrap();
            assert_eq!(parsed.as_str(), raw);
        }
        let ext = DependencyType::from_str("external:gastown").unwrap();
        assert_eq!(ext, DependencyType::External("gastown".to_string()));
        assert_eq!(ext.as_str(), "external:gastown");
        assert!(DependencyType::from_str("waits-for").is_err());
        assert!(DependencyType::from_str("external:").is_err());
    }

    #[test]
    fn dependency_type_serde() {
        let json = serde_json::to_string(&DependencyType::ParentChild).unwrap();
        assert_eq!(json, "\"parent-child\"");
        let parsed: DependencyType = serde_json::from_str("\"external:beads\"").unwrap();
        assert_eq!(parsed, DependencyType::External("beads".to_string()));
    }

    #[test]
    fn issue_serialization_omits_empty() {
        let issue = make_issue();
        let json = serde_json::to_string(&issue).unwrap();
        assert!(json.contains("\"id\":\"bd-test\""));
        assert!(json.contains("\"status\":\"open\""));
        assert!(!json.contains("labels"));
        assert!(!json.contains("close_reason"));
        assert!(!json.contains("compaction_level"));
    }

    #[test]
    fn issue_unknown_keys_preserved() {
        let json = r#"{
            "id": "bd-x1",
            "title": "T",
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z",
            "some_future_field": {"nested": true}
        }"#;
        let issue: Issue = serde_json::from_str(json).unwrap();
        assert!(issue.extra.contains_key("some_future_field"));
        let out = serde_json::to_string(&issue).unwrap();
        assert!(out.contains("some_future_field"));
    }

    #[test]
    fn normalize_sorts_and_dedups() {
        let mut issue = make_issue();
        issue.labels = vec!["b".into(), "a".into(), "b".into()];
        issue.waiters = vec!["w2".into(), "w1".into(), "w1".into()];
        issue.normalize();
        assert_eq!(issue.labels, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(issue.waiters, vec!["w1".to_string(), "w2".to_string()]);
    }

    #[test]
    fn validate_close_reason_iff_terminal() {
        let mut issue = make_issue();
        assert!(issue.validate().is_ok());

        issue.close_reason = Some("done".to_string());
        assert!(issue.validate().is_err());

        issue.status = Status::Closed;
        assert!(issue.validate().is_ok());

        issue.close_reason = None;
        assert!(issue.validate().is_err());
    }

    #[test]
    fn validate_title_bounds() {
        let mut issue = make_issue();
        issue.title = String::new();
        assert!(issue.validate().is_err());
        issue.title = "x".repeat(501);
        assert!(issue.validate().is_err());
        issue.title = "x".repeat(500);
        assert!(issue.validate().is_ok());
    }
}
