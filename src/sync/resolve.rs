//! Field-level conflict resolution for JSONL import.
//!
//! A pure function of `(local, incoming, strategies)` with no I/O, so
//! every strategy is directly testable. The global strategy applies to
//! every field unless a per-field override names a different one;
//! overrides that are unknown, or semantically incompatible with their
//! field (`union` on a scalar), are logged and fall back to the global.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;

use crate::config::Config;
use crate::model::Issue;

/// Per-field merge strategy.
///
/// `newest`/`ours`/`theirs`/`manual` apply to any field; `union` only to
/// set-valued fields and `max` only to ordinal fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldStrategy {
    #[default]
    Newest,
    Ours,
    Theirs,
    Manual,
    Union,
    Max,
}

impl FieldStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Newest => "newest",
            Self::Ours => "ours",
            Self::Theirs => "theirs",
            Self::Manual => "manual",
            Self::Union => "union",
            Self::Max => "max",
        }
    }

    /// Valid as the global strategy? (`union`/`max` are field-only.)
    #[must_use]
    pub const fn is_global(self) -> bool {
        matches!(self, Self::Newest | Self::Ours | Self::Theirs | Self::Manual)
    }
}

impl FromStr for FieldStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "newest" => Ok(Self::Newest),
            "ours" => Ok(Self::Ours),
            "theirs" => Ok(Self::Theirs),
            "manual" => Ok(Self::Manual),
            "union" => Ok(Self::Union),
            "max" => Ok(Self::Max),
            other => Err(format!(
                "invalid strategy '{other}' (valid: newest, ours, theirs, manual, union, max)"
            )),
        }
    }
}

/// What shape a field has, for strategy compatibility checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Scalar,
    Set,
    Ordinal,
}

const fn strategy_fits(strategy: FieldStrategy, kind: FieldKind) -> bool {
    match strategy {
        FieldStrategy::Newest
        | FieldStrategy::Ours
        | FieldStrategy::Theirs
        | FieldStrategy::Manual => true,
        FieldStrategy::Union => matches!(kind, FieldKind::Set),
        FieldStrategy::Max => matches!(kind, FieldKind::Ordinal),
    }
}

/// Resolver configuration: one global strategy plus per-field overrides.
#[derive(Debug, Clone, Default)]
pub struct ResolveConfig {
    pub global: FieldStrategy,
    pub fields: HashMap<String, FieldStrategy>,
}

impl ResolveConfig {
    /// Build from the config stack (`conflict.strategy`,
    /// `conflict.fields.<name>`). Invalid entries are logged and
    /// ignored; an invalid global falls back to `newest`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let global = config
            .get_string("conflict.strategy")
            .as_deref()
            .map(FieldStrategy::from_str)
            .and_then(|parsed| match parsed {
                Ok(strategy) if strategy.is_global() => Some(strategy),
                Ok(strategy) => {
                    tracing::warn!(
                        strategy = strategy.as_str(),
                        "conflict.strategy must be newest/ours/theirs/manual; using newest"
                    );
                    None
                }
                Err(reason) => {
                    tracing::warn!(%reason, "invalid conflict.strategy; using newest");
                    None
                }
            })
            .unwrap_or_default();

        let mut fields = HashMap::new();
        for (field, raw) in config.get_map("conflict.fields") {
            match FieldStrategy::from_str(&raw) {
                Ok(strategy) => {
                    fields.insert(field, strategy);
                }
                Err(reason) => {
                    tracing::warn!(field = %field, %reason, "skipping conflict.fields entry");
                }
            }
        }

        Self { global, fields }
    }

    fn effective(&self, field: &str, kind: FieldKind) -> FieldStrategy {
        if let Some(&strategy) = self.fields.get(field) {
            if strategy_fits(strategy, kind) {
                return strategy;
            }
            tracing::warn!(
                field,
                strategy = strategy.as_str(),
                "strategy incompatible with field; falling back to global"
            );
        }
        self.global
    }
}

/// A `manual`-strategy conflict: both values recorded, store copy kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldConflict {
    pub issue_id: String,
    pub field: String,
    pub ours: String,
    pub theirs: String,
}

/// Outcome of resolving one issue pair.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub issue: Issue,
    pub changed_fields: Vec<String>,
    pub conflicts: Vec<FieldConflict>,
}

impl Resolution {
    /// Whether any field needs writing back.
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.changed_fields.is_empty()
    }
}

struct MergeOut {
    issue_id: String,
    theirs_newer: bool,
    changed_fields: Vec<String>,
    conflicts: Vec<FieldConflict>,
}

impl MergeOut {
    fn record_change(&mut self, field: &str) {
        self.changed_fields.push(field.to_string());
    }

    fn record_conflict<T: Serialize>(&mut self, field: &str, ours: &T, theirs: &T) {
        self.conflicts.push(FieldConflict {
            issue_id: self.issue_id.clone(),
            field: field.to_string(),
            ours: to_marker_string(ours),
            theirs: to_marker_string(theirs),
        });
    }

    fn pick<T: Clone + PartialEq + Serialize>(
        &mut self,
        field: &str,
        ours: &T,
        theirs: &T,
        strategy: FieldStrategy,
    ) -> T {
        if ours == theirs {
            return ours.clone();
        }
        match strategy {
            FieldStrategy::Newest => {
                if self.theirs_newer {
                    self.record_change(field);
                    theirs.clone()
                } else {
                    ours.clone()
                }
            }
            FieldStrategy::Ours => ours.clone(),
            FieldStrategy::Theirs => {
                self.record_change(field);
                theirs.clone()
            }
            FieldStrategy::Manual => {
                self.record_conflict(field, ours, theirs);
                ours.clone()
            }
            // Filtered out by the compatibility check.
            FieldStrategy::Union | FieldStrategy::Max => ours.clone(),
        }
    }

    fn pick_set(
        &mut self,
        field: &str,
        ours: &[String],
        theirs: &[String],
        strategy: FieldStrategy,
    ) -> Vec<String> {
        if strategy == FieldStrategy::Union {
            let mut merged: Vec<String> = ours.to_vec();
            merged.extend(theirs.iter().cloned());
            merged.sort();
            merged.dedup();
            if merged != ours {
                self.record_change(field);
            }
            return merged;
        }
        self.pick(field, &ours.to_vec(), &theirs.to_vec(), strategy)
    }

    fn pick_ordinal(&mut self, field: &str, ours: i32, theirs: i32, strategy: FieldStrategy) -> i32 {
        if strategy == FieldStrategy::Max {
            let merged = ours.max(theirs);
            if merged != ours {
                self.record_change(field);
            }
            return merged;
        }
        self.pick(field, &ours, &theirs, strategy)
    }

    fn pick_ordinal_opt(
        &mut self,
        field: &str,
        ours: Option<i32>,
        theirs: Option<i32>,
        strategy: FieldStrategy,
    ) -> Option<i32> {
        if strategy == FieldStrategy::Max {
            let merged = match (ours, theirs) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (value, None) | (None, value) => value,
            };
            if merged != ours {
                self.record_change(field);
            }
            return merged;
        }
        self.pick(field, &ours, &theirs, strategy)
    }
}

fn to_marker_string<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "<unserializable>".to_string())
}

/// `newest` winner: later `updated_at` wins; ties break lexicographically
/// by ID (the smaller ID wins), and identical records keep the local.
fn incoming_wins(local: &Issue, incoming: &Issue) -> bool {
    match incoming.updated_at.cmp(&local.updated_at) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => incoming.id < local.id,
    }
}

/// Merge an incoming record into the local one, field by field.
///
/// The returned issue starts from the local copy; only fields a strategy
/// actually moved appear in `changed_fields`. `manual` never mutates -
/// it records both values as a conflict marker and keeps the store copy.
#[must_use]
pub fn resolve_issue(local: &Issue, incoming: &Issue, config: &ResolveConfig) -> Resolution {
    let mut out = MergeOut {
        issue_id: local.id.clone(),
        theirs_newer: incoming_wins(local, incoming),
        changed_fields: Vec::new(),
        conflicts: Vec::new(),
    };

    let mut merged = local.clone();

    merged.title = out.pick(
        "title",
        &local.title,
        &incoming.title,
        config.effective("title", FieldKind::Scalar),
    );
    merged.description = out.pick(
        "description",
        &local.description,
        &incoming.description,
        config.effective("description", FieldKind::Scalar),
    );
    merged.status = out.pick(
        "status",
        &local.status,
        &incoming.status,
        config.effective("status", FieldKind::Scalar),
    );
    merged.issue_type = out.pick(
        "issue_type",
        &local.issue_type,
        &incoming.issue_type,
        config.effective("issue_type", FieldKind::Scalar),
    );
    merged.priority = out.pick(
        "priority",
        &local.priority,
        &incoming.priority,
        config.effective("priority", FieldKind::Scalar),
    );
    merged.estimated_minutes = out.pick_ordinal_opt(
        "estimated_minutes",
        local.estimated_minutes,
        incoming.estimated_minutes,
        config.effective("estimated_minutes", FieldKind::Ordinal),
    );
    merged.assignee = out.pick(
        "assignee",
        &local.assignee,
        &incoming.assignee,
        config.effective("assignee", FieldKind::Scalar),
    );
    merged.sender = out.pick(
        "sender",
        &local.sender,
        &incoming.sender,
        config.effective("sender", FieldKind::Scalar),
    );
    merged.closed_at = out.pick(
        "closed_at",
        &local.closed_at,
        &incoming.closed_at,
        config.effective("closed_at", FieldKind::Scalar),
    );
    merged.close_reason = out.pick(
        "close_reason",
        &local.close_reason,
        &incoming.close_reason,
        config.effective("close_reason", FieldKind::Scalar),
    );
    merged.pinned = out.pick(
        "pinned",
        &local.pinned,
        &incoming.pinned,
        config.effective("pinned", FieldKind::Scalar),
    );
    merged.ephemeral = out.pick(
        "ephemeral",
        &local.ephemeral,
        &incoming.ephemeral,
        config.effective("ephemeral", FieldKind::Scalar),
    );
    merged.compaction_level = out.pick_ordinal(
        "compaction_level",
        local.compaction_level,
        incoming.compaction_level,
        config.effective("compaction_level", FieldKind::Ordinal),
    );
    merged.labels = out.pick_set(
        "labels",
        &local.labels,
        &incoming.labels,
        config.effective("labels", FieldKind::Set),
    );
    merged.waiters = out.pick_set(
        "waiters",
        &local.waiters,
        &incoming.waiters,
        config.effective("waiters", FieldKind::Set),
    );
    merged.extra = out.pick(
        "extra",
        &local.extra,
        &incoming.extra,
        config.effective("extra", FieldKind::Scalar),
    );

    // created_at never moves forward: keep the earliest sighting.
    if incoming.created_at < merged.created_at {
        merged.created_at = incoming.created_at;
        out.record_change("created_at");
    }

    if out.changed_fields.is_empty() {
        merged.updated_at = local.updated_at;
    } else {
        merged.updated_at = max_timestamp(local.updated_at, incoming.updated_at);
        reconcile_close_fields(&mut merged, local, incoming);
    }

    Resolution {
        issue: merged,
        changed_fields: out.changed_fields,
        conflicts: out.conflicts,
    }
}

fn max_timestamp(a: DateTime<Utc>, b: DateTime<Utc>) -> DateTime<Utc> {
    if a >= b { a } else { b }
}

// Mixed per-field strategies can tear status and close_reason apart
// (status from one record, reason from the other). The invariant is
// close_reason iff terminal, so repair after the merge.
fn reconcile_close_fields(merged: &mut Issue, local: &Issue, incoming: &Issue) {
    if merged.status.is_terminal() {
        if merged.close_reason.is_none() {
            merged.close_reason = local
                .close_reason
                .clone()
                .or_else(|| incoming.close_reason.clone())
                .or_else(|| Some("closed".to_string()));
        }
        if merged.closed_at.is_none() {
            merged.closed_at = local.closed_at.or(incoming.closed_at).or(Some(merged.updated_at));
        }
    } else {
        merged.close_reason = None;
        merged.closed_at = None;
    }
}
