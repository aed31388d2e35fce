//! Content hashing for idempotent export and merge detection.
//!
//! SHA-256 over stable ordered fields with NUL separators. IDs and
//! timestamps are excluded so renames-in-time don't churn the hash;
//! set-valued fields are sorted first so ordering never matters.

use sha2::{Digest, Sha256};

use crate::model::Issue;

/// Compute the SHA-256 content hash for an issue.
///
/// Fields included (stable order, NUL separated): title, description,
/// status, `P<priority>`, `issue_type`, assignee, sender, `close_reason`,
/// pinned, ephemeral, `compaction_level`, sorted labels, sorted waiters.
///
/// Fields excluded: id, `content_hash` itself, timestamps, and any
/// unknown `extra` keys (foreign fields must not perturb idempotence).
#[must_use]
pub fn content_hash(issue: &Issue) -> String {
    let mut hasher = Sha256::new();

    let mut add_field = |value: &str| {
        if value.contains('\0') {
            hasher.update(value.replace('\0', " ").as_bytes());
        } else {
            hasher.update(value.as_bytes());
        }
        hasher.update(b"\x00");
    };

    let mut labels = issue.labels.clone();
    labels.sort();
    labels.dedup();
    let mut waiters = issue.waiters.clone();
    waiters.sort();
    waiters.dedup();

    add_field(&issue.title);
    add_field(issue.description.as_deref().unwrap_or(""));
    add_field(issue.status.as_str());
    add_field(&format!("P{}", issue.priority.0));
    add_field(issue.issue_type.as_str());
    add_field(issue.assignee.as_deref().unwrap_or(""));
    add_field(issue.sender.as_deref().unwrap_or(""));
    add_field(issue.close_reason.as_deref().unwrap_or(""));
    add_field(if issue.pinned { "true" } else { "false" });
    add_field(if issue.ephemeral { "true" } else { "false" });
    add_field(&issue.compaction_level.to_string());
    add_field(&labels.join(","));
    add_field(&waiters.join(","));

    format!("{:x}", hasher.finalize())
}
